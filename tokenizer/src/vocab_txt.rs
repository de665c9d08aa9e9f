use crate::Vocab;
use common::{utok, UNK};
use memmap2::Mmap;
use std::{collections::HashMap, fs::File, io::Result, path::Path};

/// 一个基于朴素词表的词汇映射，每行一个词，行号即 id。
pub struct VocabTxt {
    /// 词表。
    words: Vec<String>,
    /// 词到 id 的索引。
    ids: HashMap<String, utok>,
}

impl VocabTxt {
    pub fn from_txt_file(vocab: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(vocab)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        let text = String::from_utf8_lossy(&mmap);
        Ok(Self::from_words(text.lines().map(|line| {
            let line = line.trim_end_matches('\r');
            line.strip_prefix('"')
                .and_then(|l| l.strip_suffix('"'))
                .unwrap_or(line)
        })))
    }

    pub fn from_words<I>(words: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let words = words.into_iter().map(Into::into).collect::<Vec<String>>();
        let mut ids = HashMap::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            // 重复的词保留第一次出现的 id
            ids.entry(word.clone()).or_insert(i as utok);
        }
        Self { words, ids }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn id(&self, word: &str) -> utok {
        self.ids.get(word).copied().unwrap_or(UNK)
    }

    /// The word at row `token`, or the unknown-word entry for ids past the end.
    #[inline]
    pub fn decode(&self, token: utok) -> &str {
        self.words
            .get(token as usize)
            .or_else(|| self.words.get(UNK as usize))
            .map_or("<unk>", String::as_str)
    }
}

impl Vocab for VocabTxt {
    #[inline]
    fn encode(&self, _field: usize, tokens: &[&str]) -> Vec<utok> {
        tokens.iter().map(|t| self.id(t)).collect()
    }
}

#[test]
fn test_from_file() {
    use std::io::Write;

    let path = std::env::temp_dir().join(format!("vocab-{}.txt", std::process::id()));
    {
        let mut file = File::create(&path).unwrap();
        writeln!(file, "\"</s>\"\n<unk>\r\nhello\nworld").unwrap();
    }
    let vocab = VocabTxt::from_txt_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(vocab.len(), 4);
    assert_eq!(vocab.decode(0), "</s>");
    assert_eq!(vocab.encode(0, &["world", "hello", "there"]), [3, 2, UNK]);
    assert_eq!(vocab.decode(99), "<unk>");
}
