use common::utok;
use std::iter::Enumerate;
use tokenizer::Vocab;

/// Separates the fields of one input line.
pub const FIELD_SEPARATOR: char = '\t';

/// 一行输入，按字段编码为词表 id。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Sentence {
    line_num: usize,
    fields: Vec<Vec<utok>>,
}

impl Sentence {
    /// Encodes the fields of `line`, field `i` with `vocab.encode(i, ..)`.
    ///
    /// `vocab` must cover every field the line has. A per-field list of
    /// vocabularies panics on a line with more fields than vocabularies, on
    /// the thread that builds the sentence, which for [`Batches`] is the
    /// caller of the scheduler.
    pub fn new(line_num: usize, line: &str, vocab: &(impl Vocab + ?Sized)) -> Self {
        let fields = line
            .split(FIELD_SEPARATOR)
            .enumerate()
            .map(|(i, field)| vocab.encode(i, &field.split_whitespace().collect::<Vec<_>>()))
            .collect();
        Self { line_num, fields }
    }

    /// Position of the line in the input, from 0.
    #[inline]
    pub fn line_num(&self) -> usize {
        self.line_num
    }

    #[inline]
    pub fn fields(&self) -> &[Vec<utok>] {
        &self.fields
    }

    /// Token ids of field `i`, empty if the line has fewer fields.
    #[inline]
    pub fn field(&self, i: usize) -> &[utok] {
        self.fields.get(i).map_or(&[], Vec::as_slice)
    }

    /// Length of the first field, the one batches are measured by.
    #[inline]
    pub fn len(&self) -> usize {
        self.field(0).len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A group of sentences handed to one task.
#[derive(Clone, Default, Debug)]
pub struct SentenceBatch {
    sentences: Vec<Sentence>,
    max_length: usize,
}

impl SentenceBatch {
    #[inline]
    pub fn push(&mut self, sentence: Sentence) {
        self.max_length = self.max_length.max(sentence.len());
        self.sentences.push(sentence);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// The longest first field in the batch.
    #[inline]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Sentence> {
        self.sentences.iter()
    }
}

impl std::ops::Index<usize> for SentenceBatch {
    type Output = Sentence;
    #[inline]
    fn index(&self, i: usize) -> &Sentence {
        &self.sentences[i]
    }
}

impl<'a> IntoIterator for &'a SentenceBatch {
    type Item = &'a Sentence;
    type IntoIter = std::slice::Iter<'a, Sentence>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Sentence> for SentenceBatch {
    fn from_iter<T: IntoIterator<Item = Sentence>>(iter: T) -> Self {
        let mut batch = Self::default();
        iter.into_iter().for_each(|s| batch.push(s));
        batch
    }
}

/// Cuts a stream of lines into batches of at most `max_batch_size`
/// sentences. The last batch may be shorter; no batch is empty.
pub struct Batches<'v, I, V: ?Sized> {
    lines: Enumerate<I>,
    vocab: &'v V,
    max_batch_size: usize,
}

impl<'v, I: Iterator, V: ?Sized> Batches<'v, I, V> {
    pub fn new(
        lines: impl IntoIterator<IntoIter = I>,
        vocab: &'v V,
        max_batch_size: usize,
    ) -> Self {
        assert!(max_batch_size > 0, "batch size must be positive");
        Self {
            lines: lines.into_iter().enumerate(),
            vocab,
            max_batch_size,
        }
    }
}

impl<I, V> Iterator for Batches<'_, I, V>
where
    I: Iterator,
    I::Item: AsRef<str>,
    V: Vocab + ?Sized,
{
    type Item = SentenceBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self
            .lines
            .by_ref()
            .take(self.max_batch_size)
            .map(|(i, line)| Sentence::new(i, line.as_ref(), self.vocab))
            .collect::<SentenceBatch>();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
