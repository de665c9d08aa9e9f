#![deny(warnings)]

mod vocab_txt;

use common::utok;

pub use vocab_txt::VocabTxt;

/// Maps the whitespace-separated tokens of one input field to vocabulary ids.
pub trait Vocab {
    /// Encodes `tokens` of field `field`. Words the vocabulary does not know
    /// become [`common::UNK`].
    fn encode(&self, field: usize, tokens: &[&str]) -> Vec<utok>;
}

impl<V: Vocab + ?Sized> Vocab for &V {
    #[inline]
    fn encode(&self, field: usize, tokens: &[&str]) -> Vec<utok> {
        (**self).encode(field, tokens)
    }
}

/// One vocabulary per field, in field order.
impl<V: Vocab> Vocab for [V] {
    fn encode(&self, field: usize, tokens: &[&str]) -> Vec<utok> {
        let Some(vocab) = self.get(field) else {
            panic!("no vocabulary for field {field}, {} configured", self.len())
        };
        vocab.encode(field, tokens)
    }
}

impl<V: Vocab> Vocab for Vec<V> {
    #[inline]
    fn encode(&self, field: usize, tokens: &[&str]) -> Vec<utok> {
        self[..].encode(field, tokens)
    }
}

#[test]
fn test_per_field() {
    use common::UNK;

    let words = VocabTxt::from_words(["</s>", "<unk>", "the", "cat"]);
    let tags = VocabTxt::from_words(["</s>", "<unk>", "DET", "NOUN"]);
    let vocabs = vec![words, tags];
    assert_eq!(vocabs.encode(0, &["the", "cat", "NOUN"]), [2, 3, UNK]);
    assert_eq!(vocabs.encode(1, &["the", "DET", "NOUN"]), [UNK, 2, 3]);
}
