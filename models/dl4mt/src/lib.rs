//! The per-step decoder of an attentional GRU translation model.
//!
//! A [`Decoder`] turns the previous decoder state, the embedding of the
//! previously emitted word and the source context into the next state and a
//! log-probability distribution over the target vocabulary.

mod alignment;
mod decoder;
mod embeddings;
mod gru;
mod hidden;
mod json;
mod softmax;
mod storage;

pub use alignment::Alignment;
pub use decoder::Decoder;
pub use embeddings::Embeddings;
pub use gru::{FusedGru, Gru, ReferenceGru};
pub use hidden::{RnnFinal, RnnHidden};
pub use softmax::Softmax;
pub use storage::{
    AlignmentWeights, EmbeddingWeights, GruWeights, InitWeights, SoftmaxWeights,
    Storage as Dl4mtStorage,
};
pub use tensor::Matrix;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Dl4mtMeta {
    /// Target vocabulary size.
    pub nvoc: usize,
    /// Target word embedding width.
    pub demb: usize,
    /// Decoder state width.
    pub dstate: usize,
    /// Source context width.
    pub dctx: usize,
    /// Alignment hidden width.
    pub datt: usize,
    /// Width of the layer before the vocabulary projection.
    pub dout: usize,
}

impl Dl4mtMeta {
    /// Reads a meta from the json options stored with a trained model.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<json::MetaJson>(text).map(Into::into)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&json::MetaJson::from(self)).unwrap()
    }
}

#[cfg(test)]
mod test_step;

#[test]
fn test_meta_json() {
    let meta = Dl4mtMeta::from_json(r#"{ "vocab_size": 30, "dim_word": 8, "dim": 6 }"#).unwrap();
    assert_eq!(
        meta,
        Dl4mtMeta {
            nvoc: 30,
            demb: 8,
            dstate: 6,
            dctx: 12,
            datt: 12,
            dout: 8,
        }
    );
    assert_eq!(Dl4mtMeta::from_json(&meta.to_json()).unwrap(), meta);
}
