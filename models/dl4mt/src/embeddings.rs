use crate::EmbeddingWeights;
use common::{clamp_to_vocab, utok};
use common_cpu::gather_rows;
use std::sync::Arc;
use tensor::Matrix;

pub struct Embeddings {
    w: Arc<EmbeddingWeights>,
    ids: Vec<utok>,
}

impl Embeddings {
    pub fn new(weights: &Arc<EmbeddingWeights>) -> Self {
        Self {
            w: weights.clone(),
            ids: Vec::new(),
        }
    }

    /// `rows[i] = E[ids[i]]`, with out-of-vocabulary ids read as `UNK`.
    pub fn lookup(&mut self, rows: &mut Matrix, ids: &[utok]) {
        let nvoc = self.w.e.rows();
        self.ids.clear();
        self.ids.extend(ids.iter().map(|&id| clamp_to_vocab(id, nvoc)));
        gather_rows(rows, &self.w.e, &self.ids);
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.w.e.cols()
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.w.e.rows()
    }
}
