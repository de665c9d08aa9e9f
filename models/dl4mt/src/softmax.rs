use crate::SoftmaxWeights;
use common::utok;
use common_cpu::{add3_tanh, add_row, gather_rows, log_softmax, mat_mul};
use log::debug;
use std::sync::Arc;
use tensor::Matrix;

/// The output layer: log-probabilities over the vocabulary, or over an
/// installed shortlist of it.
pub struct Softmax {
    w: Arc<SoftmaxWeights>,

    filtered: bool,
    /// shape: [dout, shortlist]
    filtered_w4: Matrix,
    /// shape: [1, shortlist]
    filtered_b4: Matrix,

    t1: Matrix,
    t2: Matrix,
    t3: Matrix,

    /// `W4ᵀ`, one row per word.
    temp_w4: Matrix,
    /// `B4ᵀ`, one row per word.
    temp_b4: Matrix,
    gathered: Matrix,
}

impl Softmax {
    pub fn new(weights: &Arc<SoftmaxWeights>) -> Self {
        let mut temp_w4 = Matrix::default();
        weights.w4.transpose_into(&mut temp_w4);
        let mut temp_b4 = Matrix::default();
        weights.b4.transpose_into(&mut temp_b4);
        Self {
            w: weights.clone(),
            filtered: false,
            filtered_w4: Matrix::default(),
            filtered_b4: Matrix::default(),
            t1: Matrix::default(),
            t2: Matrix::default(),
            t3: Matrix::default(),
            temp_w4,
            temp_b4,
            gathered: Matrix::default(),
        }
    }

    /// ```text
    /// t     = tanh(state · W1 + B1 + embedding · W2 + B2 + aligned · W3 + B3)
    /// probs = log_softmax(t · W4 + B4)
    /// ```
    pub fn get_probs(
        &mut self,
        probs: &mut Matrix,
        state: &Matrix,
        embedding: &Matrix,
        aligned_source_context: &Matrix,
    ) {
        let w = &*self.w;
        mat_mul(&mut self.t1, state, &w.w1);
        mat_mul(&mut self.t2, embedding, &w.w2);
        mat_mul(&mut self.t3, aligned_source_context, &w.w3);

        add_row(&mut self.t1, &w.b1);
        add_row(&mut self.t2, &w.b2);
        add_row(&mut self.t3, &w.b3);

        add3_tanh(&mut self.t1, &self.t2, &self.t3);

        if !self.filtered {
            mat_mul(probs, &self.t1, &w.w4);
            add_row(probs, &w.b4);
        } else {
            mat_mul(probs, &self.t1, &self.filtered_w4);
            add_row(probs, &self.filtered_b4);
        }

        log_softmax(probs);
    }

    /// Restricts the output to `ids`, in the given order. Replaces any
    /// shortlist installed before.
    pub fn filter(&mut self, ids: &[utok]) {
        let nvoc = self.temp_w4.rows();
        assert!(!ids.is_empty(), "empty shortlist");
        if let Some(&id) = ids.iter().find(|&&id| id as usize >= nvoc) {
            panic!("shortlist id {id} out of vocabulary of {nvoc}")
        }
        debug!("install a shortlist of {} words", ids.len());

        gather_rows(&mut self.gathered, &self.temp_w4, ids);
        self.gathered.transpose_into(&mut self.filtered_w4);
        gather_rows(&mut self.gathered, &self.temp_b4, ids);
        self.gathered.transpose_into(&mut self.filtered_b4);

        self.filtered = true;
    }

    /// Goes back to the full vocabulary.
    #[inline]
    pub fn unfilter(&mut self) {
        self.filtered = false;
    }

    #[inline]
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }
}
