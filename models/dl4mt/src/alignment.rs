use crate::AlignmentWeights;
use common_cpu::{add_outer_tanh, add_row, add_scalar, mat_mul, mat_mul_nt, softmax};
use std::sync::Arc;
use tensor::Matrix;

/// Attention over the source positions, conditioned on the decoder state.
pub struct Alignment {
    w: Arc<AlignmentWeights>,
    /// Scalar added to every score before normalization.
    wc: f32,

    /// `source_context · U`, computed once per batch.
    scu: Matrix,
    temp1: Matrix,
    temp2: Matrix,
    /// shape: [batch, source length]
    a: Matrix,
}

impl Alignment {
    pub fn new(weights: &Arc<AlignmentWeights>) -> Self {
        Self {
            wc: weights.c[(0, 0)],
            w: weights.clone(),
            scu: Matrix::default(),
            temp1: Matrix::default(),
            temp2: Matrix::default(),
            a: Matrix::default(),
        }
    }

    /// Precomputes the source projection reused by every step of a batch.
    pub fn init(&mut self, source_context: &Matrix) {
        assert!(source_context.rows() > 0, "empty source context");
        mat_mul(&mut self.scu, source_context, &self.w.u);
    }

    /// Writes the attention-weighted sum of source rows for every row of
    /// `hidden_state` into `aligned`.
    ///
    /// ```text
    /// e[j, i] = v · tanh(scu[i] + hidden[j] · W + b) + c
    /// a[j]    = softmax(e[j])
    /// aligned = a · source_context
    /// ```
    pub fn get_aligned_source_context(
        &mut self,
        aligned: &mut Matrix,
        hidden_state: &Matrix,
        source_context: &Matrix,
    ) {
        let batch = hidden_state.rows();
        let len = source_context.rows();
        assert_eq!(
            self.scu.rows(),
            len,
            "alignment not initialized for this source context",
        );

        mat_mul(&mut self.temp2, hidden_state, &self.w.w);
        add_row(&mut self.temp2, &self.w.b);

        add_outer_tanh(&mut self.temp1, &self.scu, &self.temp2);

        // one flat row of `batch x len` scores, grouped by batch row
        mat_mul_nt(&mut self.a, &self.w.v, &self.temp1);
        self.a.reshape(batch, len);
        add_scalar(&mut self.a, self.wc);

        softmax(&mut self.a);
        mat_mul(aligned, &self.a, source_context);
    }

    /// shape: [batch, source length], rows sum to 1.
    #[inline]
    pub fn attention(&self) -> &Matrix {
        &self.a
    }

    #[inline]
    pub fn copy_attention(&self, attention: &mut Matrix) {
        attention.copy_from(&self.a)
    }
}
