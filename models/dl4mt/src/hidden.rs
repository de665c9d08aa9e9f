use crate::{Gru, GruWeights, InitWeights};
use common_cpu::{add_row_tanh, broadcast_row, mat_mul, mean_rows};
use log::trace;
use std::sync::Arc;
use tensor::Matrix;

/// The first recurrence of a step, and the initial state of a batch.
pub struct RnnHidden<G> {
    w: Arc<InitWeights>,
    gru: G,

    temp1: Matrix,
    temp2: Matrix,
}

impl<G: Gru> RnnHidden<G> {
    pub fn new(init: &Arc<InitWeights>, gru: &Arc<GruWeights>) -> Self {
        Self {
            w: init.clone(),
            gru: G::new(gru),
            temp1: Matrix::default(),
            temp2: Matrix::default(),
        }
    }

    /// `state = tanh(broadcast(mean(source_context), batch_size) · Wi + Bi)`
    pub fn initialize_state(
        &mut self,
        state: &mut Matrix,
        source_context: &Matrix,
        batch_size: usize,
    ) {
        assert!(batch_size > 0, "empty batch");
        trace!("initialize {batch_size} states from context {source_context:?}");
        mean_rows(&mut self.temp1, source_context);
        broadcast_row(&mut self.temp2, &self.temp1, batch_size);
        mat_mul(state, &self.temp2, &self.w.wi);
        add_row_tanh(state, &self.w.bi);
    }

    #[inline]
    pub fn get_next_state(&mut self, next: &mut Matrix, state: &Matrix, context: &Matrix) {
        self.gru.next_state(next, state, context)
    }
}

/// The second recurrence of a step, fed with the aligned source context.
pub struct RnnFinal<G> {
    gru: G,
}

impl<G: Gru> RnnFinal<G> {
    pub fn new(gru: &Arc<GruWeights>) -> Self {
        Self { gru: G::new(gru) }
    }

    #[inline]
    pub fn get_next_state(&mut self, next: &mut Matrix, state: &Matrix, context: &Matrix) {
        self.gru.next_state(next, state, context)
    }
}
