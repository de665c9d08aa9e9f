use crate::GruWeights;
use common_cpu::{add_row, add_sigmoid, gru_blend, gru_elementwise, mat_mul, reset_candidate};
use std::sync::Arc;
use tensor::Matrix;

/// The recurrence `next = GRU(state, context)`.
///
/// Implementations own their scratch buffers, so one instance must not be
/// shared across threads while stepping.
pub trait Gru {
    fn new(weights: &Arc<GruWeights>) -> Self;

    /// Writes the next state into `next`, shaped like `state`.
    fn next_state(&mut self, next: &mut Matrix, state: &Matrix, context: &Matrix);

    fn state_len(&self) -> usize;
}

#[inline]
fn check_inputs(w: &GruWeights, state: &Matrix, context: &Matrix) {
    assert_eq!(
        state.rows(),
        context.rows(),
        "gru batch mismatch: state {state:?}, context {context:?}",
    );
    assert_eq!(state.cols(), w.dstate(), "gru state {state:?}");
    assert_eq!(context.cols(), w.din(), "gru context {context:?}");
}

/// Gates and candidate computed by four separate products and one kernel per
/// step of the update.
pub struct ReferenceGru {
    w: Arc<GruWeights>,

    ru: Matrix,
    r: Matrix,
    u: Matrix,
    h: Matrix,
    temp1: Matrix,
    temp2: Matrix,
}

impl Gru for ReferenceGru {
    fn new(weights: &Arc<GruWeights>) -> Self {
        Self {
            w: weights.clone(),
            ru: Matrix::default(),
            r: Matrix::default(),
            u: Matrix::default(),
            h: Matrix::default(),
            temp1: Matrix::default(),
            temp2: Matrix::default(),
        }
    }

    fn next_state(&mut self, next: &mut Matrix, state: &Matrix, context: &Matrix) {
        let w = &*self.w;
        check_inputs(w, state, context);
        let d = self.state_len();

        mat_mul(&mut self.ru, context, &w.w);
        mat_mul(&mut self.h, context, &w.wx);

        mat_mul(&mut self.temp1, state, &w.u);
        mat_mul(&mut self.temp2, state, &w.ux);

        add_row(&mut self.ru, &w.b);
        add_sigmoid(&mut self.ru, &self.temp1);
        self.ru.slice_cols_into(&mut self.r, 0, d);
        self.ru.slice_cols_into(&mut self.u, d, d);

        add_row(&mut self.h, &w.bx1);
        add_row(&mut self.temp2, &w.bx2);

        reset_candidate(&mut self.h, &self.r, &self.temp2);
        gru_blend(&mut self.u, &self.h, state);

        // `u` holds the result; hand its buffer out and keep the old one as scratch
        next.swap(&mut self.u);
    }

    #[inline]
    fn state_len(&self) -> usize {
        self.w.dstate()
    }
}

/// Input-facing and state-facing weights joined once at construction, so a
/// step is two products and one fused kernel.
pub struct FusedGru {
    w: Arc<GruWeights>,
    /// `[W | Wx]`, shape: [din, 3 x dstate]
    wwx: Matrix,
    /// `[U | Ux]`, shape: [dstate, 3 x dstate]
    uux: Matrix,

    ruh: Matrix,
    temp: Matrix,
}

impl Gru for FusedGru {
    fn new(weights: &Arc<GruWeights>) -> Self {
        let mut wwx = Matrix::default();
        Matrix::concat_cols(&mut wwx, &weights.w, &weights.wx);
        let mut uux = Matrix::default();
        Matrix::concat_cols(&mut uux, &weights.u, &weights.ux);
        Self {
            w: weights.clone(),
            wwx,
            uux,
            ruh: Matrix::default(),
            temp: Matrix::default(),
        }
    }

    fn next_state(&mut self, next: &mut Matrix, state: &Matrix, context: &Matrix) {
        let w = &*self.w;
        check_inputs(w, state, context);

        mat_mul(&mut self.ruh, context, &self.wwx);
        mat_mul(&mut self.temp, state, &self.uux);
        gru_elementwise(next, state, &self.ruh, &self.temp, &w.b, &w.bx1, &w.bx2);
    }

    #[inline]
    fn state_len(&self) -> usize {
        self.w.dstate()
    }
}
