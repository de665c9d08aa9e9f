use crate::elementwise::sigmoid;
use rayon::prelude::*;
use tensor::Matrix;

/// One pass of the fused GRU update over `next`.
///
/// `ruh` is `context · [W | Wx]` and `t` is `state · [U | Ux]`, both laid out as
/// `[reset | update | candidate]` column blocks of width `state.cols()`.
/// For every element:
///
/// ```text
/// r    = σ(ruh.r + b.r + t.r)
/// u    = σ(ruh.u + b.u + t.u)
/// h    = tanh(ruh.h + bx1 + r * (t.h + bx2))
/// next = (1 - u) * h + u * state
/// ```
pub fn gru_elementwise(
    next: &mut Matrix,
    state: &Matrix,
    ruh: &Matrix,
    t: &Matrix,
    b: &Matrix,
    bx1: &Matrix,
    bx2: &Matrix,
) {
    let (rows, d) = state.shape();
    assert!(d > 0, "empty state");
    assert_eq!(ruh.shape(), (rows, 3 * d), "ruh {ruh:?} for state {state:?}");
    assert_eq!(t.shape(), (rows, 3 * d), "t {t:?} for state {state:?}");
    assert_eq!(b.shape(), (1, 2 * d));
    assert_eq!(bx1.shape(), (1, d));
    assert_eq!(bx2.shape(), (1, d));

    next.resize(rows, d);
    let (br, bu) = b.as_slice().split_at(d);
    let bx1 = bx1.as_slice();
    let bx2 = bx2.as_slice();

    next.as_mut_slice()
        .par_chunks_mut(d)
        .zip(state.as_slice().par_chunks(d))
        .zip(ruh.as_slice().par_chunks(3 * d))
        .zip(t.as_slice().par_chunks(3 * d))
        .for_each(|(((next, state), ruh), t)| {
            let (xr, rest) = ruh.split_at(d);
            let (xu, xh) = rest.split_at(d);
            let (hr, rest) = t.split_at(d);
            let (hu, hh) = rest.split_at(d);
            for (i, (next, s)) in next.iter_mut().zip(state).enumerate() {
                let r = sigmoid(xr[i] + br[i] + hr[i]);
                let u = sigmoid(xu[i] + bu[i] + hu[i]);
                let h = (xh[i] + bx1[i] + r * (hh[i] + bx2[i])).tanh();
                *next = (1. - u) * h + u * s;
            }
        });
}

#[test]
fn test_zero_gates() {
    // all-zero inputs: r = u = 0.5, h = 0, next = 0.5 * state
    let state = Matrix::from_vec(2, 2, vec![1., -2., 4., 0.]);
    let zero3 = Matrix::new(2, 6);
    let mut next = Matrix::default();
    gru_elementwise(
        &mut next,
        &state,
        &zero3,
        &zero3,
        &Matrix::new(1, 4),
        &Matrix::new(1, 2),
        &Matrix::new(1, 2),
    );
    assert_eq!(next.shape(), (2, 2));
    for (n, s) in next.as_slice().iter().zip(state.as_slice()) {
        assert!((n - 0.5 * s).abs() < 1e-6);
    }
}
