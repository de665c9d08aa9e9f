use rayon::prelude::*;
use tensor::Matrix;

/// Row-wise softmax, in place.
pub fn softmax(x: &mut Matrix) {
    rows_mut(x).for_each(|row| {
        let max = row_max(row);
        let mut sum = 0.;
        for x in row.iter_mut() {
            *x = (*x - max).exp();
            sum += *x;
        }
        assert!(sum.is_finite(), "non-finite softmax row");
        let k = 1. / sum;
        row.iter_mut().for_each(|x| *x *= k);
    })
}

/// Row-wise log-softmax, in place.
pub fn log_softmax(x: &mut Matrix) {
    rows_mut(x).for_each(|row| {
        let max = row_max(row);
        let sum = row.iter().map(|x| (x - max).exp()).sum::<f32>();
        assert!(sum.is_finite(), "non-finite log-softmax row");
        let log_sum = max + sum.ln();
        row.iter_mut().for_each(|x| *x -= log_sum);
    })
}

fn rows_mut(x: &mut Matrix) -> rayon::slice::ChunksMut<'_, f32> {
    let cols = x.cols();
    assert!(cols > 0, "softmax over empty rows");
    x.as_mut_slice().par_chunks_mut(cols)
}

#[inline]
fn row_max(row: &[f32]) -> f32 {
    row.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

#[test]
fn test_softmax() {
    let mut x = Matrix::from_vec(2, 3, vec![1., 2., 3., 1000., 1000., -1000.]);
    softmax(&mut x);
    for row in x.iter_rows() {
        assert!(row.iter().all(|p| p.is_finite() && *p >= 0.));
        assert!((row.iter().sum::<f32>() - 1.).abs() < 1e-5);
    }
    assert!((x[(1, 0)] - 0.5).abs() < 1e-6);
    assert_eq!(x[(1, 2)], 0.);
}

#[test]
fn test_log_softmax() {
    let mut x = Matrix::from_vec(3, 4, vec![
        0., 0., 0., 0., //
        -3., 5., 0.5, 88., //
        1e4, -1e4, 3e3, 0.,
    ]);
    log_softmax(&mut x);
    for row in x.iter_rows() {
        assert!(row.iter().all(|p| p.is_finite() && *p <= 0.));
        assert!((row.iter().map(|p| p.exp()).sum::<f32>() - 1.).abs() < 1e-5);
    }
    assert!((x[(0, 0)] - (0.25f32).ln()).abs() < 1e-6);
}

#[test]
#[should_panic]
fn test_log_softmax_nan() {
    let mut x = Matrix::from_vec(1, 2, vec![f32::NAN, 0.]);
    log_softmax(&mut x);
}
