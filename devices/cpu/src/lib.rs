//! CPU kernels over [`Matrix`].
//!
//! Every kernel resizes its output and asserts the shapes of its inputs; a
//! mismatch is a programming error in the caller and panics.

mod elementwise;
mod gather;
mod gru;
mod softmax;

use gemm::{gemm, Parallelism};

pub use elementwise::{
    add3_tanh, add_outer_tanh, add_row, add_row_tanh, add_scalar, add_sigmoid, gru_blend,
    reset_candidate,
};
pub use gather::gather_rows;
pub use gru::gru_elementwise;
pub use softmax::{log_softmax, softmax};

pub extern crate tensor;

use tensor::Matrix;

/// `c = a · b`
pub fn mat_mul(c: &mut Matrix, a: &Matrix, b: &Matrix) {
    let (m, k) = a.shape();
    let (kb, n) = b.shape();
    assert_eq!(k, kb, "mat_mul {m}x{k} · {kb}x{n}");
    c.resize(m, n);
    // rhs element (i, j) at i * n + j
    gemm_into(c, a, b, 1, n as _);
}

/// `c = a · bᵀ`
pub fn mat_mul_nt(c: &mut Matrix, a: &Matrix, b: &Matrix) {
    let (m, k) = a.shape();
    let (n, kb) = b.shape();
    assert_eq!(k, kb, "mat_mul {m}x{k} · ({n}x{kb})ᵀ");
    c.resize(m, n);
    // rhs element (i, j) at j * k + i
    gemm_into(c, a, b, k as _, 1);
}

fn gemm_into(c: &mut Matrix, a: &Matrix, b: &Matrix, rhs_cs: isize, rhs_rs: isize) {
    let (m, n) = c.shape();
    let k = a.cols();
    if m == 0 || n == 0 {
        return;
    }
    if k == 0 {
        c.fill(0.);
        return;
    }
    unsafe {
        gemm(
            m,
            n,
            k,
            c.as_mut_slice().as_mut_ptr(),
            1,
            n as _,
            false,
            a.as_slice().as_ptr(),
            1,
            k as _,
            b.as_slice().as_ptr(),
            rhs_cs,
            rhs_rs,
            0.,
            1.,
            false,
            false,
            false,
            Parallelism::None,
        )
    }
}

/// `dst = mean over the rows of x`, a single row.
pub fn mean_rows(dst: &mut Matrix, x: &Matrix) {
    let (rows, cols) = x.shape();
    assert!(rows > 0, "mean of an empty matrix");
    dst.resize(1, cols);
    dst.fill(0.);
    let sum = dst.as_mut_slice();
    for row in x.iter_rows() {
        for (s, v) in sum.iter_mut().zip(row) {
            *s += v;
        }
    }
    let k = 1. / rows as f32;
    sum.iter_mut().for_each(|s| *s *= k);
}

/// `dst[r] = v` for `rows` rows.
pub fn broadcast_row(dst: &mut Matrix, v: &Matrix, rows: usize) {
    assert_eq!(v.rows(), 1, "broadcast source must be a single row");
    dst.resize(rows, v.cols());
    for r in 0..rows {
        dst.row_mut(r).copy_from_slice(v.as_slice());
    }
}

#[cfg(test)]
fn assert_close(a: &[f32], b: &[f32], eps: f32) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= eps, "[{i}] {x} != {y}");
    }
}

#[test]
fn test_mat_mul() {
    let a = Matrix::from_vec(2, 3, vec![1., 2., 3., 4., 5., 6.]);
    let b = Matrix::from_vec(3, 2, vec![7., 8., 9., 10., 11., 12.]);
    let mut c = Matrix::default();
    mat_mul(&mut c, &a, &b);
    assert_eq!(c.shape(), (2, 2));
    assert_close(c.as_slice(), &[58., 64., 139., 154.], 1e-4);

    let mut bt = Matrix::default();
    b.transpose_into(&mut bt);
    let mut c_nt = Matrix::new(7, 7);
    mat_mul_nt(&mut c_nt, &a, &bt);
    assert_eq!(c_nt.shape(), (2, 2));
    assert_close(c_nt.as_slice(), c.as_slice(), 1e-4);
}

#[test]
fn test_mean_broadcast() {
    let x = Matrix::from_vec(3, 2, vec![1., 2., 3., 4., 5., 9.]);
    let mut mean = Matrix::default();
    mean_rows(&mut mean, &x);
    assert_close(mean.as_slice(), &[3., 5.], 1e-6);

    let mut b = Matrix::default();
    broadcast_row(&mut b, &mean, 4);
    assert_eq!(b.shape(), (4, 2));
    assert!(b.iter_rows().all(|row| row == [3., 5.]));
}
