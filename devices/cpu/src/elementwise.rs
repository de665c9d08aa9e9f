use itertools::izip;
use tensor::Matrix;

#[inline(always)]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

#[inline]
fn assert_same_shape(a: &Matrix, b: &Matrix) {
    assert_eq!(a.shape(), b.shape(), "elementwise shapes differ");
}

#[inline]
fn for_each_row(x: &mut Matrix, v: &Matrix, f: impl Fn(&mut f32, f32)) {
    assert_eq!(v.shape(), (1, x.cols()), "row vector {:?} for {:?}", v, x);
    let v = v.as_slice();
    for r in 0..x.rows() {
        for (x, &v) in x.row_mut(r).iter_mut().zip(v) {
            f(x, v)
        }
    }
}

/// `x[r] += v`
pub fn add_row(x: &mut Matrix, v: &Matrix) {
    for_each_row(x, v, |x, v| *x += v)
}

/// `x[r] = tanh(x[r] + v)`
pub fn add_row_tanh(x: &mut Matrix, v: &Matrix) {
    for_each_row(x, v, |x, v| *x = (*x + v).tanh())
}

/// `x = σ(x + y)`
pub fn add_sigmoid(x: &mut Matrix, y: &Matrix) {
    assert_same_shape(x, y);
    for (x, y) in x.as_mut_slice().iter_mut().zip(y.as_slice()) {
        *x = sigmoid(*x + y)
    }
}

/// `x = tanh(x + y + z)`
pub fn add3_tanh(x: &mut Matrix, y: &Matrix, z: &Matrix) {
    assert_same_shape(x, y);
    assert_same_shape(x, z);
    for (x, y, z) in izip!(x.as_mut_slice(), y.as_slice(), z.as_slice()) {
        *x = (*x + y + z).tanh()
    }
}

/// `h = tanh(h + r * t)`
pub fn reset_candidate(h: &mut Matrix, r: &Matrix, t: &Matrix) {
    assert_same_shape(h, r);
    assert_same_shape(h, t);
    for (h, r, t) in izip!(h.as_mut_slice(), r.as_slice(), t.as_slice()) {
        *h = (*h + r * t).tanh()
    }
}

/// `u = (1 - u) * h + u * s`
pub fn gru_blend(u: &mut Matrix, h: &Matrix, s: &Matrix) {
    assert_same_shape(u, h);
    assert_same_shape(u, s);
    for (u, h, s) in izip!(u.as_mut_slice(), h.as_slice(), s.as_slice()) {
        *u = (1. - *u) * h + *u * s
    }
}

/// `dst[j * a.rows + i] = tanh(a[i] + b[j])`
///
/// Every row of `b` is paired with every row of `a`, grouped by the row of `b`.
pub fn add_outer_tanh(dst: &mut Matrix, a: &Matrix, b: &Matrix) {
    assert_eq!(a.cols(), b.cols(), "outer add of {a:?} and {b:?}");
    let (rows_a, cols) = a.shape();
    dst.resize(rows_a * b.rows(), cols);
    for (j, b) in b.iter_rows().enumerate() {
        for (i, a) in a.iter_rows().enumerate() {
            for (d, a, b) in izip!(dst.row_mut(j * rows_a + i), a, b) {
                *d = (a + b).tanh()
            }
        }
    }
}

/// `x += s`
pub fn add_scalar(x: &mut Matrix, s: f32) {
    x.as_mut_slice().iter_mut().for_each(|x| *x += s)
}

#[test]
fn test_row_ops() {
    let mut x = Matrix::from_vec(2, 2, vec![0., 1., 2., 3.]);
    let v = Matrix::from_vec(1, 2, vec![10., -1.]);
    add_row(&mut x, &v);
    assert_eq!(x.as_slice(), &[10., 0., 12., 2.]);

    let mut y = Matrix::new(2, 2);
    add_row_tanh(&mut y, &Matrix::new(1, 2));
    assert_eq!(y.as_slice(), &[0.; 4]);
}

#[test]
#[should_panic]
fn test_row_shape_mismatch() {
    add_row(&mut Matrix::new(2, 3), &Matrix::new(1, 2));
}

#[test]
fn test_gate_ops() {
    let mut u = Matrix::from_vec(1, 3, vec![0., 100., -100.]);
    add_sigmoid(&mut u, &Matrix::new(1, 3));
    assert!((u[(0, 0)] - 0.5).abs() < 1e-6);
    assert!((u[(0, 1)] - 1.).abs() < 1e-6);
    assert!(u[(0, 2)].abs() < 1e-6);

    let h = Matrix::from_vec(1, 3, vec![2., 2., 2.]);
    let s = Matrix::from_vec(1, 3, vec![4., 4., 4.]);
    gru_blend(&mut u, &h, &s);
    assert!((u[(0, 0)] - 3.).abs() < 1e-5);
    assert!((u[(0, 1)] - 4.).abs() < 1e-5);
    assert!((u[(0, 2)] - 2.).abs() < 1e-5);
}

#[test]
fn test_add_outer_tanh() {
    let a = Matrix::from_vec(3, 1, vec![0.1, 0.2, 0.3]);
    let b = Matrix::from_vec(2, 1, vec![1., 2.]);
    let mut dst = Matrix::default();
    add_outer_tanh(&mut dst, &a, &b);
    assert_eq!(dst.shape(), (6, 1));
    for j in 0..2 {
        for i in 0..3 {
            let expected = (a[(i, 0)] + b[(j, 0)]).tanh();
            assert!((dst[(j * 3 + i, 0)] - expected).abs() < 1e-6);
        }
    }
}
