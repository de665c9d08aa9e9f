mod fmt;

use std::ops::{Index, IndexMut};

/// A dense row-major `f32` matrix.
///
/// The logical shape is decoupled from the allocation: [`Matrix::resize`] only
/// grows the buffer when the new shape does not fit in the current capacity,
/// so a matrix used as per-step scratch space stops allocating after the
/// first step of a batch.
#[derive(Clone, Default, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// A zero-filled matrix.
    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols, "{rows}x{cols} from {}", data.len());
        Self { rows, cols, data }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let data = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| f(r, c))
            .collect();
        Self { rows, cols, data }
    }
}

/// access
impl Matrix {
    #[inline]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        assert!(i < self.rows, "row {i} of {}", self.rows);
        &self.data[i * self.cols..][..self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        assert!(i < self.rows, "row {i} of {}", self.rows);
        &mut self.data[i * self.cols..][..self.cols]
    }

    #[inline]
    pub fn iter_rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        // `max(1)` keeps `chunks_exact` valid for 0-column matrices, which have no data anyway
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}

/// reshape
impl Matrix {
    /// Sets the logical shape, reusing the allocation when it is large enough.
    ///
    /// Contents after a resize are unspecified; callers write before they read.
    #[inline]
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.data.resize(rows * cols, 0.);
        self.rows = rows;
        self.cols = cols;
    }

    /// Reinterprets the buffer with a new shape of the same element count.
    #[inline]
    pub fn reshape(&mut self, rows: usize, cols: usize) {
        assert_eq!(
            rows * cols,
            self.len(),
            "reshape {}x{} to {rows}x{cols}",
            self.rows,
            self.cols,
        );
        self.rows = rows;
        self.cols = cols;
    }

    /// Drops the shape to `0x0`, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.rows = 0;
        self.cols = 0;
    }

    #[inline]
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, src: &Matrix) {
        self.resize(src.rows, src.cols);
        self.data.copy_from_slice(&src.data);
    }

    #[inline]
    pub fn swap(&mut self, other: &mut Matrix) {
        std::mem::swap(self, other);
    }
}

/// transform
impl Matrix {
    pub fn transpose_into(&self, dst: &mut Matrix) {
        dst.resize(self.cols, self.rows);
        for (r, row) in self.iter_rows().enumerate() {
            for (c, &x) in row.iter().enumerate() {
                dst.data[c * self.rows + r] = x;
            }
        }
    }

    /// Copies columns `start..start + len` into `dst`.
    pub fn slice_cols_into(&self, dst: &mut Matrix, start: usize, len: usize) {
        assert!(start + len <= self.cols, "cols {start}+{len} of {}", self.cols);
        dst.resize(self.rows, len);
        for (r, row) in self.iter_rows().enumerate() {
            dst.row_mut(r).copy_from_slice(&row[start..][..len]);
        }
    }

    /// `dst = [a | b]`, joined along columns.
    pub fn concat_cols(dst: &mut Matrix, a: &Matrix, b: &Matrix) {
        assert_eq!(a.rows, b.rows, "concat rows {} and {}", a.rows, b.rows);
        dst.resize(a.rows, a.cols + b.cols);
        for r in 0..a.rows {
            let (l, h) = dst.row_mut(r).split_at_mut(a.cols);
            l.copy_from_slice(a.row(r));
            h.copy_from_slice(b.row(r));
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;
    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &Self::Output {
        assert!(c < self.cols, "col {c} of {}", self.cols);
        &self.row(r)[c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut Self::Output {
        assert!(c < self.cols, "col {c} of {}", self.cols);
        &mut self.row_mut(r)[c]
    }
}

#[test]
fn test_resize_keeps_allocation() {
    let mut m = Matrix::new(4, 8);
    let cap = m.capacity();
    let ptr = m.as_slice().as_ptr();

    m.resize(2, 3);
    assert_eq!(m.shape(), (2, 3));
    assert_eq!(m.len(), 6);
    m.resize(8, 4);
    assert_eq!(m.capacity(), cap);
    assert_eq!(m.as_slice().as_ptr(), ptr);

    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.capacity(), cap);
}

#[test]
fn test_reshape() {
    let mut m = Matrix::from_fn(2, 6, |r, c| (r * 6 + c) as f32);
    m.reshape(3, 4);
    assert_eq!(m.row(1), &[4., 5., 6., 7.]);
    assert_eq!(m[(2, 3)], 11.);
}

#[test]
#[should_panic]
fn test_reshape_mismatch() {
    Matrix::new(2, 6).reshape(5, 2);
}

#[test]
fn test_transform() {
    let a = Matrix::from_fn(2, 3, |r, c| (r * 3 + c) as f32);
    let b = Matrix::from_fn(2, 1, |r, _| 10. + r as f32);

    let mut t = Matrix::default();
    a.transpose_into(&mut t);
    assert_eq!(t.shape(), (3, 2));
    assert_eq!(t.as_slice(), &[0., 3., 1., 4., 2., 5.]);

    let mut ab = Matrix::default();
    Matrix::concat_cols(&mut ab, &a, &b);
    assert_eq!(ab.shape(), (2, 4));
    assert_eq!(ab.row(0), &[0., 1., 2., 10.]);
    assert_eq!(ab.row(1), &[3., 4., 5., 11.]);

    let mut s = Matrix::default();
    ab.slice_cols_into(&mut s, 2, 2);
    assert_eq!(s.as_slice(), &[2., 10., 5., 11.]);
}
