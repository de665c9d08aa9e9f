use common::utok;
use tensor::Matrix;

/// `dst[i] = table[ids[i]]`
///
/// Ids must already be valid rows of `table`.
pub fn gather_rows(dst: &mut Matrix, table: &Matrix, ids: &[utok]) {
    dst.resize(ids.len(), table.cols());
    for (i, &id) in ids.iter().enumerate() {
        dst.row_mut(i).copy_from_slice(table.row(id as _));
    }
}

#[test]
fn test_gather() {
    let table = Matrix::from_fn(4, 2, |r, c| (r * 10 + c) as f32);
    let mut dst = Matrix::default();
    gather_rows(&mut dst, &table, &[3, 0, 3]);
    assert_eq!(dst.shape(), (3, 2));
    assert_eq!(dst.as_slice(), &[30., 31., 0., 1., 30., 31.]);
}

#[test]
#[should_panic]
fn test_gather_out_of_range() {
    gather_rows(&mut Matrix::default(), &Matrix::new(4, 2), &[4]);
}
