use super::Matrix;
use std::fmt;

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "<{}x{}>", self.rows, self.cols)?;
        for row in self.iter_rows() {
            for x in row {
                if *x == 0. {
                    write!(f, " ________")?;
                } else {
                    write!(f, "{x:>9.3e}")?;
                }
                write!(f, " ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matrix<{}x{}>", self.rows, self.cols)
    }
}

#[test]
fn test_fmt() {
    let m = Matrix::from_fn(2, 3, |r, c| (r * 3 + c) as f32);
    let text = m.to_string();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("<2x3>"));
    assert!(lines.next().unwrap().starts_with(" ________"));
    assert_eq!(lines.count(), 1);
    assert_eq!(format!("{m:?}"), "Matrix<2x3>");
}
