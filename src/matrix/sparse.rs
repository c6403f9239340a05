// Column-compressed input matrix, as handed over by the distribution collaborator.

use crate::error::SluError;

/// A column-compressed (CSC) sparse matrix with `f64` values.
///
/// This is the input interface of the engine: the matrix is either globally
/// replicated or already row-distributed by an external collaborator; the
/// engine itself only reads columns out of it during panel distribution.
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CscMatrix {
    /// Build a CSC matrix from raw column pointers, row indices, and values.
    ///
    /// The arrays are validated up front: a malformed input is fatal before
    /// any distributed work begins.
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, SluError> {
        if col_ptr.len() != ncols + 1 {
            return Err(SluError::UnsupportedFormat(format!(
                "col_ptr has {} entries, expected {}",
                col_ptr.len(),
                ncols + 1
            )));
        }
        if col_ptr[ncols] != row_idx.len() || row_idx.len() != values.len() {
            return Err(SluError::UnsupportedFormat(format!(
                "nnz mismatch: col_ptr says {}, {} row indices, {} values",
                col_ptr[ncols],
                row_idx.len(),
                values.len()
            )));
        }
        if col_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(SluError::UnsupportedFormat(
                "col_ptr is not monotonic".into(),
            ));
        }
        if row_idx.iter().any(|&r| r >= nrows) {
            return Err(SluError::UnsupportedFormat(
                "row index out of bounds".into(),
            ));
        }
        Ok(CscMatrix {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    /// Dense matrix to CSC, keeping explicit zeros out.
    pub fn from_dense(a: &faer::Mat<f64>) -> Self {
        let (nrows, ncols) = (a.nrows(), a.ncols());
        let mut col_ptr = vec![0usize; ncols + 1];
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        for j in 0..ncols {
            for i in 0..nrows {
                if a[(i, j)] != 0.0 {
                    row_idx.push(i);
                    values.push(a[(i, j)]);
                }
            }
            col_ptr[j + 1] = row_idx.len();
        }
        CscMatrix {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    /// Row indices and values of column `j`.
    pub fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let (lo, hi) = (self.col_ptr[j], self.col_ptr[j + 1]);
        (&self.row_idx[lo..hi], &self.values[lo..hi])
    }
}
