//! Host scalar CSR matrix for rectangular operators
//!
//! Used for the AMG hierarchy and the CPR transfer operators, where rows and
//! columns live in different spaces.

use crate::error::{Error, Result};

/// Scalar CSR matrix of shape `nrows x ncols`
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) row_ptrs: Vec<usize>,
    pub(crate) col_indices: Vec<usize>,
    pub(crate) values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a matrix, validating lengths and column ranges
    pub fn new(
        nrows: usize,
        ncols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if row_ptrs.len() != nrows + 1 || row_ptrs[nrows] != col_indices.len() {
            return Err(Error::invalid_dimension(
                "csr row_ptrs",
                format!("{} pointers for {nrows} rows", row_ptrs.len()),
            ));
        }
        Error::check_len("csr values", col_indices.len(), values.len())?;
        if row_ptrs.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::invalid_dimension("csr row_ptrs", "decreasing"));
        }
        if col_indices.iter().any(|&c| c >= ncols) {
            return Err(Error::invalid_dimension(
                "csr col_indices",
                format!("column out of range for {ncols} columns"),
            ));
        }
        Ok(Self {
            nrows,
            ncols,
            row_ptrs,
            col_indices,
            values,
        })
    }

    /// Assemble from per-row `(col, value)` lists; each list is sorted here
    pub fn from_rows(nrows: usize, ncols: usize, rows: Vec<Vec<(usize, f64)>>) -> Result<Self> {
        Error::check_len("csr rows", nrows, rows.len())?;
        let mut row_ptrs = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptrs.push(0);
        for mut row in rows {
            row.sort_unstable_by_key(|&(c, _)| c);
            for (c, v) in row {
                col_indices.push(c);
                values.push(v);
            }
            row_ptrs.push(col_indices.len());
        }
        Self::new(nrows, ncols, row_ptrs, col_indices, values)
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    /// Row pointers
    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    /// Column indices
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Entries of one row as `(col, value)` pairs
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptrs[i]..self.row_ptrs[i + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Diagonal entries (zero where not stored)
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.nrows.min(self.ncols))
            .map(|i| {
                self.row(i)
                    .find(|&(c, _)| c == i)
                    .map(|(_, v)| v)
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Transpose (the result has sorted rows)
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.ncols + 1];
        for &c in &self.col_indices {
            counts[c + 1] += 1;
        }
        for i in 0..self.ncols {
            counts[i + 1] += counts[i];
        }
        let row_ptrs = counts.clone();
        let mut next = counts;
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0; self.nnz()];
        for i in 0..self.nrows {
            for (c, v) in self.row(i) {
                let dst = next[c];
                col_indices[dst] = i;
                values[dst] = v;
                next[c] += 1;
            }
        }
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            row_ptrs,
            col_indices,
            values,
        }
    }

    /// Host product `y = A x`
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        Error::check_len("csr spmv input", self.ncols, x.len())?;
        Error::check_len("csr spmv output", self.nrows, y.len())?;
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = self.row(i).map(|(c, v)| v * x[c]).sum();
        }
        Ok(())
    }

    /// Dense row-major copy
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.nrows * self.ncols];
        for i in 0..self.nrows {
            for (c, v) in self.row(i) {
                dense[i * self.ncols + c] += v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_rectangular() {
        // [1 0 2]
        // [0 3 0]
        let a = CsrMatrix::from_rows(2, 3, vec![vec![(2, 2.0), (0, 1.0)], vec![(1, 3.0)]])
            .unwrap();
        let t = a.transpose();
        assert_eq!((t.nrows(), t.ncols()), (3, 2));
        assert_eq!(t.to_dense(), vec![1.0, 0.0, 0.0, 3.0, 2.0, 0.0]);
    }

    #[test]
    fn test_spmv_and_diagonal() {
        let a = CsrMatrix::from_rows(2, 2, vec![vec![(0, 2.0), (1, 1.0)], vec![(1, 4.0)]])
            .unwrap();
        let mut y = [0.0; 2];
        a.spmv(&[1.0, 2.0], &mut y).unwrap();
        assert_eq!(y, [4.0, 8.0]);
        assert_eq!(a.diagonal(), vec![2.0, 4.0]);
    }
}
