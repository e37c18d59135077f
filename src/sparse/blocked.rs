//! Host block-CSR matrix

use super::block::{self, MAX_BLOCK_SIZE};
use super::permutation::Permutation;
use crate::error::{Error, Result};

/// Square block-sparse matrix in block CSR format.
///
/// `nb` block rows of `block_size x block_size` dense blocks, each block
/// stored row-major. Column indices are strictly increasing within a row.
///
/// # Example
///
/// ```
/// use blocksolve::sparse::BlockedMatrix;
///
/// // 2x2 block-diagonal matrix with 1x1 blocks
/// let m = BlockedMatrix::new(2, 1, vec![0, 1, 2], vec![0, 1], vec![4.0, 5.0]).unwrap();
/// assert_eq!(m.nnzb(), 2);
/// assert_eq!(m.diagonal_index(1), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedMatrix {
    nb: usize,
    block_size: usize,
    row_pointers: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl BlockedMatrix {
    /// Create a matrix, validating the block CSR invariants
    pub fn new(
        nb: usize,
        block_size: usize,
        row_pointers: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::invalid_dimension(
                "block_size",
                format!("{block_size} not in 1..={MAX_BLOCK_SIZE}"),
            ));
        }
        if row_pointers.len() != nb + 1 {
            return Err(Error::invalid_dimension(
                "row_pointers",
                format!("length {} for {nb} block rows", row_pointers.len()),
            ));
        }
        let nnzb = col_indices.len();
        if row_pointers[0] != 0 || row_pointers[nb] != nnzb {
            return Err(Error::invalid_dimension(
                "row_pointers",
                format!(
                    "must run from 0 to {nnzb}, got {}..{}",
                    row_pointers[0], row_pointers[nb]
                ),
            ));
        }
        if values.len() != nnzb * block_size * block_size {
            return Err(Error::invalid_dimension(
                "values",
                format!(
                    "length {} for {nnzb} blocks of size {block_size}",
                    values.len()
                ),
            ));
        }
        for row in 0..nb {
            let (start, end) = (row_pointers[row], row_pointers[row + 1]);
            if end < start {
                return Err(Error::invalid_dimension(
                    "row_pointers",
                    format!("decreasing at row {row}"),
                ));
            }
            let cols = &col_indices[start..end];
            if cols.iter().any(|&c| c >= nb) {
                return Err(Error::invalid_dimension(
                    "col_indices",
                    format!("column out of range in row {row}"),
                ));
            }
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::invalid_dimension(
                    "col_indices",
                    format!("not strictly increasing in row {row}"),
                ));
            }
        }

        Ok(Self {
            nb,
            block_size,
            row_pointers,
            col_indices,
            values,
        })
    }

    /// Assemble from `(row, col, block)` entries; duplicate positions are summed
    pub fn from_blocks(
        nb: usize,
        block_size: usize,
        blocks: impl IntoIterator<Item = (usize, usize, Vec<f64>)>,
    ) -> Result<Self> {
        let bb = block_size * block_size;
        let mut rows: Vec<Vec<(usize, Vec<f64>)>> = vec![Vec::new(); nb];
        for (r, c, data) in blocks {
            if r >= nb || c >= nb {
                return Err(Error::invalid_dimension(
                    "blocks",
                    format!("position ({r}, {c}) outside {nb} block rows"),
                ));
            }
            Error::check_len("block data", bb, data.len())?;
            match rows[r].iter_mut().find(|(col, _)| *col == c) {
                Some((_, existing)) => existing.iter_mut().zip(&data).for_each(|(e, d)| *e += d),
                None => rows[r].push((c, data)),
            }
        }

        let mut row_pointers = Vec::with_capacity(nb + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_pointers.push(0);
        for mut row in rows {
            row.sort_by_key(|(c, _)| *c);
            for (c, data) in row {
                col_indices.push(c);
                values.extend_from_slice(&data);
            }
            row_pointers.push(col_indices.len());
        }
        Self::new(nb, block_size, row_pointers, col_indices, values)
    }

    /// Number of block rows
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Number of stored blocks
    pub fn nnzb(&self) -> usize {
        self.col_indices.len()
    }

    /// Edge length of each dense block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of scalar rows
    pub fn n(&self) -> usize {
        self.nb * self.block_size
    }

    /// Block row pointers (length `nb + 1`)
    pub fn row_pointers(&self) -> &[usize] {
        &self.row_pointers
    }

    /// Block column indices (length `nnzb`)
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Block values, row-major per block
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable block values. The pattern cannot change.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// The `idx`-th stored block
    pub fn block(&self, idx: usize) -> &[f64] {
        let bb = self.block_size * self.block_size;
        &self.values[idx * bb..(idx + 1) * bb]
    }

    /// Column indices of one block row
    pub fn row_cols(&self, row: usize) -> &[usize] {
        &self.col_indices[self.row_pointers[row]..self.row_pointers[row + 1]]
    }

    /// Position of block `(row, col)` in the value array
    pub fn find_block(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_pointers[row];
        self.row_cols(row)
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }

    /// Position of the diagonal block of `row`
    pub fn diagonal_index(&self, row: usize) -> Option<usize> {
        self.find_block(row, row)
    }

    /// Replace all values, keeping the pattern
    pub fn replace_values(&mut self, values: &[f64]) -> Result<()> {
        Error::check_len("values", self.values.len(), values.len())?;
        self.values.copy_from_slice(values);
        Ok(())
    }

    /// Symmetrically reordered copy: row `i` of the result is row
    /// `from_order[i]` of `self`, with columns mapped through `to_order`.
    pub fn permuted(&self, perm: &Permutation) -> Result<Self> {
        Error::check_len("permutation", self.nb, perm.len())?;
        let bb = self.block_size * self.block_size;
        let mut row_pointers = Vec::with_capacity(self.nb + 1);
        let mut col_indices = Vec::with_capacity(self.nnzb());
        let mut values = Vec::with_capacity(self.values.len());
        row_pointers.push(0);

        let mut entries: Vec<(usize, usize)> = Vec::new();
        for &old_row in perm.from_order() {
            entries.clear();
            for k in self.row_pointers[old_row]..self.row_pointers[old_row + 1] {
                entries.push((perm.to_order()[self.col_indices[k]], k));
            }
            entries.sort_unstable_by_key(|&(c, _)| c);
            for &(c, k) in &entries {
                col_indices.push(c);
                values.extend_from_slice(&self.values[k * bb..(k + 1) * bb]);
            }
            row_pointers.push(col_indices.len());
        }

        Ok(Self {
            nb: self.nb,
            block_size: self.block_size,
            row_pointers,
            col_indices,
            values,
        })
    }

    /// Refresh values of a matrix produced by [`BlockedMatrix::permuted`]
    /// from a natural-order matrix with the same pattern
    pub fn permute_values_from(&mut self, natural: &BlockedMatrix, perm: &Permutation) -> Result<()> {
        Error::check_len("natural values", self.values.len(), natural.values.len())?;
        Error::check_len("permutation", self.nb, perm.len())?;
        let bb = self.block_size * self.block_size;
        for (new_row, &old_row) in perm.from_order().iter().enumerate() {
            for k in natural.row_pointers[old_row]..natural.row_pointers[old_row + 1] {
                let new_col = perm.to_order()[natural.col_indices[k]];
                let dst = self.find_block(new_row, new_col).ok_or_else(|| {
                    Error::invalid_dimension(
                        "values",
                        format!("block ({new_row}, {new_col}) missing from the reordered pattern"),
                    )
                })?;
                self.values[dst * bb..(dst + 1) * bb]
                    .copy_from_slice(&natural.values[k * bb..(k + 1) * bb]);
            }
        }
        Ok(())
    }

    /// Host product `y = A x`
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        Error::check_len("spmv input", self.n(), x.len())?;
        Error::check_len("spmv output", self.n(), y.len())?;
        let bs = self.block_size;
        let bb = bs * bs;
        for row in 0..self.nb {
            let y_row = &mut y[row * bs..(row + 1) * bs];
            y_row.fill(0.0);
            for k in self.row_pointers[row]..self.row_pointers[row + 1] {
                let c = self.col_indices[k];
                block::block_matvec_add(
                    &self.values[k * bb..(k + 1) * bb],
                    &x[c * bs..(c + 1) * bs],
                    y_row,
                    bs,
                );
            }
        }
        Ok(())
    }

    /// Dense row-major copy (`n x n`)
    pub fn to_dense(&self) -> Vec<f64> {
        let n = self.n();
        let bs = self.block_size;
        let mut dense = vec![0.0; n * n];
        for row in 0..self.nb {
            for k in self.row_pointers[row]..self.row_pointers[row + 1] {
                let c = self.col_indices[k];
                let blk = self.block(k);
                for i in 0..bs {
                    for j in 0..bs {
                        dense[(row * bs + i) * n + c * bs + j] = blk[i * bs + j];
                    }
                }
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrow() -> BlockedMatrix {
        // [d x x]
        // [x d .]
        // [x . d]
        BlockedMatrix::from_blocks(
            3,
            1,
            vec![
                (0, 0, vec![4.0]),
                (0, 1, vec![1.0]),
                (0, 2, vec![2.0]),
                (1, 0, vec![1.0]),
                (1, 1, vec![5.0]),
                (2, 0, vec![2.0]),
                (2, 2, vec![6.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(BlockedMatrix::new(1, 7, vec![0, 1], vec![0], vec![0.0; 49]).is_err());
        assert!(BlockedMatrix::new(2, 1, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(BlockedMatrix::new(2, 1, vec![0, 2, 2], vec![1, 0], vec![1.0, 1.0]).is_err());
        assert!(BlockedMatrix::new(1, 1, vec![0, 1], vec![3], vec![1.0]).is_err());
        assert!(BlockedMatrix::new(1, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
    }

    #[test]
    fn test_from_blocks_sums_duplicates() {
        let m = BlockedMatrix::from_blocks(1, 1, vec![(0, 0, vec![1.0]), (0, 0, vec![2.0])])
            .unwrap();
        assert_eq!(m.values(), &[3.0]);
    }

    #[test]
    fn test_permuted_matches_dense() {
        let m = arrow();
        let p = Permutation::from_to_order(vec![2, 0, 1]).unwrap();
        let pm = m.permuted(&p).unwrap();

        let d = m.to_dense();
        let pd = pm.to_dense();
        for i in 0..3 {
            for j in 0..3 {
                let (oi, oj) = (p.from_order()[i], p.from_order()[j]);
                assert_eq!(pd[i * 3 + j], d[oi * 3 + oj]);
            }
        }
    }

    #[test]
    fn test_permute_values_from() {
        let mut m = arrow();
        let p = Permutation::from_to_order(vec![1, 2, 0]).unwrap();
        let mut pm = m.permuted(&p).unwrap();
        m.values_mut().iter_mut().for_each(|v| *v *= 2.0);
        pm.permute_values_from(&m, &p).unwrap();
        assert_eq!(pm, m.permuted(&p).unwrap());
    }

    #[test]
    fn test_spmv_and_diagonal() {
        let m = arrow();
        let mut y = [0.0; 3];
        m.spmv(&[1.0, 1.0, 1.0], &mut y).unwrap();
        assert_eq!(y, [7.0, 6.0, 8.0]);
        assert_eq!(m.diagonal_index(2), Some(6));
        assert_eq!(m.find_block(1, 2), None);
    }
}
