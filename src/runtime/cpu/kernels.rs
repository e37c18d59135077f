//! CPU kernel implementations
//!
//! Slice-level kernels plus the [`KernelOps`] implementation for
//! [`CpuClient`]. The slice functions are also used by the host-side setup
//! code (AMG Galerkin products, reference SpMV in tests).

use super::client::CpuClient;
use super::runtime::CpuRuntime;
use crate::error::{Error, Result};
use crate::runtime::KernelOps;
use crate::sparse::{DeviceBlockMatrix, TriangularSweep, block};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Below this length the pairwise reduction switches to a plain loop
const PAIRWISE_BLOCK: usize = 128;

// ============================================================================
// Reductions
// ============================================================================

/// Pairwise dot product.
///
/// The split points depend only on the length, so the rounding is identical
/// with and without rayon.
pub fn dot_pairwise(a: &[f64], b: &[f64], parallel_min_len: usize) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.len() <= PAIRWISE_BLOCK {
        return a.iter().zip(b).map(|(x, y)| x * y).sum();
    }
    let mid = a.len() / 2;
    let (a_lo, a_hi) = a.split_at(mid);
    let (b_lo, b_hi) = b.split_at(mid);

    #[cfg(feature = "rayon")]
    if a.len() >= parallel_min_len {
        let (lo, hi) = rayon::join(
            || dot_pairwise(a_lo, b_lo, parallel_min_len),
            || dot_pairwise(a_hi, b_hi, parallel_min_len),
        );
        return lo + hi;
    }

    dot_pairwise(a_lo, b_lo, parallel_min_len) + dot_pairwise(a_hi, b_hi, parallel_min_len)
}

// ============================================================================
// Vector updates
// ============================================================================

/// `y += alpha * x`
pub fn axpy_slice(x: &[f64], alpha: f64, y: &mut [f64], parallel_min_len: usize) {
    #[cfg(feature = "rayon")]
    if y.len() >= parallel_min_len {
        y.par_iter_mut()
            .zip(x.par_iter())
            .with_min_len(parallel_min_len)
            .for_each(|(yi, xi)| *yi += alpha * xi);
        return;
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel_min_len;

    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// `p = r + beta * (p - omega * v)`
pub fn recombine_slice(
    p: &mut [f64],
    r: &[f64],
    v: &[f64],
    beta: f64,
    omega: f64,
    parallel_min_len: usize,
) {
    #[cfg(feature = "rayon")]
    if p.len() >= parallel_min_len {
        p.par_iter_mut()
            .zip(r.par_iter().zip(v.par_iter()))
            .with_min_len(parallel_min_len)
            .for_each(|(pi, (ri, vi))| *pi = ri + beta * (*pi - omega * vi));
        return;
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel_min_len;

    for ((pi, ri), vi) in p.iter_mut().zip(r).zip(v) {
        *pi = ri + beta * (*pi - omega * vi);
    }
}

// ============================================================================
// Block sparse products
// ============================================================================

/// One block row of `y = A x`
#[inline]
fn bsr_row(
    row: usize,
    row_ptrs: &[u32],
    col_indices: &[u32],
    values: &[f64],
    bs: usize,
    x: &[f64],
    y_row: &mut [f64],
) {
    y_row.fill(0.0);
    let bb = bs * bs;
    for k in row_ptrs[row] as usize..row_ptrs[row + 1] as usize {
        let col = col_indices[k] as usize;
        block::block_matvec_add(
            &values[k * bb..(k + 1) * bb],
            &x[col * bs..(col + 1) * bs],
            y_row,
            bs,
        );
    }
}

/// `y = A x` for block CSR data held in slices
pub fn bsr_spmv(
    row_ptrs: &[u32],
    col_indices: &[u32],
    values: &[f64],
    bs: usize,
    x: &[f64],
    y: &mut [f64],
    parallel_min_len: usize,
) {
    #[cfg(feature = "rayon")]
    if y.len() >= parallel_min_len {
        let min_rows = (parallel_min_len / bs).max(1);
        y.par_chunks_mut(bs)
            .enumerate()
            .with_min_len(min_rows)
            .for_each(|(row, y_row)| bsr_row(row, row_ptrs, col_indices, values, bs, x, y_row));
        return;
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel_min_len;

    for (row, y_row) in y.chunks_mut(bs).enumerate() {
        bsr_row(row, row_ptrs, col_indices, values, bs, x, y_row);
    }
}

/// New value of one row in a triangular sweep, computed from the current `x`
fn trsv_row(
    lu: &DeviceBlockMatrix<CpuRuntime>,
    diag_ptrs: &[u32],
    row: usize,
    lower: bool,
    x: &[f64],
) -> Vec<f64> {
    let bs = lu.block_size;
    let bb = bs * bs;
    let mut acc = x[row * bs..(row + 1) * bs].to_vec();
    let diag = diag_ptrs[row] as usize;
    let range = if lower {
        lu.row_ptrs[row] as usize..diag
    } else {
        diag + 1..lu.row_ptrs[row + 1] as usize
    };
    for k in range {
        let col = lu.col_indices[k] as usize;
        block::block_matvec_sub(
            &lu.values[k * bb..(k + 1) * bb],
            &x[col * bs..(col + 1) * bs],
            &mut acc,
            bs,
        );
    }
    if lower {
        return acc;
    }
    let mut out = vec![0.0; bs];
    block::block_matvec_add(&lu.values[diag * bb..(diag + 1) * bb], &acc, &mut out, bs);
    out
}

// ============================================================================
// KernelOps
// ============================================================================

impl KernelOps<CpuRuntime> for CpuClient {
    fn dot(&self, a: &Vec<f64>, b: &Vec<f64>) -> Result<f64> {
        Error::check_len("dot operand", a.len(), b.len())?;
        Ok(dot_pairwise(a, b, self.parallel_min_len()))
    }

    fn axpy(&self, x: &Vec<f64>, alpha: f64, y: &mut Vec<f64>) -> Result<()> {
        Error::check_len("axpy operand", y.len(), x.len())?;
        axpy_slice(x, alpha, y, self.parallel_min_len());
        Ok(())
    }

    fn recombine(
        &self,
        p: &mut Vec<f64>,
        r: &Vec<f64>,
        v: &Vec<f64>,
        beta: f64,
        omega: f64,
    ) -> Result<()> {
        Error::check_len("recombine r", p.len(), r.len())?;
        Error::check_len("recombine v", p.len(), v.len())?;
        recombine_slice(p, r, v, beta, omega, self.parallel_min_len());
        Ok(())
    }

    fn spmv(
        &self,
        a: &DeviceBlockMatrix<CpuRuntime>,
        x: &Vec<f64>,
        y: &mut Vec<f64>,
    ) -> Result<()> {
        Error::check_len("spmv input", a.ncols * a.block_size, x.len())?;
        Error::check_len("spmv output", a.nrows * a.block_size, y.len())?;
        bsr_spmv(
            &a.row_ptrs,
            &a.col_indices,
            &a.values,
            a.block_size,
            x,
            y,
            self.parallel_min_len(),
        );
        Ok(())
    }

    fn block_trsv_level(
        &self,
        lu: &DeviceBlockMatrix<CpuRuntime>,
        sweep: &TriangularSweep<CpuRuntime>,
        level: usize,
        lower: bool,
        x: &mut Vec<f64>,
    ) -> Result<()> {
        let levels = if lower { &sweep.lower } else { &sweep.upper };
        if level + 1 >= levels.level_ptrs.len() {
            return Err(Error::invalid_dimension(
                "trsv level",
                format!("level {level} of {}", levels.num_levels()),
            ));
        }
        let rows = &levels.rows[levels.level_ptrs[level]..levels.level_ptrs[level + 1]];
        let bs = lu.block_size;

        // Rows of one level only read rows of earlier levels, so the new
        // values can be computed against the current x and scattered after.
        let x_ref: &[f64] = x;
        #[cfg(feature = "rayon")]
        let updates: Vec<Vec<f64>> = {
            let min_rows = (self.parallel_min_len() / (bs * 8)).max(1);
            rows.par_iter()
                .with_min_len(min_rows)
                .map(|&row| trsv_row(lu, &sweep.diag_ptrs, row as usize, lower, x_ref))
                .collect()
        };
        #[cfg(not(feature = "rayon"))]
        let updates: Vec<Vec<f64>> = rows
            .iter()
            .map(|&row| trsv_row(lu, &sweep.diag_ptrs, row as usize, lower, x_ref))
            .collect();

        for (&row, value) in rows.iter().zip(updates) {
            let row = row as usize;
            x[row * bs..(row + 1) * bs].copy_from_slice(&value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_pairwise_matches_naive() {
        let a: Vec<f64> = (0..10_000).map(|i| (i as f64 * 0.37).sin()).collect();
        let b: Vec<f64> = (0..10_000).map(|i| (i as f64 * 0.11).cos()).collect();
        let naive: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let pairwise = dot_pairwise(&a, &b, 1024);
        assert!((naive - pairwise).abs() < 1e-9 * naive.abs().max(1.0));
        // deterministic regardless of the parallel cutoff
        assert_eq!(pairwise, dot_pairwise(&a, &b, usize::MAX));
    }

    #[test]
    fn test_recombine() {
        let mut p = vec![1.0, 2.0];
        recombine_slice(&mut p, &[1.0, 1.0], &[1.0, 0.0], 2.0, 0.5, 1);
        assert_eq!(p, vec![2.0, 5.0]);
    }

    #[test]
    fn test_bsr_spmv_2x2_blocks() {
        // [[1 2 | 0 0]
        //  [3 4 | 0 0]
        //  [0 0 | 5 0]
        //  [1 0 | 0 5]]
        let row_ptrs = [0u32, 1, 3];
        let cols = [0u32, 0, 1];
        let vals = [
            1.0, 2.0, 3.0, 4.0, // (0,0)
            0.0, 0.0, 1.0, 0.0, // (1,0)
            5.0, 0.0, 0.0, 5.0, // (1,1)
        ];
        let x = [1.0, 1.0, 1.0, 1.0];
        let mut y = [0.0; 4];
        bsr_spmv(&row_ptrs, &cols, &vals, 2, &x, &mut y, 1);
        assert_eq!(y, [3.0, 7.0, 5.0, 6.0]);
    }
}
