//! Block ILU(0) preconditioner
//!
//! Incomplete block LU factorization with zero fill-in using the IKJ
//! algorithm variant, on `bs x bs` blocks:
//!
//! ```text
//! for each block row i:
//!   for k < i where A[i,k] exists:
//!     A[i,k] = A[i,k] * inv(A[k,k])          (becomes L[i,k])
//!     for j > k where A[k,j] and A[i,j] exist:
//!       A[i,j] -= A[i,k] * A[k,j]
//!   A[i,i] = inv(A[i,i])                    (stored inverted)
//! ```
//!
//! The factor shares the pattern of `A`. Applying it is a forward sweep with
//! the unit lower part followed by a backward sweep with the upper part, each
//! split into independent levels.

use super::{Preconditioner, PreconditionerKind, not_analyzed, not_built};
use crate::algorithm::reorder::{LevelSchedule, compute_levels_lower, compute_levels_upper};
use crate::error::{Error, Result};
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::{BlockedMatrix, DeviceBlockMatrix, TriangularSweep, block};
use serde::Deserialize;

/// Configuration options for block ILU(0)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IluOptions {
    /// A diagonal block pivot is singular when
    /// `|pivot| <= pivot_threshold * max|block|` (default: 1e-30)
    pub pivot_threshold: f64,
}

impl Default for IluOptions {
    fn default() -> Self {
        Self {
            pivot_threshold: 1e-30,
        }
    }
}

/// Structure of the factor, fixed per pattern
#[derive(Debug, Clone)]
pub(crate) struct Ilu0Analysis {
    pub(crate) nb: usize,
    pub(crate) block_size: usize,
    pub(crate) row_ptrs: Vec<usize>,
    pub(crate) col_indices: Vec<usize>,
    pub(crate) diag_ptrs: Vec<usize>,
    pub(crate) lower: LevelSchedule,
    pub(crate) upper: LevelSchedule,
}

impl Ilu0Analysis {
    pub(crate) fn new(pattern: &BlockedMatrix) -> Result<Self> {
        let nb = pattern.nb();
        let mut diag_ptrs = Vec::with_capacity(nb);
        for row in 0..nb {
            let diag = pattern.diagonal_index(row).ok_or_else(|| {
                Error::analysis(format!("block row {row} has no diagonal block"))
            })?;
            diag_ptrs.push(diag);
        }
        let (rp, ci) = (pattern.row_pointers(), pattern.col_indices());
        Ok(Self {
            nb,
            block_size: pattern.block_size(),
            row_ptrs: rp.to_vec(),
            col_indices: ci.to_vec(),
            diag_ptrs,
            lower: compute_levels_lower(nb, rp, ci)?,
            upper: compute_levels_upper(nb, rp, ci)?,
        })
    }

    fn matches(&self, matrix: &BlockedMatrix) -> bool {
        self.nb == matrix.nb()
            && self.block_size == matrix.block_size()
            && self.row_ptrs == matrix.row_pointers()
            && self.col_indices == matrix.col_indices()
    }
}

/// Factor `A ≈ L U` in place on a copy of the values; diagonal blocks hold
/// `inv(U_ii)` on return.
pub(crate) fn factorize(
    analysis: &Ilu0Analysis,
    values: &[f64],
    pivot_threshold: f64,
) -> Result<Vec<f64>> {
    let bs = analysis.block_size;
    let bb = bs * bs;
    let rp = &analysis.row_ptrs;
    let ci = &analysis.col_indices;
    let mut lu = values.to_vec();

    // position of column j in the current row, usize::MAX when absent
    let mut col_pos = vec![usize::MAX; analysis.nb];
    let mut l_ik = vec![0.0; bb];
    let mut inv = vec![0.0; bb];

    for i in 0..analysis.nb {
        for idx in rp[i]..rp[i + 1] {
            col_pos[ci[idx]] = idx;
        }

        for idx_ik in rp[i]..analysis.diag_ptrs[i] {
            let k = ci[idx_ik];
            let diag_k = analysis.diag_ptrs[k];

            // L[i,k] = A[i,k] * inv(U[k,k])
            block::block_mult(
                &lu[idx_ik * bb..(idx_ik + 1) * bb],
                &lu[diag_k * bb..(diag_k + 1) * bb],
                &mut l_ik,
                bs,
            );
            lu[idx_ik * bb..(idx_ik + 1) * bb].copy_from_slice(&l_ik);

            for idx_kj in diag_k + 1..rp[k + 1] {
                let idx_ij = col_pos[ci[idx_kj]];
                if idx_ij == usize::MAX {
                    continue;
                }
                let (head, tail) = lu.split_at_mut(idx_ij * bb);
                let target = &mut tail[..bb];
                // idx_kj belongs to an earlier row, so it lies in `head`
                block::block_mult_sub(&l_ik, &head[idx_kj * bb..(idx_kj + 1) * bb], target, bs);
            }
        }

        let diag_i = analysis.diag_ptrs[i];
        block::invert_block(&lu[diag_i * bb..(diag_i + 1) * bb], &mut inv, bs, pivot_threshold)
            .map_err(|pivot| Error::SingularPivot {
                block_row: i,
                pivot,
            })?;
        lu[diag_i * bb..(diag_i + 1) * bb].copy_from_slice(&inv);

        for idx in rp[i]..rp[i + 1] {
            col_pos[ci[idx]] = usize::MAX;
        }
    }

    Ok(lu)
}

struct Ilu0Factor<R: Runtime> {
    lu: DeviceBlockMatrix<R>,
    sweep: TriangularSweep<R>,
}

/// Block ILU(0) preconditioner
pub struct Bilu0<R: Runtime> {
    options: IluOptions,
    analysis: Option<Ilu0Analysis>,
    host_lu: Vec<f64>,
    factor: Option<Ilu0Factor<R>>,
}

impl<R: Runtime> Bilu0<R> {
    /// Create an unanalyzed preconditioner
    pub fn new(options: IluOptions) -> Self {
        Self {
            options,
            analysis: None,
            host_lu: Vec::new(),
            factor: None,
        }
    }

    /// Host copy of the last factor (diagonal blocks inverted)
    pub fn host_factor(&self) -> &[f64] {
        &self.host_lu
    }

    /// Number of (forward, backward) sweep levels
    pub fn num_levels(&self) -> Option<(usize, usize)> {
        self.analysis
            .as_ref()
            .map(|a| (a.lower.num_levels, a.upper.num_levels))
    }
}

impl<R: Runtime> Preconditioner<R> for Bilu0<R> {
    fn kind(&self) -> PreconditionerKind {
        PreconditionerKind::Ilu0
    }

    fn sweep_levels(&self) -> Option<(usize, usize)> {
        self.num_levels()
    }

    fn analyze(&mut self, _client: &R::Client, pattern: &BlockedMatrix) -> Result<()> {
        let analysis = Ilu0Analysis::new(pattern)?;
        log::debug!(
            "bilu0 analysis: {} block rows, {} forward levels, {} backward levels, max parallelism {}",
            analysis.nb,
            analysis.lower.num_levels,
            analysis.upper.num_levels,
            analysis.lower.max_parallelism
        );
        self.analysis = Some(analysis);
        self.factor = None;
        self.host_lu.clear();
        Ok(())
    }

    fn build(
        &mut self,
        client: &R::Client,
        matrix: &BlockedMatrix,
        _device_matrix: &DeviceBlockMatrix<R>,
    ) -> Result<()> {
        let analysis = self.analysis.as_ref().ok_or_else(|| not_analyzed("bilu0 build"))?;
        if !analysis.matches(matrix) {
            return Err(Error::invalid_dimension(
                "bilu0 matrix",
                "pattern differs from the analyzed one",
            ));
        }
        let lu = factorize(analysis, matrix.values(), self.options.pivot_threshold)?;

        match self.factor.as_mut() {
            Some(factor) => factor.lu.update_values(client, &lu)?,
            None => {
                let device_lu = DeviceBlockMatrix::from_parts(
                    client,
                    analysis.nb,
                    analysis.nb,
                    analysis.block_size,
                    &analysis.row_ptrs,
                    &analysis.col_indices,
                    &lu,
                    "ilu_factor",
                )?;
                let sweep = TriangularSweep::upload(
                    client,
                    &analysis.diag_ptrs,
                    &analysis.lower,
                    &analysis.upper,
                )?;
                self.factor = Some(Ilu0Factor {
                    lu: device_lu,
                    sweep,
                });
            }
        }
        self.host_lu = lu;
        Ok(())
    }

    fn apply(
        &mut self,
        client: &R::Client,
        _a: &DeviceBlockMatrix<R>,
        input: &R::Vector,
        output: &mut R::Vector,
    ) -> Result<()> {
        let factor = self.factor.as_ref().ok_or_else(|| not_built("bilu0 apply"))?;
        client.copy(input, output)?;
        for level in 0..factor.sweep.lower().num_levels() {
            client.block_trsv_level(&factor.lu, &factor.sweep, level, true, output)?;
        }
        for level in 0..factor.sweep.upper().num_levels() {
            client.block_trsv_level(&factor.lu, &factor.sweep, level, false, output)?;
        }
        Ok(())
    }
}
