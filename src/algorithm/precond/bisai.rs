//! Block incomplete sparse approximate inverse (ISAI)
//!
//! Starting from the block ILU(0) factor `L U`, ISAI computes explicit
//! sparse approximations `M_L ≈ inv(L)` and `M_U ≈ inv(U)` on a prescribed
//! pattern. Row `i` of `M` with pattern `P` solves
//!
//! ```text
//! sum_{k in P} M[i,k] T[k,j] = delta_ij I     for every j in P
//! ```
//!
//! which is one small dense system per block row. Applying the
//! preconditioner is then two SpMVs, with no level synchronization at all.

use super::bilu0::{Ilu0Analysis, IluOptions, factorize};
use super::{Preconditioner, PreconditionerKind, not_analyzed, not_built};
use crate::error::{Error, Result};
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::{BlockedMatrix, DeviceBlockMatrix, block};
use serde::Deserialize;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Configuration options for block ISAI
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IsaiOptions {
    /// Use the pattern of `A^2` instead of `A` for the approximate inverses
    pub widen_pattern: bool,
}

/// Pattern of one triangular approximate inverse
#[derive(Debug, Clone)]
struct InversePattern {
    row_ptrs: Vec<usize>,
    col_indices: Vec<usize>,
}

impl InversePattern {
    fn row(&self, i: usize) -> &[usize] {
        &self.col_indices[self.row_ptrs[i]..self.row_ptrs[i + 1]]
    }
}

/// Split the (optionally widened) pattern into lower-with-diagonal and
/// upper-with-diagonal parts
fn inverse_patterns(analysis: &Ilu0Analysis, widen: bool) -> (InversePattern, InversePattern) {
    let nb = analysis.nb;
    let rp = &analysis.row_ptrs;
    let ci = &analysis.col_indices;

    let rows: Vec<Vec<usize>> = (0..nb)
        .map(|i| {
            let mut cols: Vec<usize> = ci[rp[i]..rp[i + 1]].to_vec();
            if widen {
                for &k in &ci[rp[i]..rp[i + 1]] {
                    cols.extend_from_slice(&ci[rp[k]..rp[k + 1]]);
                }
                cols.sort_unstable();
                cols.dedup();
            }
            cols
        })
        .collect();

    let mut lower = InversePattern {
        row_ptrs: vec![0],
        col_indices: Vec::new(),
    };
    let mut upper = lower.clone();
    for (i, cols) in rows.iter().enumerate() {
        lower.col_indices.extend(cols.iter().filter(|&&c| c <= i));
        lower.row_ptrs.push(lower.col_indices.len());
        upper.col_indices.extend(cols.iter().filter(|&&c| c >= i));
        upper.row_ptrs.push(upper.col_indices.len());
    }
    (lower, upper)
}

/// Block `T[k,j]` of the unit lower factor, or of the upper factor with its
/// true (non-inverted) diagonal, looked up in the ILU(0) pattern
struct TriangularFactor<'a> {
    analysis: &'a Ilu0Analysis,
    lu: &'a [f64],
    diag_blocks: Vec<f64>,
    lower: bool,
}

impl TriangularFactor<'_> {
    fn block_into(&self, k: usize, j: usize, out: &mut [f64]) {
        let bs = self.analysis.block_size;
        let bb = bs * bs;
        if k == j {
            if self.lower {
                out.copy_from_slice(&block::identity_block(bs));
            } else {
                out.copy_from_slice(&self.diag_blocks[k * bb..(k + 1) * bb]);
            }
            return;
        }
        if (self.lower && j > k) || (!self.lower && j < k) {
            out.fill(0.0);
            return;
        }
        let rp = &self.analysis.row_ptrs;
        let row = &self.analysis.col_indices[rp[k]..rp[k + 1]];
        match row.binary_search(&j) {
            Ok(off) => {
                let idx = rp[k] + off;
                out.copy_from_slice(&self.lu[idx * bb..(idx + 1) * bb]);
            }
            Err(_) => out.fill(0.0),
        }
    }
}

/// Solve for the blocks of row `i` of the approximate inverse
fn isai_row(factor: &TriangularFactor<'_>, pattern: &[usize], i: usize) -> Result<Vec<f64>> {
    let bs = factor.analysis.block_size;
    let bb = bs * bs;
    let m = pattern.len();
    let n = m * bs;

    // S^T with S[(k,j)] = T[pattern[k], pattern[j]]
    let mut st = vec![0.0; n * n];
    let mut blk = vec![0.0; bb];
    for (kk, &k) in pattern.iter().enumerate() {
        for (jj, &j) in pattern.iter().enumerate() {
            factor.block_into(k, j, &mut blk);
            for r in 0..bs {
                for c in 0..bs {
                    // S row kk*bs + r, col jj*bs + c  ->  S^T row jj*bs + c, col kk*bs + r
                    st[(jj * bs + c) * n + kk * bs + r] = blk[r * bs + c];
                }
            }
        }
    }

    let pos = pattern
        .binary_search(&i)
        .map_err(|_| Error::analysis(format!("isai pattern of row {i} lacks the diagonal")))?;
    let mut rhs = vec![0.0; n * bs];
    for r in 0..bs {
        rhs[(pos * bs + r) * bs + r] = 1.0;
    }
    block::solve_dense(&mut st, &mut rhs, n, bs).map_err(|pivot| Error::SingularPivot {
        block_row: i,
        pivot,
    })?;

    // M[i, pattern[kk]] (r, c) = sol[(kk*bs + c), r]
    let mut out = vec![0.0; m * bb];
    for kk in 0..m {
        for r in 0..bs {
            for c in 0..bs {
                out[kk * bb + r * bs + c] = rhs[(kk * bs + c) * bs + r];
            }
        }
    }
    Ok(out)
}

fn approximate_inverse(factor: &TriangularFactor<'_>, pattern: &InversePattern) -> Result<Vec<f64>> {
    let nb = factor.analysis.nb;

    #[cfg(feature = "rayon")]
    let rows: Vec<Vec<f64>> = (0..nb)
        .into_par_iter()
        .map(|i| isai_row(factor, pattern.row(i), i))
        .collect::<Result<_>>()?;
    #[cfg(not(feature = "rayon"))]
    let rows: Vec<Vec<f64>> = (0..nb)
        .map(|i| isai_row(factor, pattern.row(i), i))
        .collect::<Result<_>>()?;

    Ok(rows.concat())
}

struct IsaiOperators<R: Runtime> {
    m_lower: DeviceBlockMatrix<R>,
    m_upper: DeviceBlockMatrix<R>,
    tmp: R::Vector,
}

/// Block ISAI preconditioner
pub struct Bisai<R: Runtime> {
    ilu_options: IluOptions,
    options: IsaiOptions,
    analysis: Option<(Ilu0Analysis, InversePattern, InversePattern)>,
    operators: Option<IsaiOperators<R>>,
}

impl<R: Runtime> Bisai<R> {
    /// Create an unanalyzed preconditioner
    pub fn new(ilu_options: IluOptions, options: IsaiOptions) -> Self {
        Self {
            ilu_options,
            options,
            analysis: None,
            operators: None,
        }
    }

    /// Stored blocks of `(M_L, M_U)`
    pub fn nnzb(&self) -> Option<(usize, usize)> {
        self.analysis
            .as_ref()
            .map(|(_, l, u)| (l.col_indices.len(), u.col_indices.len()))
    }
}

impl<R: Runtime> Preconditioner<R> for Bisai<R> {
    fn kind(&self) -> PreconditionerKind {
        PreconditionerKind::Isai
    }

    fn analyze(&mut self, _client: &R::Client, pattern: &BlockedMatrix) -> Result<()> {
        let analysis = Ilu0Analysis::new(pattern)?;
        let (lower, upper) = inverse_patterns(&analysis, self.options.widen_pattern);
        log::debug!(
            "bisai analysis: {} block rows, M_L {} blocks, M_U {} blocks",
            analysis.nb,
            lower.col_indices.len(),
            upper.col_indices.len()
        );
        self.analysis = Some((analysis, lower, upper));
        self.operators = None;
        Ok(())
    }

    fn build(
        &mut self,
        client: &R::Client,
        matrix: &BlockedMatrix,
        _device_matrix: &DeviceBlockMatrix<R>,
    ) -> Result<()> {
        let (analysis, lower, upper) =
            self.analysis.as_ref().ok_or_else(|| not_analyzed("bisai build"))?;
        Error::check_len("bisai values", analysis.col_indices.len(), matrix.nnzb())?;
        let lu = factorize(analysis, matrix.values(), self.ilu_options.pivot_threshold)?;

        // recover U_ii from the stored inverse
        let bs = analysis.block_size;
        let bb = bs * bs;
        let mut diag_blocks = vec![0.0; analysis.nb * bb];
        for (row, &d) in analysis.diag_ptrs.iter().enumerate() {
            block::invert_block(
                &lu[d * bb..(d + 1) * bb],
                &mut diag_blocks[row * bb..(row + 1) * bb],
                bs,
                self.ilu_options.pivot_threshold,
            )
            .map_err(|pivot| Error::SingularPivot {
                block_row: row,
                pivot,
            })?;
        }

        let l_factor = TriangularFactor {
            analysis,
            lu: &lu,
            diag_blocks: Vec::new(),
            lower: true,
        };
        let u_factor = TriangularFactor {
            analysis,
            lu: &lu,
            diag_blocks,
            lower: false,
        };
        let m_lower = approximate_inverse(&l_factor, lower)?;
        let m_upper = approximate_inverse(&u_factor, upper)?;

        match self.operators.as_mut() {
            Some(ops) => {
                ops.m_lower.update_values(client, &m_lower)?;
                ops.m_upper.update_values(client, &m_upper)?;
            }
            None => {
                let nb = analysis.nb;
                self.operators = Some(IsaiOperators {
                    m_lower: DeviceBlockMatrix::from_parts(
                        client,
                        nb,
                        nb,
                        bs,
                        &lower.row_ptrs,
                        &lower.col_indices,
                        &m_lower,
                        "isai_lower",
                    )?,
                    m_upper: DeviceBlockMatrix::from_parts(
                        client,
                        nb,
                        nb,
                        bs,
                        &upper.row_ptrs,
                        &upper.col_indices,
                        &m_upper,
                        "isai_upper",
                    )?,
                    tmp: client.alloc_vector(nb * bs, "isai_tmp")?,
                });
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        client: &R::Client,
        _a: &DeviceBlockMatrix<R>,
        input: &R::Vector,
        output: &mut R::Vector,
    ) -> Result<()> {
        let ops = self.operators.as_mut().ok_or_else(|| not_built("bisai apply"))?;
        client.spmv(&ops.m_lower, input, &mut ops.tmp)?;
        client.spmv(&ops.m_upper, &ops.tmp, output)
    }
}
