//! Algebraic Multigrid (AMG) for the CPR pressure stage
//!
//! Classical Ruge-Stüben AMG with:
//! - Strength-of-connection based coarsening
//! - PMIS independent set selection
//! - Direct interpolation
//! - Galerkin coarse grid operators
//! - Weighted Jacobi smoothing
//! - V-cycle iteration
//!
//! The hierarchy is built on the host once per value update. A V-cycle runs
//! entirely through [`KernelOps`]: the Jacobi smoother is stored as the
//! diagonal matrix `omega * inv(D)`, so every step is an `spmv` or an `axpy`.

use super::amg_coarsen::{
    build_interpolation, galerkin_coarse_operator, pmis_coarsening, strength_of_connection,
};
use crate::error::Result;
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::{CsrMatrix, DeviceBlockMatrix, block};
use serde::Deserialize;

/// A coarsest level above both this and `coarse_size` is smoothed instead
/// of inverted. Stalled coarsening can leave a large coarsest level, and its
/// dense inverse costs O(n^3) at setup and O(n^2) per V-cycle.
const DENSE_COARSE_LIMIT: usize = 128;

/// Configuration options for AMG
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AmgOptions {
    /// Maximum number of multigrid levels (default: 25)
    pub max_levels: usize,
    /// Strength-of-connection threshold (default: 0.25)
    ///
    /// Connection i→j is "strong" if |a_ij| >= theta * max_k(|a_ik|)
    pub strength_threshold: f64,
    /// Pre-smoothing sweeps per level (default: 1)
    pub pre_smooth: usize,
    /// Post-smoothing sweeps per level (default: 1)
    pub post_smooth: usize,
    /// Smoother relaxation weight (default: 2/3)
    pub smoother_omega: f64,
    /// Stop coarsening at or below this many unknowns (default: 10)
    pub coarse_size: usize,
    /// Jacobi sweeps on the coarsest level when it cannot be inverted
    /// (default: 50)
    pub coarse_sweeps: usize,
}

impl Default for AmgOptions {
    fn default() -> Self {
        Self {
            max_levels: 25,
            strength_threshold: 0.25,
            pre_smooth: 1,
            post_smooth: 1,
            smoother_omega: 2.0 / 3.0,
            coarse_size: 10,
            coarse_sweeps: 50,
        }
    }
}

/// Scaled inverse diagonal `omega / a_ii` as a diagonal CSR matrix.
/// Zero diagonal entries leave their unknown untouched.
fn jacobi_operator(a: &CsrMatrix, omega: f64) -> Result<CsrMatrix> {
    let n = a.nrows();
    let mut zero_rows = 0;
    let rows: Vec<Vec<(usize, f64)>> = a
        .diagonal()
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            if d == 0.0 || !d.is_finite() {
                zero_rows += 1;
                vec![(i, 0.0)]
            } else {
                vec![(i, omega / d)]
            }
        })
        .collect();
    if zero_rows > 0 {
        log::warn!("amg: {zero_rows} zero diagonal entries excluded from Jacobi smoothing");
    }
    CsrMatrix::from_rows(n, n, rows)
}

/// Dense inverse as a full CSR matrix, `None` when singular
fn dense_inverse(a: &CsrMatrix) -> Option<CsrMatrix> {
    let n = a.nrows();
    let mut mat = a.to_dense();
    let mut inv = block::identity_block(n);
    block::solve_dense(&mut mat, &mut inv, n, n).ok()?;
    let rows = (0..n)
        .map(|i| (0..n).map(|j| (j, inv[i * n + j])).collect())
        .collect();
    CsrMatrix::from_rows(n, n, rows).ok()
}

/// Operators and work vectors of one level above the coarsest
struct AmgLevel<R: Runtime> {
    a: DeviceBlockMatrix<R>,
    jacobi: DeviceBlockMatrix<R>,
    restriction: DeviceBlockMatrix<R>,
    prolongation: DeviceBlockMatrix<R>,
    x: R::Vector,
    b: R::Vector,
    r: R::Vector,
    tmp: R::Vector,
}

enum CoarseSolver<R: Runtime> {
    Dense {
        inverse: DeviceBlockMatrix<R>,
    },
    Jacobi {
        a: DeviceBlockMatrix<R>,
        jacobi: DeviceBlockMatrix<R>,
        r: R::Vector,
        tmp: R::Vector,
    },
}

struct CoarseLevel<R: Runtime> {
    solver: CoarseSolver<R>,
    x: R::Vector,
    b: R::Vector,
}

/// AMG multigrid hierarchy (precomputed during setup)
pub struct AmgHierarchy<R: Runtime> {
    levels: Vec<AmgLevel<R>>,
    coarse: CoarseLevel<R>,
    sizes: Vec<usize>,
    options: AmgOptions,
}

/// `x += J (b - A x)`, `sweeps` times
#[allow(clippy::too_many_arguments)]
fn jacobi_sweeps<R: Runtime>(
    client: &R::Client,
    a: &DeviceBlockMatrix<R>,
    jacobi: &DeviceBlockMatrix<R>,
    b: &R::Vector,
    x: &mut R::Vector,
    r: &mut R::Vector,
    tmp: &mut R::Vector,
    sweeps: usize,
) -> Result<()> {
    for _ in 0..sweeps {
        client.spmv(a, x, tmp)?;
        client.copy(b, r)?;
        client.axpy(tmp, -1.0, r)?;
        client.spmv(jacobi, r, tmp)?;
        client.axpy(tmp, 1.0, x)?;
    }
    Ok(())
}

impl<R: Runtime> AmgHierarchy<R> {
    /// Build the hierarchy for a square scalar matrix
    ///
    /// This is host-side work: coarsening is a sequential greedy process and
    /// the Galerkin product uses irregular accumulation. It runs once per
    /// value update; every V-cycle after that stays on the device.
    pub fn setup(client: &R::Client, a: &CsrMatrix, options: &AmgOptions) -> Result<Self> {
        let mut host_ops = vec![a.clone()];
        let mut transfers: Vec<(CsrMatrix, CsrMatrix)> = Vec::new();

        while host_ops.len() < options.max_levels.max(1) {
            let Some(current) = host_ops.last() else { break };
            let n = current.nrows();
            if n <= options.coarse_size {
                break;
            }

            let strong = strength_of_connection(current, options.strength_threshold);
            let splitting = pmis_coarsening(&strong, n);
            if splitting.n_coarse == 0 || splitting.n_coarse >= n {
                break; // Can't coarsen further
            }

            let p = build_interpolation(current, &splitting, &strong)?;
            let r = p.transpose();
            let a_coarse = galerkin_coarse_operator(current, &p, &r)?;
            transfers.push((r, p));
            host_ops.push(a_coarse);
        }

        let sizes: Vec<usize> = host_ops.iter().map(|m| m.nrows()).collect();
        let omega = options.smoother_omega;

        let mut levels = Vec::with_capacity(transfers.len());
        for (op, (r, p)) in host_ops.iter().zip(&transfers) {
            let n = op.nrows();
            levels.push(AmgLevel {
                a: DeviceBlockMatrix::upload_csr(client, op, "amg_a")?,
                jacobi: DeviceBlockMatrix::upload_csr(client, &jacobi_operator(op, omega)?, "amg_jacobi")?,
                restriction: DeviceBlockMatrix::upload_csr(client, r, "amg_r")?,
                prolongation: DeviceBlockMatrix::upload_csr(client, p, "amg_p")?,
                x: client.alloc_vector(n, "amg_x")?,
                b: client.alloc_vector(n, "amg_b")?,
                r: client.alloc_vector(n, "amg_r")?,
                tmp: client.alloc_vector(n, "amg_tmp")?,
            });
        }

        let coarsest = host_ops.last().unwrap_or(a);
        let nc = coarsest.nrows();
        let inverse = if nc <= options.coarse_size.max(DENSE_COARSE_LIMIT) {
            dense_inverse(coarsest)
        } else {
            None
        };
        let solver = match inverse {
            Some(inv) => CoarseSolver::Dense {
                inverse: DeviceBlockMatrix::upload_csr(client, &inv, "amg_coarse_inverse")?,
            },
            None => {
                log::debug!(
                    "amg: coarsest level ({nc} unknowns) solved by {} Jacobi sweeps",
                    options.coarse_sweeps
                );
                CoarseSolver::Jacobi {
                    a: DeviceBlockMatrix::upload_csr(client, coarsest, "amg_coarse_a")?,
                    jacobi: DeviceBlockMatrix::upload_csr(
                        client,
                        &jacobi_operator(coarsest, omega)?,
                        "amg_coarse_jacobi",
                    )?,
                    r: client.alloc_vector(nc, "amg_coarse_r")?,
                    tmp: client.alloc_vector(nc, "amg_coarse_tmp")?,
                }
            }
        };
        let coarse = CoarseLevel {
            solver,
            x: client.alloc_vector(nc, "amg_coarse_x")?,
            b: client.alloc_vector(nc, "amg_coarse_b")?,
        };

        log::debug!("amg hierarchy: level sizes {sizes:?}");
        Ok(Self {
            levels,
            coarse,
            sizes,
            options: options.clone(),
        })
    }

    /// Number of levels including the coarsest
    pub fn num_levels(&self) -> usize {
        self.sizes.len()
    }

    /// Unknowns per level, finest first
    pub fn level_sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// True when the coarsest level is solved with a dense inverse
    pub fn has_direct_coarse_solve(&self) -> bool {
        matches!(self.coarse.solver, CoarseSolver::Dense { .. })
    }

    fn solve_coarse(&mut self, client: &R::Client) -> Result<()> {
        let coarse = &mut self.coarse;
        match &mut coarse.solver {
            CoarseSolver::Dense { inverse } => client.spmv(inverse, &coarse.b, &mut coarse.x),
            CoarseSolver::Jacobi { a, jacobi, r, tmp } => {
                client.fill_zero(&mut coarse.x)?;
                jacobi_sweeps::<R>(
                    client,
                    a,
                    jacobi,
                    &coarse.b,
                    &mut coarse.x,
                    r,
                    tmp,
                    self.options.coarse_sweeps,
                )
            }
        }
    }

    /// Apply one V-cycle with zero initial guess: `out ≈ A^-1 rhs`.
    ///
    /// Every step is linear in `rhs`, so the cycle is a fixed linear
    /// operator usable as a preconditioner.
    pub fn vcycle(&mut self, client: &R::Client, rhs: &R::Vector, out: &mut R::Vector) -> Result<()> {
        let pre = self.options.pre_smooth;
        let post = self.options.post_smooth;

        if self.levels.is_empty() {
            client.copy(rhs, &mut self.coarse.b)?;
            self.solve_coarse(client)?;
            return client.copy(&self.coarse.x, out);
        }

        client.copy(rhs, &mut self.levels[0].b)?;

        // Downward: smooth, restrict the residual
        let num = self.levels.len();
        for l in 0..num {
            let (head, tail) = self.levels.split_at_mut(l + 1);
            let lvl = &mut head[l];
            client.fill_zero(&mut lvl.x)?;
            jacobi_sweeps::<R>(
                client, &lvl.a, &lvl.jacobi, &lvl.b, &mut lvl.x, &mut lvl.r, &mut lvl.tmp, pre,
            )?;
            client.spmv(&lvl.a, &lvl.x, &mut lvl.tmp)?;
            client.copy(&lvl.b, &mut lvl.r)?;
            client.axpy(&lvl.tmp, -1.0, &mut lvl.r)?;
            let next_b = match tail.first_mut() {
                Some(next) => &mut next.b,
                None => &mut self.coarse.b,
            };
            client.spmv(&lvl.restriction, &lvl.r, next_b)?;
        }

        self.solve_coarse(client)?;

        // Upward: prolongate the correction, smooth
        for l in (0..num).rev() {
            let (head, tail) = self.levels.split_at_mut(l + 1);
            let lvl = &mut head[l];
            let coarse_x = match tail.first() {
                Some(next) => &next.x,
                None => &self.coarse.x,
            };
            client.spmv(&lvl.prolongation, coarse_x, &mut lvl.tmp)?;
            client.axpy(&lvl.tmp, 1.0, &mut lvl.x)?;
            jacobi_sweeps::<R>(
                client, &lvl.a, &lvl.jacobi, &lvl.b, &mut lvl.x, &mut lvl.r, &mut lvl.tmp, post,
            )?;
        }

        client.copy(&self.levels[0].x, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::CpuRuntime;

    fn client() -> <CpuRuntime as Runtime>::Client {
        let device = CpuRuntime::select_device(0, 0).unwrap();
        CpuRuntime::create_client(&device).unwrap()
    }

    fn laplace_2d(m: usize) -> CsrMatrix {
        let n = m * m;
        let rows = (0..n)
            .map(|i| {
                let (r, c) = (i / m, i % m);
                let mut row = vec![(i, 4.0)];
                if c > 0 {
                    row.push((i - 1, -1.0));
                }
                if c + 1 < m {
                    row.push((i + 1, -1.0));
                }
                if r > 0 {
                    row.push((i - m, -1.0));
                }
                if r + 1 < m {
                    row.push((i + m, -1.0));
                }
                row
            })
            .collect();
        CsrMatrix::from_rows(n, n, rows).unwrap()
    }

    #[test]
    fn test_hierarchy_coarsens() {
        let client = client();
        let a = laplace_2d(12);
        let h = AmgHierarchy::<CpuRuntime>::setup(&client, &a, &AmgOptions::default()).unwrap();
        assert!(h.num_levels() > 1);
        assert!(h.level_sizes().windows(2).all(|w| w[1] < w[0]));
        assert!(h.has_direct_coarse_solve());
    }

    #[test]
    fn test_vcycle_reduces_error() {
        let client = client();
        let a = laplace_2d(12);
        let n = a.nrows();
        let mut h = AmgHierarchy::<CpuRuntime>::setup(&client, &a, &AmgOptions::default()).unwrap();

        let x_true: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let mut b = vec![0.0; n];
        a.spmv(&x_true, &mut b).unwrap();

        let mut x = vec![0.0; n];
        h.vcycle(&client, &b, &mut x).unwrap();

        let mut ax = vec![0.0; n];
        a.spmv(&x, &mut ax).unwrap();
        let res: f64 = ax.iter().zip(&b).map(|(l, r)| (l - r).powi(2)).sum::<f64>().sqrt();
        let bn: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!(res < 0.9 * bn, "residual {res} vs {bn}");
    }

    #[test]
    fn test_small_system_is_solved_directly() {
        let client = client();
        let a = laplace_2d(3);
        let mut h = AmgHierarchy::<CpuRuntime>::setup(&client, &a, &AmgOptions::default()).unwrap();
        assert_eq!(h.num_levels(), 1);

        let b = vec![1.0; 9];
        let mut x = vec![0.0; 9];
        h.vcycle(&client, &b, &mut x).unwrap();
        let mut ax = vec![0.0; 9];
        a.spmv(&x, &mut ax).unwrap();
        for v in ax {
            assert!((v - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_stalled_coarsening_uses_jacobi_coarse_solve() {
        // No off-diagonal couplings: nothing can be coarsened
        let client = client();
        let n = 300;
        let rows = (0..n).map(|i| vec![(i, 1.0 + (i % 5) as f64)]).collect();
        let a = CsrMatrix::from_rows(n, n, rows).unwrap();
        let mut h = AmgHierarchy::<CpuRuntime>::setup(&client, &a, &AmgOptions::default()).unwrap();
        assert_eq!(h.level_sizes(), &[n]);
        assert!(!h.has_direct_coarse_solve());

        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        h.vcycle(&client, &b, &mut x).unwrap();
        for (i, v) in x.iter().enumerate() {
            let expected = 1.0 / (1.0 + (i % 5) as f64);
            assert!((v - expected).abs() < 1e-8, "x[{i}] = {v}");
        }
    }
}
