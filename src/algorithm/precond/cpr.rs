//! Constrained pressure residual (CPR) preconditioner
//!
//! Two-stage preconditioner for coupled flow systems:
//!
//! 1. Decouple a pressure equation with quasi-IMPES weights `w_i`, solving
//!    `D_ii^T w_i = e_p` per cell (`D_ii` the diagonal block, `p` the
//!    pressure unknown), and approximate its inverse with one AMG V-cycle.
//! 2. Smooth the remaining coupled error with block ILU(0).
//!
//! ```text
//! rc = W^T r          (restriction, nb x n)
//! xc = AMG(rc)
//! x  = P xc           (prolongation into the pressure unknown, n x nb)
//! z  = ILU0(r - A x)
//! M^-1 r = x + z
//! ```

use super::amg::{AmgHierarchy, AmgOptions};
use super::bilu0::{Bilu0, IluOptions};
use super::{Preconditioner, PreconditionerKind, not_analyzed, not_built};
use crate::error::{Error, Result};
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::{BlockedMatrix, CsrMatrix, DeviceBlockMatrix, block};
use serde::Deserialize;

/// Configuration options for CPR
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CprOptions {
    /// Index of the pressure unknown within a block (default: 0)
    pub pressure_index: usize,
}

/// Quasi-IMPES weights, `bs` per block row, each row scaled to `max|w| = 1`
pub fn quasi_impes_weights(matrix: &BlockedMatrix, pressure_index: usize) -> Result<Vec<f64>> {
    let bs = matrix.block_size();
    let bb = bs * bs;
    let mut weights = vec![0.0; matrix.nb() * bs];
    let mut dt = vec![0.0; bb];

    for row in 0..matrix.nb() {
        let diag = matrix.diagonal_index(row).ok_or_else(|| {
            Error::analysis(format!("block row {row} has no diagonal block"))
        })?;
        block::block_transpose(matrix.block(diag), &mut dt, bs);
        let w = &mut weights[row * bs..(row + 1) * bs];
        w.fill(0.0);
        w[pressure_index] = 1.0;
        block::solve_dense(&mut dt, w, bs, 1).map_err(|pivot| Error::SingularPivot {
            block_row: row,
            pivot,
        })?;
        let scale = block::max_abs(w);
        if scale > 0.0 {
            w.iter_mut().for_each(|v| *v /= scale);
        }
    }
    Ok(weights)
}

/// `Ap_ij = sum_k w_i[k] A_ij[k][p]` on the block pattern
pub fn pressure_matrix(
    matrix: &BlockedMatrix,
    weights: &[f64],
    pressure_index: usize,
) -> Result<CsrMatrix> {
    let bs = matrix.block_size();
    let nb = matrix.nb();
    let rp = matrix.row_pointers();
    let values: Vec<f64> = (0..matrix.nnzb())
        .map(|k| {
            let row = rp.partition_point(|&p| p <= k) - 1;
            let blk = matrix.block(k);
            (0..bs)
                .map(|r| weights[row * bs + r] * blk[r * bs + pressure_index])
                .sum()
        })
        .collect();
    CsrMatrix::new(nb, nb, rp.to_vec(), matrix.col_indices().to_vec(), values)
}

/// Restriction `W^T` (nb x n): row `i` holds `w_i` at columns `i*bs..`
fn restriction_operator(nb: usize, bs: usize, weights: &[f64]) -> Result<CsrMatrix> {
    let rows = (0..nb)
        .map(|i| (0..bs).map(|k| (i * bs + k, weights[i * bs + k])).collect())
        .collect();
    CsrMatrix::from_rows(nb, nb * bs, rows)
}

/// Prolongation (n x nb): unit entry from cell `i` into its pressure unknown
fn prolongation_operator(nb: usize, bs: usize, pressure_index: usize) -> Result<CsrMatrix> {
    let rows = (0..nb * bs)
        .map(|r| {
            if r % bs == pressure_index {
                vec![(r / bs, 1.0)]
            } else {
                Vec::new()
            }
        })
        .collect();
    CsrMatrix::from_rows(nb * bs, nb, rows)
}

struct CprStage<R: Runtime> {
    restriction: DeviceBlockMatrix<R>,
    prolongation: DeviceBlockMatrix<R>,
    amg: AmgHierarchy<R>,
    rc: R::Vector,
    xc: R::Vector,
    corrected: R::Vector,
    tmp: R::Vector,
}

/// CPR preconditioner with quasi-IMPES weights
pub struct Cpr<R: Runtime> {
    options: CprOptions,
    amg_options: AmgOptions,
    ilu: Bilu0<R>,
    analyzed: Option<(usize, usize)>,
    stage: Option<CprStage<R>>,
}

impl<R: Runtime> Cpr<R> {
    /// Create an unanalyzed preconditioner
    pub fn new(options: CprOptions, amg_options: AmgOptions, ilu_options: IluOptions) -> Self {
        Self {
            options,
            amg_options,
            ilu: Bilu0::new(ilu_options),
            analyzed: None,
            stage: None,
        }
    }

    /// Unknowns per AMG level of the last build
    pub fn amg_level_sizes(&self) -> Option<&[usize]> {
        self.stage.as_ref().map(|s| s.amg.level_sizes())
    }
}

impl<R: Runtime> Preconditioner<R> for Cpr<R> {
    fn kind(&self) -> PreconditionerKind {
        PreconditionerKind::CprQuasiImpes
    }

    fn sweep_levels(&self) -> Option<(usize, usize)> {
        self.ilu.num_levels()
    }

    fn analyze(&mut self, client: &R::Client, pattern: &BlockedMatrix) -> Result<()> {
        let bs = pattern.block_size();
        if self.options.pressure_index >= bs {
            return Err(Error::unsupported(
                "cpr.pressure_index",
                self.options.pressure_index.to_string(),
                format!("block size is {bs}"),
            ));
        }
        self.ilu.analyze(client, pattern)?;
        self.analyzed = Some((pattern.nb(), bs));
        self.stage = None;
        Ok(())
    }

    fn build(
        &mut self,
        client: &R::Client,
        matrix: &BlockedMatrix,
        device_matrix: &DeviceBlockMatrix<R>,
    ) -> Result<()> {
        let (nb, bs) = self.analyzed.ok_or_else(|| not_analyzed("cpr build"))?;
        let p = self.options.pressure_index;

        self.ilu.build(client, matrix, device_matrix)?;

        let weights = quasi_impes_weights(matrix, p)?;
        let ap = pressure_matrix(matrix, &weights, p)?;
        let amg = AmgHierarchy::setup(client, &ap, &self.amg_options)?;

        let restriction = restriction_operator(nb, bs, &weights)?;
        match self.stage.as_mut() {
            Some(stage) => {
                stage.restriction.update_values(client, restriction.values())?;
                stage.amg = amg;
            }
            None => {
                let prolongation = prolongation_operator(nb, bs, p)?;
                self.stage = Some(CprStage {
                    restriction: DeviceBlockMatrix::upload_csr(client, &restriction, "cpr_restriction")?,
                    prolongation: DeviceBlockMatrix::upload_csr(client, &prolongation, "cpr_prolongation")?,
                    amg,
                    rc: client.alloc_vector(nb, "cpr_rc")?,
                    xc: client.alloc_vector(nb, "cpr_xc")?,
                    corrected: client.alloc_vector(nb * bs, "cpr_corrected")?,
                    tmp: client.alloc_vector(nb * bs, "cpr_tmp")?,
                });
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        client: &R::Client,
        a: &DeviceBlockMatrix<R>,
        input: &R::Vector,
        output: &mut R::Vector,
    ) -> Result<()> {
        let stage = self.stage.as_mut().ok_or_else(|| not_built("cpr apply"))?;

        // pressure stage: output = P AMG(W^T r)
        client.spmv(&stage.restriction, input, &mut stage.rc)?;
        stage.amg.vcycle(client, &stage.rc, &mut stage.xc)?;
        client.spmv(&stage.prolongation, &stage.xc, output)?;

        // corrected residual r - A x
        client.spmv(a, output, &mut stage.tmp)?;
        client.copy(input, &mut stage.corrected)?;
        client.axpy(&stage.tmp, -1.0, &mut stage.corrected)?;

        // coupled stage
        self.ilu.apply(client, a, &stage.corrected, &mut stage.tmp)?;
        client.axpy(&stage.tmp, 1.0, output)
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

    /// 1D two-phase-like system: pressure couples strongly between cells,
    /// saturation mostly locally
    fn coupled_1d(nb: usize) -> BlockedMatrix {
        let mut blocks = Vec::new();
        for i in 0..nb {
            blocks.push((i, i, vec![2.5, 0.3, 0.4, 1.5]));
            if i > 0 {
                blocks.push((i, i - 1, vec![-1.0, 0.0, -0.1, -0.2]));
            }
            if i + 1 < nb {
                blocks.push((i, i + 1, vec![-1.0, 0.0, -0.1, -0.2]));
            }
        }
        BlockedMatrix::from_blocks(nb, 2, blocks).unwrap()
    }

    #[test]
    fn test_weights_decouple_pressure() {
        let m = coupled_1d(3);
        let w = quasi_impes_weights(&m, 0).unwrap();
        // D^T w = c e_0, so w^T D has no component on the saturation column
        let d = m.block(m.diagonal_index(1).unwrap());
        let second = w[2] * d[1] + w[3] * d[3];
        assert!(second.abs() < 1e-14);
        assert!((block::max_abs(&w[2..4]) - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_pressure_matrix_pattern() {
        let m = coupled_1d(4);
        let w = quasi_impes_weights(&m, 0).unwrap();
        let ap = pressure_matrix(&m, &w, 0).unwrap();
        assert_eq!(ap.nnz(), m.nnzb());
        assert_eq!(ap.row_ptrs(), m.row_pointers());
        let expected = w[0] * 2.5 + w[1] * 0.4;
        assert!((ap.values()[0] - expected).abs() < 1e-14);
    }

    #[test]
    fn test_pressure_index_out_of_range() {
        let client = client();
        let m = coupled_1d(3);
        let mut cpr = Cpr::<CpuRuntime>::new(
            CprOptions { pressure_index: 2 },
            AmgOptions::default(),
            IluOptions::default(),
        );
        assert!(matches!(
            cpr.analyze(&client, &m),
            Err(Error::UnsupportedConfiguration { .. })
        ));
    }

    #[test]
    fn test_apply_reduces_residual() {
        let client = client();
        let m = coupled_1d(30);
        let dm = DeviceBlockMatrix::<CpuRuntime>::upload(&client, &m, "a").unwrap();
        let mut cpr =
            Cpr::<CpuRuntime>::new(CprOptions::default(), AmgOptions::default(), IluOptions::default());
        cpr.analyze(&client, &m).unwrap();
        cpr.build(&client, &m, &dm).unwrap();
        assert!(cpr.amg_level_sizes().is_some());

        let r: Vec<f64> = (0..60).map(|i| ((i % 5) as f64) - 2.0).collect();
        let mut z = vec![0.0; 60];
        cpr.apply(&client, &dm, &r, &mut z).unwrap();

        let mut az = vec![0.0; 60];
        m.spmv(&z, &mut az).unwrap();
        let res: f64 = az.iter().zip(&r).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
        let rn: f64 = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!(res < rn);
    }
}
