//! Well contributions added to the matrix-vector product
//!
//! A reservoir system `A x = b` is extended by wells that are not stored in
//! `A`. The solver adds their effect right after every SpMV:
//!
//! ```text
//! y = A x
//! y += wells(x)
//! ```
//!
//! [`StandardWellContributions`] models each well as a set of completion
//! cells. Every completion carries a `bs x bs` derivative block `D_c`, and a
//! well may carry a Schur-complement coupling to its own well equations:
//!
//! ```text
//! y[c] += D_c x[c]              for every completion c
//! y    -= C^T D_w^-1 B x        for every coupled well
//! ```
//!
//! Cell indices are given in natural order. `set_reordering` maps them to
//! solver order and uploads the device operators.

use crate::error::{Error, Result};
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::{BlockedMatrix, CsrMatrix, DeviceBlockMatrix, Permutation};

/// Interface the solver uses to inject well terms
pub trait WellContributions<R: Runtime>: Send {
    /// Number of wells; `apply` is skipped when zero
    fn num_wells(&self) -> usize;

    /// Map natural cell indices through `permutation` (identity when `None`)
    /// and upload the device operators.
    fn set_reordering(&mut self, client: &R::Client, permutation: Option<&Permutation>)
    -> Result<()>;

    /// `y += wells(x)` in solver order
    fn apply(&mut self, client: &R::Client, x: &R::Vector, y: &mut R::Vector) -> Result<()>;
}

/// Set without wells
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWells;

impl<R: Runtime> WellContributions<R> for NoWells {
    fn num_wells(&self) -> usize {
        0
    }

    fn set_reordering(&mut self, _client: &R::Client, _permutation: Option<&Permutation>) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, _client: &R::Client, _x: &R::Vector, _y: &mut R::Vector) -> Result<()> {
        Ok(())
    }
}

/// Coupling between a well's own equations and its completion cells
///
/// With `m` well equations and `k` completions of block size `bs`, `b` and
/// `c` are `m x (k * bs)` row-major and `d_inv` is `m x m` row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct WellCoupling {
    /// Number of well equations
    pub num_equations: usize,
    /// Derivatives of the well equations w.r.t. the cell unknowns
    pub b: Vec<f64>,
    /// Derivatives of the cell equations w.r.t. the well unknowns, transposed
    pub c: Vec<f64>,
    /// Inverse of the well equations' own Jacobian
    pub d_inv: Vec<f64>,
}

/// One well: completion cells with their derivative blocks
#[derive(Debug, Clone, PartialEq)]
pub struct StandardWell {
    cells: Vec<usize>,
    blocks: Vec<f64>,
    coupling: Option<WellCoupling>,
}

impl StandardWell {
    /// A well with one `bs x bs` block per completion cell
    pub fn new(block_size: usize, cells: Vec<usize>, blocks: Vec<f64>) -> Result<Self> {
        Error::check_len(
            "well completion blocks",
            cells.len() * block_size * block_size,
            blocks.len(),
        )?;
        let mut sorted = cells.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::invalid_dimension(
                "well cells",
                "a cell is completed twice in one well",
            ));
        }
        Ok(Self {
            cells,
            blocks,
            coupling: None,
        })
    }

    /// Attach the Schur-complement coupling
    pub fn with_coupling(mut self, block_size: usize, coupling: WellCoupling) -> Result<Self> {
        let m = coupling.num_equations;
        let width = self.cells.len() * block_size;
        Error::check_len("well coupling B", m * width, coupling.b.len())?;
        Error::check_len("well coupling C", m * width, coupling.c.len())?;
        Error::check_len("well coupling D^-1", m * m, coupling.d_inv.len())?;
        self.coupling = Some(coupling);
        Ok(self)
    }

    /// Completion cells in natural order
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// True when the well carries a coupling
    pub fn is_coupled(&self) -> bool {
        self.coupling.is_some()
    }
}

struct CouplingOps<R: Runtime> {
    /// `B`, all wells stacked: total equations x n
    b: DeviceBlockMatrix<R>,
    /// `D^-1`, block diagonal over wells
    d_inv: DeviceBlockMatrix<R>,
    /// `C^T`: n x total equations
    c_t: DeviceBlockMatrix<R>,
    bx: R::Vector,
    dbx: R::Vector,
}

struct DeviceWells<R: Runtime> {
    completions: DeviceBlockMatrix<R>,
    coupling: Option<CouplingOps<R>>,
    tmp: R::Vector,
}

/// Standard well model: completion blocks plus optional coupling
pub struct StandardWellContributions<R: Runtime> {
    nb: usize,
    block_size: usize,
    wells: Vec<StandardWell>,
    device: Option<DeviceWells<R>>,
}

impl<R: Runtime> StandardWellContributions<R> {
    /// Empty set for a system of `nb` block rows
    pub fn new(nb: usize, block_size: usize) -> Self {
        Self {
            nb,
            block_size,
            wells: Vec::new(),
            device: None,
        }
    }

    /// Add a well. Invalidates the device operators until the next
    /// `set_reordering`.
    pub fn add_well(&mut self, well: StandardWell) -> Result<()> {
        Error::check_len(
            "well completion blocks",
            well.cells.len() * self.block_size * self.block_size,
            well.blocks.len(),
        )?;
        if let Some(&cell) = well.cells.iter().find(|&&c| c >= self.nb) {
            return Err(Error::invalid_dimension(
                "well cells",
                format!("cell {cell} outside {} block rows", self.nb),
            ));
        }
        if let Some(coupling) = &well.coupling {
            Error::check_len(
                "well coupling B",
                coupling.num_equations * well.cells.len() * self.block_size,
                coupling.b.len(),
            )?;
        }
        self.wells.push(well);
        self.device = None;
        Ok(())
    }

    /// Wells in insertion order
    pub fn wells(&self) -> &[StandardWell] {
        &self.wells
    }

    /// Sum of completion blocks in solver order
    fn completion_matrix(&self, to_order: &dyn Fn(usize) -> usize) -> Result<BlockedMatrix> {
        let bb = self.block_size * self.block_size;
        let blocks = self.wells.iter().flat_map(|well| {
            well.cells.iter().enumerate().map(move |(k, &cell)| {
                let row = to_order(cell);
                (row, row, well.blocks[k * bb..(k + 1) * bb].to_vec())
            })
        });
        BlockedMatrix::from_blocks(self.nb, self.block_size, blocks)
    }

    /// Scalar `B`, `D^-1` and `C^T` operators in solver order, or `None`
    /// without coupled wells
    fn coupling_operators(
        &self,
        to_order: &dyn Fn(usize) -> usize,
    ) -> Result<Option<(CsrMatrix, CsrMatrix, CsrMatrix)>> {
        let bs = self.block_size;
        let n = self.nb * bs;
        let total: usize = self
            .wells
            .iter()
            .filter_map(|w| w.coupling.as_ref())
            .map(|c| c.num_equations)
            .sum();
        if total == 0 {
            return Ok(None);
        }

        let mut b_rows: Vec<Vec<(usize, f64)>> = Vec::with_capacity(total);
        let mut d_rows: Vec<Vec<(usize, f64)>> = Vec::with_capacity(total);
        let mut ct_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut offset = 0;

        for well in &self.wells {
            let Some(coupling) = &well.coupling else {
                continue;
            };
            let m = coupling.num_equations;
            let width = well.cells.len() * bs;
            for eq in 0..m {
                let mut row = Vec::with_capacity(width);
                for (k, &cell) in well.cells.iter().enumerate() {
                    let base = to_order(cell) * bs;
                    for q in 0..bs {
                        let col = base + q;
                        let local = eq * width + k * bs + q;
                        row.push((col, coupling.b[local]));
                        ct_rows[col].push((offset + eq, coupling.c[local]));
                    }
                }
                b_rows.push(row);
                d_rows.push(
                    (0..m)
                        .map(|j| (offset + j, coupling.d_inv[eq * m + j]))
                        .collect(),
                );
            }
            offset += m;
        }

        Ok(Some((
            CsrMatrix::from_rows(total, n, b_rows)?,
            CsrMatrix::from_rows(total, total, d_rows)?,
            CsrMatrix::from_rows(n, total, ct_rows)?,
        )))
    }
}

impl<R: Runtime> WellContributions<R> for StandardWellContributions<R> {
    fn num_wells(&self) -> usize {
        self.wells.len()
    }

    fn set_reordering(
        &mut self,
        client: &R::Client,
        permutation: Option<&Permutation>,
    ) -> Result<()> {
        if let Some(perm) = permutation {
            Error::check_len("well permutation", self.nb, perm.len())?;
        }
        let to_order = |cell: usize| permutation.map_or(cell, |p| p.to_order()[cell]);

        let completions = self.completion_matrix(&to_order)?;
        let coupling = match self.coupling_operators(&to_order)? {
            Some((b, d_inv, c_t)) => Some(CouplingOps {
                bx: client.alloc_vector(b.nrows(), "well_bx")?,
                dbx: client.alloc_vector(b.nrows(), "well_dbx")?,
                b: DeviceBlockMatrix::upload_csr(client, &b, "well_b")?,
                d_inv: DeviceBlockMatrix::upload_csr(client, &d_inv, "well_d_inv")?,
                c_t: DeviceBlockMatrix::upload_csr(client, &c_t, "well_c_t")?,
            }),
            None => None,
        };

        log::debug!(
            "uploaded {} wells ({} completion blocks, coupling: {})",
            self.wells.len(),
            completions.nnzb(),
            coupling.is_some()
        );

        self.device = Some(DeviceWells {
            completions: DeviceBlockMatrix::upload(client, &completions, "well_completions")?,
            coupling,
            tmp: client.alloc_vector(self.nb * self.block_size, "well_tmp")?,
        });
        Ok(())
    }

    fn apply(&mut self, client: &R::Client, x: &R::Vector, y: &mut R::Vector) -> Result<()> {
        let device = self.device.as_mut().ok_or_else(|| Error::InvalidState {
            operation: "wells apply",
            state: "reordering not set".to_string(),
        })?;

        client.spmv(&device.completions, x, &mut device.tmp)?;
        client.axpy(&device.tmp, 1.0, y)?;

        if let Some(c) = device.coupling.as_mut() {
            client.spmv(&c.b, x, &mut c.bx)?;
            client.spmv(&c.d_inv, &c.bx, &mut c.dbx)?;
            client.spmv(&c.c_t, &c.dbx, &mut device.tmp)?;
            client.axpy(&device.tmp, -1.0, y)?;
        }
        Ok(())
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

    #[test]
    fn test_completion_block_added() {
        let client = client();
        let mut wells = StandardWellContributions::<CpuRuntime>::new(3, 2);
        wells
            .add_well(StandardWell::new(2, vec![1], vec![1.0, 2.0, 0.0, 3.0]).unwrap())
            .unwrap();
        WellContributions::<CpuRuntime>::set_reordering(&mut wells, &client, None).unwrap();

        let x = vec![1.0, 1.0, 1.0, 2.0, 1.0, 1.0];
        let mut y = vec![10.0; 6];
        wells.apply(&client, &x, &mut y).unwrap();
        assert_eq!(y, vec![10.0, 10.0, 15.0, 16.0, 10.0, 10.0]);
    }

    #[test]
    fn test_reordering_moves_cells() {
        let client = client();
        let mut wells = StandardWellContributions::<CpuRuntime>::new(3, 1);
        wells
            .add_well(StandardWell::new(1, vec![0], vec![5.0]).unwrap())
            .unwrap();
        // natural cell 0 sits at solver row 2
        let perm = Permutation::from_to_order(vec![2, 0, 1]).unwrap();
        wells.set_reordering(&client, Some(&perm)).unwrap();

        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0; 3];
        wells.apply(&client, &x, &mut y).unwrap();
        assert_eq!(y, vec![0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_coupling_subtracts_schur_term() {
        let client = client();
        let coupling = WellCoupling {
            num_equations: 1,
            b: vec![1.0, 2.0],
            c: vec![3.0, 4.0],
            d_inv: vec![0.5],
        };
        let well = StandardWell::new(1, vec![0, 2], vec![0.0, 0.0])
            .unwrap()
            .with_coupling(1, coupling)
            .unwrap();
        let mut wells = StandardWellContributions::<CpuRuntime>::new(3, 1);
        wells.add_well(well).unwrap();
        wells.set_reordering(&client, None).unwrap();

        // B x = 1*1 + 2*2 = 5, D^-1 B x = 2.5, C^T (2.5) = [7.5, 0, 10]
        let x = vec![1.0, 7.0, 2.0];
        let mut y = vec![0.0; 3];
        wells.apply(&client, &x, &mut y).unwrap();
        assert_eq!(y, vec![-7.5, 0.0, -10.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(StandardWell::new(2, vec![0, 0], vec![0.0; 8]).is_err());
        assert!(StandardWell::new(2, vec![0], vec![0.0; 3]).is_err());
        let mut wells = StandardWellContributions::<CpuRuntime>::new(2, 1);
        assert!(wells.add_well(StandardWell::new(1, vec![5], vec![1.0]).unwrap()).is_err());
    }

    #[test]
    fn test_apply_before_reordering() {
        let client = client();
        let mut wells = StandardWellContributions::<CpuRuntime>::new(2, 1);
        let mut y = vec![0.0; 2];
        assert!(matches!(
            wells.apply(&client, &vec![0.0; 2], &mut y),
            Err(Error::InvalidState { .. })
        ));
    }
}
