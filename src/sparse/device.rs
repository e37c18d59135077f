//! Device-resident mirrors of the host sparse containers

use super::blocked::BlockedMatrix;
use super::csr::CsrMatrix;
use crate::algorithm::reorder::LevelSchedule;
use crate::error::{Error, Result};
use crate::runtime::{Runtime, RuntimeClient, to_u32_indices};

/// Block CSR matrix living on a runtime's device.
///
/// Square block matrices and rectangular scalar operators (`block_size` 1)
/// share this type, so every product goes through the same `spmv` kernel.
pub struct DeviceBlockMatrix<R: Runtime> {
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) block_size: usize,
    pub(crate) nnzb: usize,
    pub(crate) row_ptrs: R::Indices,
    pub(crate) col_indices: R::Indices,
    pub(crate) values: R::Vector,
}

impl<R: Runtime> std::fmt::Debug for DeviceBlockMatrix<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBlockMatrix")
            .field("runtime", &R::name())
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .field("block_size", &self.block_size)
            .field("nnzb", &self.nnzb)
            .finish()
    }
}

impl<R: Runtime> DeviceBlockMatrix<R> {
    /// Upload a square block matrix
    pub fn upload(client: &R::Client, matrix: &BlockedMatrix, label: &'static str) -> Result<Self> {
        Self::from_parts(
            client,
            matrix.nb(),
            matrix.nb(),
            matrix.block_size(),
            matrix.row_pointers(),
            matrix.col_indices(),
            matrix.values(),
            label,
        )
    }

    /// Upload a scalar CSR operator as a `block_size = 1` matrix
    pub fn upload_csr(client: &R::Client, matrix: &CsrMatrix, label: &'static str) -> Result<Self> {
        Self::from_parts(
            client,
            matrix.nrows(),
            matrix.ncols(),
            1,
            matrix.row_ptrs(),
            matrix.col_indices(),
            matrix.values(),
            label,
        )
    }

    /// Upload raw block CSR arrays
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        client: &R::Client,
        nrows: usize,
        ncols: usize,
        block_size: usize,
        row_ptrs: &[usize],
        col_indices: &[usize],
        values: &[f64],
        label: &'static str,
    ) -> Result<Self> {
        Error::check_len("device row_ptrs", nrows + 1, row_ptrs.len())?;
        let nnzb = col_indices.len();
        Error::check_len("device values", nnzb * block_size * block_size, values.len())?;

        let rp = to_u32_indices("row_ptrs", row_ptrs)?;
        let ci = to_u32_indices("col_indices", col_indices)?;
        Ok(Self {
            nrows,
            ncols,
            block_size,
            nnzb,
            row_ptrs: client.upload_indices(&rp, label)?,
            col_indices: client.upload_indices(&ci, label)?,
            values: client.upload_vector(values, label)?,
        })
    }

    /// Overwrite the values, keeping the uploaded pattern
    pub fn update_values(&mut self, client: &R::Client, values: &[f64]) -> Result<()> {
        Error::check_len(
            "device values",
            self.nnzb * self.block_size * self.block_size,
            values.len(),
        )?;
        client.write_vector(&mut self.values, values)
    }

    /// Block rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Block columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Block edge length
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Stored blocks
    pub fn nnzb(&self) -> usize {
        self.nnzb
    }

    /// Length of the input vector of a product
    pub fn input_len(&self) -> usize {
        self.ncols * self.block_size
    }

    /// Length of the output vector of a product
    pub fn output_len(&self) -> usize {
        self.nrows * self.block_size
    }
}

/// Flattened level schedule on the device
pub struct DeviceLevels<R: Runtime> {
    pub(crate) rows: R::Indices,
    pub(crate) level_ptrs: Vec<usize>,
}

impl<R: Runtime> DeviceLevels<R> {
    /// Upload a schedule
    pub fn upload(client: &R::Client, schedule: &LevelSchedule, label: &'static str) -> Result<Self> {
        let (level_ptrs, rows) = crate::algorithm::reorder::flatten_levels(schedule);
        let rows = to_u32_indices("level rows", &rows)?;
        Ok(Self {
            rows: client.upload_indices(&rows, label)?,
            level_ptrs,
        })
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.level_ptrs.len().saturating_sub(1)
    }

    /// Rows in one level
    pub fn level_len(&self, level: usize) -> usize {
        self.level_ptrs[level + 1] - self.level_ptrs[level]
    }
}

/// Everything a level-scheduled sweep over an ILU(0) factor needs besides
/// the factor values: diagonal positions plus both schedules.
pub struct TriangularSweep<R: Runtime> {
    pub(crate) diag_ptrs: R::Indices,
    pub(crate) lower: DeviceLevels<R>,
    pub(crate) upper: DeviceLevels<R>,
}

impl<R: Runtime> TriangularSweep<R> {
    /// Upload diagonal positions and the two schedules
    pub fn upload(
        client: &R::Client,
        diag_ptrs: &[usize],
        lower: &LevelSchedule,
        upper: &LevelSchedule,
    ) -> Result<Self> {
        let diag = to_u32_indices("diag_ptrs", diag_ptrs)?;
        Ok(Self {
            diag_ptrs: client.upload_indices(&diag, "ilu_diag")?,
            lower: DeviceLevels::upload(client, lower, "ilu_lower_levels")?,
            upper: DeviceLevels::upload(client, upper, "ilu_upper_levels")?,
        })
    }

    /// Forward sweep levels
    pub fn lower(&self) -> &DeviceLevels<R> {
        &self.lower
    }

    /// Backward sweep levels
    pub fn upper(&self) -> &DeviceLevels<R> {
        &self.upper
    }
}
