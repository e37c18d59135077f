//! Preconditioners for the block BiCGSTAB solver
//!
//! Every preconditioner has three phases:
//!
//! 1. `analyze`: structural work on the (reordered) block pattern, once per
//!    pattern
//! 2. `build`: numeric setup from the current values, once per value update
//! 3. `apply`: `output = M^-1 input`, a linear operator, many times per solve
//!
//! Setup runs on the host in f64; `apply` runs through the runtime's
//! [`KernelOps`](crate::runtime::KernelOps), so the per-iteration work stays
//! on the device.

mod amg;
mod amg_coarsen;
mod bilu0;
mod bisai;
mod cpr;

pub use amg::{AmgHierarchy, AmgOptions};
pub use amg_coarsen::{
    CfSplitting, build_interpolation, galerkin_coarse_operator, pmis_coarsening,
    strength_of_connection,
};
pub use bilu0::{Bilu0, IluOptions};
pub use bisai::{Bisai, IsaiOptions};
pub use cpr::{Cpr, CprOptions};

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sparse::{BlockedMatrix, DeviceBlockMatrix};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Available preconditioners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreconditionerKind {
    /// Block ILU(0) with level-scheduled sweeps
    #[default]
    Ilu0,
    /// Block incomplete sparse approximate inverse
    Isai,
    /// Two-stage CPR with quasi-IMPES pressure weights
    CprQuasiImpes,
}

impl FromStr for PreconditionerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ilu0" => Ok(Self::Ilu0),
            "isai" => Ok(Self::Isai),
            "cpr" | "cpr_quasiimpes" => Ok(Self::CprQuasiImpes),
            "cpr_trueimpes" => Err(Error::unsupported(
                "preconditioner",
                s,
                "true-IMPES weights are not implemented, use cpr_quasiimpes",
            )),
            other => Err(Error::unsupported(
                "preconditioner",
                other,
                "expected one of ilu0, isai, cpr_quasiimpes",
            )),
        }
    }
}

impl fmt::Display for PreconditionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ilu0 => "ilu0",
            Self::Isai => "isai",
            Self::CprQuasiImpes => "cpr_quasiimpes",
        })
    }
}

/// Options of every preconditioner, grouped for the factory
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreconditionerOptions {
    /// Block ILU(0)
    pub ilu: IluOptions,
    /// Block ISAI
    pub isai: IsaiOptions,
    /// CPR outer stage
    pub cpr: CprOptions,
    /// AMG pressure stage of CPR
    pub amg: AmgOptions,
}

/// A preconditioner `M ≈ A` applied as `M^-1`
pub trait Preconditioner<R: Runtime>: Send {
    /// Which preconditioner this is
    fn kind(&self) -> PreconditionerKind;

    /// Structural analysis of a block pattern (solver order).
    ///
    /// Must run before the first [`Preconditioner::build`]; running it again
    /// discards any numeric setup.
    fn analyze(&mut self, client: &R::Client, pattern: &BlockedMatrix) -> Result<()>;

    /// (forward, backward) level counts of the triangular sweeps set up by
    /// the last analysis, `None` before analysis or without level-scheduled
    /// sweeps
    fn sweep_levels(&self) -> Option<(usize, usize)> {
        None
    }

    /// Numeric setup from the current values.
    ///
    /// `matrix` and `device_matrix` hold the same values in solver order.
    fn build(
        &mut self,
        client: &R::Client,
        matrix: &BlockedMatrix,
        device_matrix: &DeviceBlockMatrix<R>,
    ) -> Result<()>;

    /// `output = M^-1 input`. Only the preconditioner's own work buffers are
    /// written besides `output`.
    fn apply(
        &mut self,
        client: &R::Client,
        a: &DeviceBlockMatrix<R>,
        input: &R::Vector,
        output: &mut R::Vector,
    ) -> Result<()>;
}

/// Construct the preconditioner selected by `kind`
pub fn create_preconditioner<R: Runtime>(
    kind: PreconditionerKind,
    options: &PreconditionerOptions,
) -> Box<dyn Preconditioner<R>> {
    match kind {
        PreconditionerKind::Ilu0 => Box::new(Bilu0::<R>::new(options.ilu.clone())),
        PreconditionerKind::Isai => {
            Box::new(Bisai::<R>::new(options.ilu.clone(), options.isai.clone()))
        }
        PreconditionerKind::CprQuasiImpes => Box::new(Cpr::<R>::new(
            options.cpr.clone(),
            options.amg.clone(),
            options.ilu.clone(),
        )),
    }
}

pub(crate) fn not_analyzed(operation: &'static str) -> Error {
    Error::InvalidState {
        operation,
        state: "pattern not analyzed".to_string(),
    }
}

pub(crate) fn not_built(operation: &'static str) -> Error {
    Error::InvalidState {
        operation,
        state: "preconditioner not built".to_string(),
    }
}
