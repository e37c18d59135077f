//! # blocksolve
//!
//! **Preconditioned block BiCGSTAB for reservoir-simulation linear systems,
//! on the host CPU or on a WebGPU device.**
//!
//! Fully implicit reservoir simulators produce block-sparse systems with one
//! small dense block (`1..=6` unknowns) per cell pair. blocksolve takes such a
//! system in block CSR form, optionally reorders it for parallel triangular
//! sweeps, builds a preconditioner and runs BiCGSTAB on the selected device,
//! adding well contributions after every matrix product.
//!
//! ## Features
//!
//! - **Block CSR**: [`sparse::BlockedMatrix`] with runtime block size
//! - **Reordering**: level scheduling or greedy graph coloring
//! - **Preconditioners**: block ILU(0), block ISAI, CPR with AMG pressure stage
//! - **Wells**: completion blocks and low-rank well coupling
//! - **Backends**: CPU (f64, optionally multi-threaded) and WebGPU (f32)
//!
//! ## Quick Start
//!
//! ```
//! use blocksolve::prelude::*;
//!
//! # fn main() -> blocksolve::error::Result<()> {
//! let a = BlockedMatrix::from_blocks(
//!     2,
//!     2,
//!     vec![
//!         (0, 0, vec![4.0, 1.0, 0.0, 3.0]),
//!         (0, 1, vec![-1.0, 0.0, 0.0, -1.0]),
//!         (1, 0, vec![-1.0, 0.0, 0.0, -1.0]),
//!         (1, 1, vec![4.0, 1.0, 0.0, 3.0]),
//!     ],
//! )?;
//! let rhs = [1.0, 2.0, 3.0, 4.0];
//!
//! let config = SolverConfig::from_toml_str(r#"
//!     preconditioner = "ilu0"
//!     tolerance = 1e-10
//! "#)?;
//! let mut solver = BlockSolver::<CpuRuntime>::new(config)?;
//! let result = solver.solve_system(&a, &rhs, &mut NoWells)?;
//! assert!(result.converged);
//!
//! let mut x = [0.0; 4];
//! solver.get_result(&mut x)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! The CPU backend is always built.
//!
//! - `rayon` (default): Multi-threaded CPU kernels and ISAI setup
//! - `wgpu`: Cross-platform GPU via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod algorithm;
pub mod error;
pub mod runtime;
pub mod solver;
pub mod sparse;
pub mod wells;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithm::precond::{Preconditioner, PreconditionerKind};
    pub use crate::error::{Error, Result};
    pub use crate::runtime::{Device, KernelOps, Runtime, RuntimeClient};
    pub use crate::solver::{BlockSolver, SolveOutcome, SolverConfig, SolverResult, SolverState};
    pub use crate::sparse::BlockedMatrix;
    pub use crate::wells::{NoWells, StandardWell, StandardWellContributions, WellContributions};

    pub use crate::runtime::cpu::CpuRuntime;

    #[cfg(feature = "wgpu")]
    pub use crate::runtime::wgpu::WgpuRuntime;
}
