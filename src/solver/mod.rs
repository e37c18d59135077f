//! Block BiCGSTAB solver
//!
//! [`BlockSolver`] owns the device client, the preconditioner and the
//! reordered system. A solve goes through
//!
//! ```text
//! initialize -> analyze_matrix -> update_system -> create_preconditioner
//!            -> copy_system_to_device -> solve -> get_result
//! ```
//!
//! and later solves with the same pattern repeat only `update_system`,
//! `create_preconditioner`, `update_system_on_device` and `solve`.
//! [`BlockSolver::solve_system`] picks the right sequence.

mod bicgstab;
mod block_solver;
mod config;
mod result;

pub use block_solver::BlockSolver;
pub use config::SolverConfig;
pub use result::{SolveOutcome, SolverResult, SolverState};
