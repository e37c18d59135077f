//! Host-side setup algorithms
//!
//! Everything that inspects the sparsity pattern or the matrix values before
//! the iteration starts lives here. Results are uploaded once and reused by
//! the device kernels for every application.
//!
//! ```text
//! BlockedMatrix ──► reorder ──► Reordering (permutation + level pointers)
//!        │
//!        └────────► precond ──► analyze (pattern) ──► build (values)
//! ```
//!
//! - [`reorder`] - level scheduling and graph coloring of the block pattern
//! - [`precond`] - BILU0, BISAI and CPR (quasi-IMPES with AMG)

pub mod precond;
pub mod reorder;
