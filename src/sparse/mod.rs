//! Sparse matrix containers
//!
//! - [`BlockedMatrix`]: host block CSR with `block_size` in 1..=6, the input
//!   format of the solver
//! - [`CsrMatrix`]: host scalar CSR for rectangular transfer operators
//! - [`DeviceBlockMatrix`]: the device mirror of either, consumed by the
//!   `spmv` and triangular sweep kernels
//! - [`Permutation`]: the symmetric block-row reordering

pub mod block;
mod blocked;
mod csr;
mod device;
mod permutation;

pub use blocked::BlockedMatrix;
pub use csr::CsrMatrix;
pub use device::{DeviceBlockMatrix, DeviceLevels, TriangularSweep};
pub use permutation::Permutation;
