//! CPU runtime implementation
//!
//! The CPU runtime keeps vectors as `Vec<f64>` on the heap and is the
//! reference implementation of every kernel. With the `rayon` feature the
//! vector kernels, the block SpMV and the triangular level sweeps run on the
//! rayon thread pool; reductions keep a fixed pairwise split so results do
//! not depend on the number of threads.

mod client;
mod device;
pub(crate) mod kernels;
mod runtime;

pub use client::CpuClient;
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
