//! Runtime backends for the solver kernels
//!
//! This module defines the `Runtime` trait family and provides
//! implementations for the host CPU and for WebGPU devices.
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity)
//! ├── Device (identifies a specific GPU/CPU)
//! ├── Client (owns the queue, allocates buffers)
//! │   ├── RuntimeClient (buffer primitives)
//! │   └── KernelOps (dot, norm, axpy, recombine, spmv, trsv level)
//! ├── Vector (device vector of reals)
//! └── Indices (device array of u32)
//! ```

mod traits;

pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod wgpu;

pub use traits::{Device, KernelOps, Runtime, RuntimeClient, VectorStorage};

/// Convert host indices to the `u32` form used on devices
pub(crate) fn to_u32_indices(what: &'static str, data: &[usize]) -> crate::error::Result<Vec<u32>> {
    data.iter()
        .map(|&v| {
            u32::try_from(v).map_err(|_| {
                crate::error::Error::invalid_dimension(what, format!("index {v} exceeds u32 range"))
            })
        })
        .collect()
}
