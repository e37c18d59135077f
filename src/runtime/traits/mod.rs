//! Runtime traits for compute backend abstraction

pub mod client;
pub mod device;
pub mod kernels;
pub mod runtime;

pub use client::{RuntimeClient, VectorStorage};
pub use device::Device;
pub use kernels::KernelOps;
pub use runtime::Runtime;
