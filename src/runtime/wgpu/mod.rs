//! WebGPU runtime implementation (requires `wgpu` feature)
//!
//! Runs the solver kernels as WGSL compute shaders on any adapter wgpu can
//! reach. Vectors are `f32` on the device.
//!
//! # Platform and device numbering
//!
//! Platform `p` is the `p`-th backend with at least one adapter, in the order
//! Vulkan, Metal, DX12, GL, WebGPU. Device `d` is the `d`-th adapter of that
//! backend.

mod cache;
mod client;
mod device;
mod kernels;
mod runtime;
mod shaders;

pub use client::WgpuClient;
pub use device::{WgpuDevice, is_wgpu_available, platform_device_counts};
pub use runtime::{WgpuIndices, WgpuRuntime, WgpuVector};
