//! WebGPU runtime implementation

use super::cache::get_or_create_client;
use super::client::WgpuClient;
use super::device::{WgpuDevice, select_adapter_blocking};
use crate::error::Result;
use crate::runtime::{Runtime, VectorStorage};
use std::sync::Arc;
use wgpu::Buffer;

/// WebGPU Runtime adapter
///
/// Implements the generic Runtime trait for the WebGPU backend. Vectors are
/// `f32` on the device, so results agree with [`CpuRuntime`] to single
/// precision only.
///
/// [`CpuRuntime`]: crate::runtime::cpu::CpuRuntime
#[derive(Clone, Debug, Default)]
pub struct WgpuRuntime;

/// Device vector: an `f32` storage buffer plus its logical length
pub struct WgpuVector {
    pub(crate) buffer: Arc<Buffer>,
    pub(crate) len: usize,
}

impl std::fmt::Debug for WgpuVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuVector").field("len", &self.len).finish()
    }
}

impl VectorStorage for WgpuVector {
    fn len(&self) -> usize {
        self.len
    }
}

/// Device array of `u32` indices
pub struct WgpuIndices {
    pub(crate) buffer: Arc<Buffer>,
}

impl Runtime for WgpuRuntime {
    type Device = WgpuDevice;
    type Client = WgpuClient;
    type Vector = WgpuVector;
    type Indices = WgpuIndices;

    fn name() -> &'static str {
        "wgpu"
    }

    fn select_device(platform_id: usize, device_id: usize) -> Result<Self::Device> {
        select_adapter_blocking(platform_id, device_id).map(|(_, device)| device)
    }

    fn create_client(device: &Self::Device) -> Result<Self::Client> {
        get_or_create_client(device)
    }
}
