//! WebGPU device implementation.
//!
//! Platforms are the wgpu backends present on the machine (Vulkan, Metal,
//! DX12, GL) and devices are the adapters of one backend, both in a fixed
//! enumeration order.
//!
//! # Thread Safety
//!
//! `WgpuDevice` is `Clone` and `Send + Sync`. The adapter info is cached on
//! selection.

use std::fmt;
use std::sync::Arc;
use wgpu::{Adapter, Backend, Limits};

use crate::error::{Error, Result};

/// Backends in platform order
const PLATFORM_ORDER: [Backend; 5] = [
    Backend::Vulkan,
    Backend::Metal,
    Backend::Dx12,
    Backend::Gl,
    Backend::BrowserWebGpu,
];

/// Cached adapter information for a WebGPU device.
#[derive(Clone, Debug)]
pub(crate) struct AdapterInfo {
    /// Adapter name (e.g., "NVIDIA GeForce RTX 4090")
    pub(crate) name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.)
    pub(crate) backend: Backend,
    /// Device limits
    pub(crate) limits: Limits,
}

/// WebGPU device identifier.
///
/// # Example
///
/// ```ignore
/// let device = WgpuRuntime::select_device(0, 0)?;  // first GPU of the first backend
/// println!("Device: {}", device.adapter_name());
/// ```
#[derive(Clone)]
pub struct WgpuDevice {
    /// Platform (backend) index
    pub(crate) platform: usize,
    /// Adapter index within the platform
    pub(crate) index: usize,
    info: Arc<AdapterInfo>,
}

impl WgpuDevice {
    /// Platform (backend) index
    pub fn platform(&self) -> usize {
        self.platform
    }

    /// Adapter index within the platform
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the adapter name.
    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    /// Get the backend type (Vulkan, Metal, DX12, etc.).
    pub fn backend(&self) -> Backend {
        self.info.backend
    }

    /// Get device limits.
    pub fn limits(&self) -> &Limits {
        &self.info.limits
    }

    /// Get maximum storage buffer binding size.
    pub fn max_storage_buffer_size(&self) -> u64 {
        u64::from(self.info.limits.max_storage_buffer_binding_size)
            .min(self.info.limits.max_buffer_size)
    }
}

impl super::super::Device for WgpuDevice {
    fn id(&self) -> usize {
        (self.platform << 16) | self.index
    }

    fn name(&self) -> String {
        format!("wgpu:{}:{} ({})", self.platform, self.index, self.info.name)
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("platform", &self.platform)
            .field("index", &self.index)
            .field("adapter", &self.info.name)
            .field("backend", &self.info.backend)
            .finish()
    }
}

// ============================================================================
// Adapter Discovery
// ============================================================================

/// Adapters grouped by backend, in platform order. Backends without adapters
/// are left out.
async fn enumerate_platforms() -> Vec<Vec<Adapter>> {
    let instance = wgpu::Instance::default();
    let adapters: Vec<Adapter> = instance.enumerate_adapters(wgpu::Backends::all()).await;

    let mut platforms: Vec<Vec<Adapter>> = PLATFORM_ORDER.iter().map(|_| Vec::new()).collect();
    for adapter in adapters {
        let backend = adapter.get_info().backend;
        if let Some(slot) = PLATFORM_ORDER.iter().position(|&b| b == backend) {
            platforms[slot].push(adapter);
        }
    }
    platforms.retain(|p| !p.is_empty());
    platforms
}

/// Select an adapter by platform and device index.
///
/// Out-of-range indices are errors, never replaced by a default adapter.
pub(crate) async fn select_adapter(
    platform: usize,
    index: usize,
) -> Result<(Adapter, WgpuDevice)> {
    let mut platforms = enumerate_platforms().await;
    if platforms.is_empty() {
        return Err(Error::NoPlatforms { runtime: "wgpu" });
    }
    let available = platforms.len();
    let adapters = platforms.get_mut(platform).ok_or(Error::InvalidPlatform {
        index: platform,
        available,
    })?;
    if index >= adapters.len() {
        return Err(Error::InvalidDevice {
            platform,
            index,
            available: adapters.len(),
        });
    }
    let adapter = adapters.swap_remove(index);

    let wgpu_info = adapter.get_info();
    let info = Arc::new(AdapterInfo {
        name: wgpu_info.name,
        backend: wgpu_info.backend,
        limits: adapter.limits(),
    });
    log::debug!(
        "selected wgpu adapter {} ({:?}) as platform {platform} device {index}",
        info.name,
        info.backend
    );

    Ok((
        adapter,
        WgpuDevice {
            platform,
            index,
            info,
        },
    ))
}

/// Blocking form of [`select_adapter`].
pub(crate) fn select_adapter_blocking(
    platform: usize,
    index: usize,
) -> Result<(Adapter, WgpuDevice)> {
    pollster::block_on(select_adapter(platform, index))
}

/// Number of adapters per platform, in platform order
pub fn platform_device_counts() -> Vec<usize> {
    pollster::block_on(enumerate_platforms())
        .iter()
        .map(Vec::len)
        .collect()
}

/// True when at least one WebGPU adapter is present
pub fn is_wgpu_available() -> bool {
    !platform_device_counts().is_empty()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Device;

    #[test]
    fn test_select_out_of_range() {
        let counts = platform_device_counts();
        match select_adapter_blocking(counts.len(), 0) {
            Err(Error::InvalidPlatform { available, .. }) => assert_eq!(available, counts.len()),
            Err(Error::NoPlatforms { .. }) => assert!(counts.is_empty()),
            other => panic!("unexpected result: {:?}", other.map(|(_, d)| d)),
        }
        if let Some(&n) = counts.first() {
            assert!(matches!(
                select_adapter_blocking(0, n),
                Err(Error::InvalidDevice { .. })
            ));
        }
    }

    #[test]
    fn test_device_info() {
        match select_adapter_blocking(0, 0) {
            Ok((_, device)) => {
                assert!(device.name().starts_with("wgpu:0:0"));
                assert!(device.max_storage_buffer_size() > 0);
            }
            Err(e) => println!("No GPU available, skipping test: {}", e),
        }
    }
}
