//! WebGPU Client implementation.
//!
//! `WgpuClient` owns the WebGPU device and queue for operation dispatch.
//! Vectors are stored as `f32`; values cross the host boundary as `f64` and
//! are converted on upload and download.
//!
//! # Thread Safety
//!
//! `WgpuClient` is `Clone` and the underlying wgpu::Device and wgpu::Queue
//! are already `Send + Sync` by design. The reduction scratch buffers are
//! shared between clones behind a mutex.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

use super::WgpuRuntime;
use super::device::{WgpuDevice, select_adapter_blocking};
use super::runtime::{WgpuIndices, WgpuVector};
use super::shaders::{MAX_REDUCE_GROUPS, PipelineCache};
use crate::error::{Error, Result};
use crate::runtime::RuntimeClient;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Upper bound on a blocking wait for the queue
const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffers reused by every dot product
pub(crate) struct ReductionScratch {
    /// One partial sum per workgroup; the result lands in element 0
    pub(crate) partials: Buffer,
    /// Host-readable copy of the result
    pub(crate) staging: Buffer,
}

// ============================================================================
// WgpuClient
// ============================================================================

/// WebGPU Runtime Client.
///
/// Owns WebGPU device and queue for operation dispatch. All kernels are
/// submitted through this client's queue, in order.
#[derive(Clone)]
pub struct WgpuClient {
    /// GPU device identifier
    pub(crate) device_id: WgpuDevice,

    /// WebGPU device handle
    pub(crate) wgpu_device: Arc<Device>,

    /// WebGPU queue for command submission
    pub(crate) queue: Arc<Queue>,

    /// Pipeline cache for compute shaders
    pub(crate) pipeline_cache: Arc<PipelineCache>,

    /// Dot product scratch
    pub(crate) reduction: Arc<Mutex<ReductionScratch>>,
}

impl std::fmt::Debug for WgpuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuClient")
            .field("device", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl WgpuClient {
    /// Create a new WebGPU client for a device, bypassing the client cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is gone or device creation fails.
    pub(crate) fn new_uncached(device: &WgpuDevice) -> Result<Self> {
        let (adapter, device_id) = select_adapter_blocking(device.platform, device.index)?;

        let (wgpu_device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("blocksolve WebGPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            },
        ))
        .map_err(|e| Error::device("request_device", e.to_string()))?;

        let wgpu_device = Arc::new(wgpu_device);
        let queue = Arc::new(queue);
        let pipeline_cache = Arc::new(PipelineCache::new(wgpu_device.clone(), queue.clone()));

        let reduction = ReductionScratch {
            partials: wgpu_device.create_buffer(&BufferDescriptor {
                label: Some("dot_partials"),
                size: u64::from(MAX_REDUCE_GROUPS) * F32_BYTES,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            staging: wgpu_device.create_buffer(&BufferDescriptor {
                label: Some("dot_staging"),
                size: F32_BYTES,
                usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        };

        log::info!("created wgpu client on {}", device_id.adapter_name());

        Ok(Self {
            device_id,
            wgpu_device,
            queue,
            pipeline_cache,
            reduction: Arc::new(Mutex::new(reduction)),
        })
    }

    /// Get reference to the WebGPU device.
    #[inline]
    pub fn wgpu_device(&self) -> &Device {
        &self.wgpu_device
    }

    /// Get reference to the WebGPU queue.
    #[inline]
    pub fn wgpu_queue(&self) -> &Queue {
        &self.queue
    }

    /// Get reference to the pipeline cache.
    #[inline]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Bytes for `len` f32 elements, checked against the device limits.
    ///
    /// Zero-length vectors still get one element, wgpu rejects empty
    /// bindings.
    fn checked_size(&self, len: usize, label: &'static str) -> Result<u64> {
        let bytes = (len.max(1) as u64).saturating_mul(F32_BYTES);
        let limit = self.device_id.max_storage_buffer_size();
        if bytes > limit {
            return Err(Error::DeviceAllocation {
                label,
                bytes,
                reason: format!("exceeds the device storage buffer limit of {limit} bytes"),
            });
        }
        Ok(bytes)
    }

    /// Create a storage buffer for vector data.
    fn create_storage_buffer(&self, label: &'static str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Create a staging buffer for CPU readback.
    fn create_staging_buffer(&self, label: &'static str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Copy `bytes` from a storage buffer into `staging`, wait, and map it.
    pub(crate) fn read_back(
        &self,
        src: &Buffer,
        staging: &Buffer,
        bytes: u64,
        output: &mut [f32],
    ) -> Result<()> {
        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_back"),
            });
        encoder.copy_buffer_to_buffer(src, 0, staging, 0, bytes);
        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..bytes);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(POLL_TIMEOUT),
            })
            .map_err(|e| Error::device("read back", format!("GPU poll failed: {e}")))?;

        let map_result = receiver.recv().map_err(|_| {
            Error::device("read back", "map_async callback was not invoked")
        })?;
        map_result.map_err(|e| Error::device("read back", format!("map_async failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            let src: &[f32] = bytemuck::cast_slice(&data);
            output.copy_from_slice(&src[..output.len()]);
        }

        staging.unmap();
        Ok(())
    }
}

fn to_f32(data: &[f64]) -> Vec<f32> {
    data.iter().map(|&v| v as f32).collect()
}

impl RuntimeClient<WgpuRuntime> for WgpuClient {
    fn device(&self) -> &WgpuDevice {
        &self.device_id
    }

    fn synchronize(&self) -> Result<()> {
        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(POLL_TIMEOUT),
            })
            .map(|_| ())
            .map_err(|e| Error::device("synchronize", e.to_string()))
    }

    fn alloc_vector(&self, len: usize, label: &'static str) -> Result<WgpuVector> {
        let size = self.checked_size(len, label)?;
        // new buffers are zero-initialized by wgpu
        let buffer = self.create_storage_buffer(label, size);
        Ok(WgpuVector {
            buffer: Arc::new(buffer),
            len,
        })
    }

    fn upload_vector(&self, data: &[f64], label: &'static str) -> Result<WgpuVector> {
        self.checked_size(data.len(), label)?;
        let mut host = to_f32(data);
        if host.is_empty() {
            host.push(0.0);
        }
        let buffer = self
            .wgpu_device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&host),
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            });
        Ok(WgpuVector {
            buffer: Arc::new(buffer),
            len: data.len(),
        })
    }

    fn write_vector(&self, dst: &mut WgpuVector, data: &[f64]) -> Result<()> {
        Error::check_len("vector write", dst.len, data.len())?;
        if !data.is_empty() {
            self.queue
                .write_buffer(&dst.buffer, 0, bytemuck::cast_slice(&to_f32(data)));
        }
        Ok(())
    }

    fn download_vector(&self, src: &WgpuVector, out: &mut [f64]) -> Result<()> {
        Error::check_len("vector download", src.len, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        let bytes = src.len as u64 * F32_BYTES;
        let staging = self.create_staging_buffer("download_staging", bytes);
        let mut host = vec![0.0f32; src.len];
        self.read_back(&src.buffer, &staging, bytes, &mut host)?;
        for (o, v) in out.iter_mut().zip(host) {
            *o = f64::from(v);
        }
        Ok(())
    }

    fn upload_indices(&self, data: &[u32], label: &'static str) -> Result<WgpuIndices> {
        self.checked_size(data.len(), label)?;
        let padded;
        let contents: &[u32] = if data.is_empty() {
            padded = [0u32];
            &padded
        } else {
            data
        };
        let buffer = self
            .wgpu_device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage: BufferUsages::STORAGE,
            });
        Ok(WgpuIndices {
            buffer: Arc::new(buffer),
        })
    }

    fn fill_zero(&self, v: &mut WgpuVector) -> Result<()> {
        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fill_zero"),
            });
        encoder.clear_buffer(&v.buffer, 0, None);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn copy(&self, src: &WgpuVector, dst: &mut WgpuVector) -> Result<()> {
        Error::check_len("vector copy", dst.len, src.len)?;
        if src.len == 0 {
            return Ok(());
        }
        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy"),
            });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, src.len as u64 * F32_BYTES);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn client() -> Option<WgpuClient> {
        match WgpuRuntime::select_device(0, 0).and_then(|d| WgpuRuntime::create_client(&d)) {
            Ok(client) => Some(client),
            Err(e) => {
                println!("No GPU available, skipping test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_vector_roundtrip() {
        let Some(client) = client() else { return };
        let data = vec![1.0, -2.5, 3.25, 4.0];
        let v = client.upload_vector(&data, "roundtrip").unwrap();
        let mut out = vec![0.0; 4];
        client.download_vector(&v, &mut out).unwrap();
        assert_eq!(data, out);
    }

    #[test]
    fn test_fill_zero_and_copy() {
        let Some(client) = client() else { return };
        let a = client.upload_vector(&[1.0, 2.0, 3.0], "a").unwrap();
        let mut b = client.alloc_vector(3, "b").unwrap();
        client.copy(&a, &mut b).unwrap();
        let mut out = vec![0.0; 3];
        client.download_vector(&b, &mut out).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0]);

        client.fill_zero(&mut b).unwrap();
        client.download_vector(&b, &mut out).unwrap();
        assert_eq!(out, vec![0.0; 3]);
    }

    #[test]
    fn test_length_mismatch() {
        let Some(client) = client() else { return };
        let mut v = client.alloc_vector(3, "v").unwrap();
        assert!(matches!(
            client.write_vector(&mut v, &[1.0, 2.0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
