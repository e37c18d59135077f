//! CPU client implementation

use super::device::CpuDevice;
use super::runtime::CpuRuntime;
use crate::error::{Error, Result};
use crate::runtime::RuntimeClient;

/// Vectors shorter than this are processed on the calling thread
const DEFAULT_PARALLEL_MIN_LEN: usize = 4096;

/// CPU client for operation dispatch
#[derive(Clone, Debug)]
pub struct CpuClient {
    pub(crate) device: CpuDevice,
    parallel_min_len: usize,
}

impl CpuClient {
    /// Create a new CPU client
    pub fn new(device: CpuDevice) -> Self {
        Self {
            device,
            parallel_min_len: DEFAULT_PARALLEL_MIN_LEN,
        }
    }

    /// Override the length below which kernels stay sequential
    pub fn with_parallel_min_len(mut self, min_len: usize) -> Self {
        self.parallel_min_len = min_len.max(1);
        self
    }

    /// Minimum work size handed to one rayon task
    pub(crate) fn parallel_min_len(&self) -> usize {
        self.parallel_min_len
    }
}

/// Empty vector with room for exactly `len` elements
fn reserve<T>(len: usize, label: &'static str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|e| Error::DeviceAllocation {
        label,
        bytes: (len as u64).saturating_mul(std::mem::size_of::<T>() as u64),
        reason: e.to_string(),
    })?;
    Ok(v)
}

impl RuntimeClient<CpuRuntime> for CpuClient {
    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn synchronize(&self) -> Result<()> {
        // CPU operations are synchronous, nothing to do
        Ok(())
    }

    fn alloc_vector(&self, len: usize, label: &'static str) -> Result<Vec<f64>> {
        let mut v = reserve(len, label)?;
        v.resize(len, 0.0);
        Ok(v)
    }

    fn upload_vector(&self, data: &[f64], label: &'static str) -> Result<Vec<f64>> {
        let mut v = reserve(data.len(), label)?;
        v.extend_from_slice(data);
        Ok(v)
    }

    fn write_vector(&self, dst: &mut Vec<f64>, data: &[f64]) -> Result<()> {
        Error::check_len("vector write", dst.len(), data.len())?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn download_vector(&self, src: &Vec<f64>, out: &mut [f64]) -> Result<()> {
        Error::check_len("vector download", src.len(), out.len())?;
        out.copy_from_slice(src);
        Ok(())
    }

    fn upload_indices(&self, data: &[u32], label: &'static str) -> Result<Vec<u32>> {
        let mut v = reserve(data.len(), label)?;
        v.extend_from_slice(data);
        Ok(v)
    }

    fn fill_zero(&self, v: &mut Vec<f64>) -> Result<()> {
        v.fill(0.0);
        Ok(())
    }

    fn copy(&self, src: &Vec<f64>, dst: &mut Vec<f64>) -> Result<()> {
        Error::check_len("vector copy", dst.len(), src.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
