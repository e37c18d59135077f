//! Core trait for compute backends

use crate::error::Result;

/// Core trait for compute backends
///
/// `Runtime` abstracts over the place where the solver's vectors live and
/// where its kernels run. It uses static dispatch via generics, so the
/// BiCGSTAB loop is monomorphized per backend.
///
/// # Associated Types
///
/// - `Device`: Identifies a specific compute unit (the host CPU, GPU 0, ...)
/// - `Client`: Owns the queue, allocates buffers and dispatches kernels
/// - `Vector`: Device-resident vector of real values
/// - `Indices`: Device-resident array of `u32` indices
///
/// # Example
///
/// ```ignore
/// let device = CpuRuntime::select_device(0, 0)?;
/// let client = CpuRuntime::create_client(&device)?;
/// let x = client.upload_vector(&[1.0, 2.0, 3.0], "x")?;
/// assert_eq!(client.norm(&x)?, 14f64.sqrt());
/// ```
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: super::Device;

    /// Client for dispatching operations
    type Client: super::RuntimeClient<Self> + super::KernelOps<Self>;

    /// Device vector of real values
    type Vector: super::VectorStorage;

    /// Device array of `u32` indices
    type Indices: Send + Sync;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Select the device `device_id` on platform `platform_id`.
    ///
    /// Out-of-range indices are configuration errors, never silently
    /// replaced by a default device.
    fn select_device(platform_id: usize, device_id: usize) -> Result<Self::Device>;

    /// Create a client (queue plus kernel cache) for a device
    fn create_client(device: &Self::Device) -> Result<Self::Client>;
}
