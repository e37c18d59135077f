//! Trait for runtime clients that own device buffers

use super::Runtime;
use crate::error::Result;

/// Length query shared by every backend's vector type
pub trait VectorStorage: Send + Sync {
    /// Number of logical elements
    fn len(&self) -> usize;

    /// True when the vector holds no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for runtime clients that handle buffer management
///
/// Every operation is enqueued on the client's single in-order queue. Only
/// [`RuntimeClient::download_vector`] and [`RuntimeClient::synchronize`] block
/// the host.
pub trait RuntimeClient<R: Runtime>: Clone + Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// Synchronize: wait for all pending operations to complete
    fn synchronize(&self) -> Result<()>;

    /// Allocate a zero-filled vector of `len` elements
    fn alloc_vector(&self, len: usize, label: &'static str) -> Result<R::Vector>;

    /// Allocate a vector and fill it from host data
    fn upload_vector(&self, data: &[f64], label: &'static str) -> Result<R::Vector>;

    /// Overwrite an existing vector with host data of the same length
    fn write_vector(&self, dst: &mut R::Vector, data: &[f64]) -> Result<()>;

    /// Copy a vector back to the host. Blocks until the queue drains.
    fn download_vector(&self, src: &R::Vector, out: &mut [f64]) -> Result<()>;

    /// Allocate an index array and fill it from host data
    fn upload_indices(&self, data: &[u32], label: &'static str) -> Result<R::Indices>;

    /// Set every element to zero
    fn fill_zero(&self, v: &mut R::Vector) -> Result<()>;

    /// `dst = src`
    fn copy(&self, src: &R::Vector, dst: &mut R::Vector) -> Result<()>;
}
