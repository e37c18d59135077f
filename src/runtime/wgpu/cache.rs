//! Global client cache for WebGPU runtime

use super::client::WgpuClient;
use super::device::WgpuDevice;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Global client cache: (platform, adapter index) -> cached WgpuClient
static CLIENT_CACHE: OnceLock<Mutex<HashMap<(usize, usize), WgpuClient>>> = OnceLock::new();

/// Get or create a cached WgpuClient for a device.
///
/// Only one `wgpu::Device` exists per adapter. wgpu buffers belong to the
/// device that created them and cannot be bound on a different one, so
/// every client of an adapter must share it.
pub(super) fn get_or_create_client(device: &WgpuDevice) -> Result<WgpuClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache_guard = cache.lock().unwrap_or_else(|e| e.into_inner());

    let key = (device.platform, device.index);
    if let Some(client) = cache_guard.get(&key) {
        return Ok(client.clone());
    }

    let client = WgpuClient::new_uncached(device)?;
    cache_guard.insert(key, client.clone());

    Ok(client)
}
