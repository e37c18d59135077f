//! CPU runtime implementation

use super::client::CpuClient;
use super::device::CpuDevice;
use crate::error::{Error, Result};
use crate::runtime::{Runtime, VectorStorage};

/// CPU compute runtime
///
/// This is the default runtime that works on any platform. It exposes a
/// single platform with a single device.
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Client = CpuClient;
    type Vector = Vec<f64>;
    type Indices = Vec<u32>;

    fn name() -> &'static str {
        "cpu"
    }

    fn select_device(platform_id: usize, device_id: usize) -> Result<Self::Device> {
        if platform_id != 0 {
            return Err(Error::InvalidPlatform {
                index: platform_id,
                available: 1,
            });
        }
        if device_id != 0 {
            return Err(Error::InvalidDevice {
                platform: platform_id,
                index: device_id,
                available: 1,
            });
        }
        Ok(CpuDevice::new())
    }

    fn create_client(device: &Self::Device) -> Result<Self::Client> {
        Ok(CpuClient::new(device.clone()))
    }
}

impl VectorStorage for Vec<f64> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_device_bounds() {
        assert!(CpuRuntime::select_device(0, 0).is_ok());
        assert!(matches!(
            CpuRuntime::select_device(1, 0),
            Err(Error::InvalidPlatform { index: 1, .. })
        ));
        assert!(matches!(
            CpuRuntime::select_device(0, 2),
            Err(Error::InvalidDevice { index: 2, .. })
        ));
    }
}
