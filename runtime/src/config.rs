//! Runtime configuration.
//!
//! Built explicitly with a bon builder or read from the environment, with
//! unset or unparsable variables falling back to the defaults.

use std::sync::Arc;

use bon::bon;
use snafu::ResultExt;
use weft_device::{Device, DeviceCapabilities, DeviceSpec, DeviceSpecExt, registry};

use crate::error::{DeviceSnafu, Result};

/// Device a circuit is built for and the limits its kernels are planned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub device: DeviceSpec,
    pub capabilities: DeviceCapabilities,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { device: DeviceSpec::Accelerator { device_id: 0 }, capabilities: DeviceCapabilities::DEFAULT }
    }
}

#[bon]
impl RuntimeConfig {
    #[builder]
    pub fn new(
        #[builder(default = DeviceSpec::Accelerator { device_id: 0 })] device: DeviceSpec,
        #[builder(default = DeviceCapabilities::DEFAULT.local_memory_bytes)] local_memory_bytes: usize,
        #[builder(default = DeviceCapabilities::DEFAULT.max_workgroup_size)] max_workgroup_size: usize,
        #[builder(default = DeviceCapabilities::DEFAULT.compute_units)] compute_units: usize,
        #[builder(default = DeviceCapabilities::DEFAULT.memory_bytes)] memory_bytes: usize,
    ) -> Self {
        Self {
            device,
            capabilities: DeviceCapabilities { local_memory_bytes, max_workgroup_size, compute_units, memory_bytes },
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `WEFT_DEVICE` - `CPU` or `ACCEL[:n]` (default: `ACCEL:0`)
    /// * `WEFT_LOCAL_MEMORY` - Local memory per workgroup in bytes (default: 49152)
    /// * `WEFT_MAX_WORKGROUP` - Maximum threads per workgroup (default: 256)
    /// * `WEFT_COMPUTE_UNITS` - Concurrent workgroups (default: 16)
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables looked up through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = DeviceCapabilities::DEFAULT;
        let device = match var("WEFT_DEVICE") {
            Some(device) => <DeviceSpec as DeviceSpecExt>::parse(&device).context(DeviceSnafu)?,
            None => DeviceSpec::Accelerator { device_id: 0 },
        };
        let local_memory_bytes =
            var("WEFT_LOCAL_MEMORY").and_then(|s| s.parse().ok()).unwrap_or(defaults.local_memory_bytes);
        let max_workgroup_size =
            var("WEFT_MAX_WORKGROUP").and_then(|s| s.parse().ok()).unwrap_or(defaults.max_workgroup_size);
        let compute_units = var("WEFT_COMPUTE_UNITS").and_then(|s| s.parse().ok()).unwrap_or(defaults.compute_units);

        Ok(Self::builder()
            .device(device)
            .local_memory_bytes(local_memory_bytes)
            .max_workgroup_size(max_workgroup_size)
            .compute_units(compute_units)
            .build())
    }

    /// Device from the global registry matching this configuration.
    pub fn device(&self) -> Result<Arc<Device>> {
        registry().get_with(&self.device, self.capabilities).context(DeviceSnafu)
    }
}
