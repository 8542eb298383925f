use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::allocator::{AcceleratorAllocator, Allocator, HostAllocator, LruAllocator};
use crate::device::{Device, DeviceCapabilities, DeviceSpec};
use crate::error::{InvalidDeviceSnafu, Result};

/// Extension trait for DeviceSpec to add parsing functionality.
pub trait DeviceSpecExt {
    /// Parse a device string into a DeviceSpec.
    ///
    /// Examples:
    /// - "CPU" -> DeviceSpec::Cpu
    /// - "ACCEL:1" -> DeviceSpec::Accelerator { device_id: 1 }
    /// - "accel" / "gpu" -> DeviceSpec::Accelerator { device_id: 0 }
    fn parse(s: &str) -> Result<DeviceSpec>;
}

impl DeviceSpecExt for DeviceSpec {
    fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_uppercase();
        let parts: Vec<&str> = s.split(':').collect();

        match parts[0] {
            "CPU" if parts.len() == 1 => Ok(DeviceSpec::Cpu),
            "ACCEL" | "GPU" if parts.len() <= 2 => {
                let device_id = match parts.get(1) {
                    Some(id) => id.parse().map_err(|_| InvalidDeviceSnafu { device: s.clone() }.build())?,
                    None => 0,
                };
                Ok(DeviceSpec::Accelerator { device_id })
            }
            _ => InvalidDeviceSnafu { device: s }.fail(),
        }
    }
}

/// Devices keyed by spec and capabilities; created on first request.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<(DeviceSpec, DeviceCapabilities), Arc<Device>>>,
}

impl DeviceRegistry {
    fn new() -> Self {
        Self { devices: RwLock::new(HashMap::new()) }
    }

    /// Get or create a device with the default capabilities for its spec.
    pub fn get(&self, spec: &DeviceSpec) -> Result<Arc<Device>> {
        self.get_with(spec, DeviceCapabilities::for_spec(*spec))
    }

    /// Get or create a device with explicit capabilities.
    pub fn get_with(&self, spec: &DeviceSpec, capabilities: DeviceCapabilities) -> Result<Arc<Device>> {
        let key = (*spec, capabilities);

        // Fast path: read lock
        {
            let devices = self.devices.read();
            if let Some(device) = devices.get(&key) {
                return Ok(Arc::clone(device));
            }
        }

        // Slow path: write lock to create
        let mut devices = self.devices.write();

        // Double-check after acquiring write lock
        if let Some(device) = devices.get(&key) {
            return Ok(Arc::clone(device));
        }

        let device = Arc::new(Self::create_device(spec, capabilities));
        debug!(device = %spec, ?capabilities, "device created");
        devices.insert(key, Arc::clone(&device));
        Ok(device)
    }

    /// Get a device by parsing a device string.
    pub fn get_device(&self, device: &str) -> Result<Arc<Device>> {
        let spec = <DeviceSpec as DeviceSpecExt>::parse(device)?;
        self.get(&spec)
    }

    fn create_device(spec: &DeviceSpec, capabilities: DeviceCapabilities) -> Device {
        let device_id = match spec {
            DeviceSpec::Cpu => 0,
            DeviceSpec::Accelerator { device_id } => *device_id,
        };
        let host: Arc<dyn Allocator> = Arc::new(LruAllocator::new(Box::new(HostAllocator)));
        let accelerator: Arc<dyn Allocator> =
            Arc::new(LruAllocator::new(Box::new(AcceleratorAllocator::new(device_id, capabilities.memory_bytes))));
        Device::new(*spec, capabilities, host, accelerator)
    }
}

/// Global device registry instance.
static REGISTRY: Lazy<DeviceRegistry> = Lazy::new(DeviceRegistry::new);

/// Get the global device registry.
pub fn registry() -> &'static DeviceRegistry {
    &REGISTRY
}

/// Convenience function to get a device by string.
pub fn get_device(device: &str) -> Result<Arc<Device>> {
    registry().get_device(device)
}
