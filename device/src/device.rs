//! Device description.
//!
//! A [`Device`] pairs a host allocator with an accelerator allocator and states
//! the capabilities the kernel synthesizer plans against: local memory per
//! workgroup, maximum workgroup size and the number of compute units.

use std::fmt;
use std::sync::Arc;

use weft_dtype::FieldType;

use crate::allocator::Allocator;
use crate::buffer_pair::FieldBuffer;
use crate::error::Result;

/// Which device a circuit runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceSpec {
    /// Accelerator emulated in host memory with CPU-like limits.
    Cpu,
    /// Emulated discrete accelerator.
    Accelerator { device_id: usize },
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Accelerator { device_id } => write!(f, "ACCEL:{device_id}"),
        }
    }
}

/// Limits the kernel synthesizer plans against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Local (workgroup-shared) memory in bytes.
    pub local_memory_bytes: usize,
    /// Maximum threads per workgroup.
    pub max_workgroup_size: usize,
    /// Workgroups that execute concurrently.
    pub compute_units: usize,
    /// Accelerator memory capacity in bytes.
    pub memory_bytes: usize,
}

impl DeviceCapabilities {
    pub const DEFAULT: Self = Self {
        local_memory_bytes: 48 * 1024,
        max_workgroup_size: 256,
        compute_units: 16,
        memory_bytes: 1 << 30,
    };

    pub fn for_spec(spec: DeviceSpec) -> Self {
        match spec {
            DeviceSpec::Cpu => Self { local_memory_bytes: 32 * 1024, max_workgroup_size: 1024, compute_units: 8, ..Self::DEFAULT },
            DeviceSpec::Accelerator { .. } => Self::DEFAULT,
        }
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A device owning host and accelerator allocators.
#[derive(Debug)]
pub struct Device {
    pub spec: DeviceSpec,
    pub capabilities: DeviceCapabilities,
    pub host: Arc<dyn Allocator>,
    pub accelerator: Arc<dyn Allocator>,
}

impl Device {
    pub fn new(
        spec: DeviceSpec,
        capabilities: DeviceCapabilities,
        host: Arc<dyn Allocator>,
        accelerator: Arc<dyn Allocator>,
    ) -> Self {
        Self { spec, capabilities, host, accelerator }
    }

    /// Allocate the master/slave pair for a field of type `field_type`.
    pub fn field_buffer(&self, field_type: &FieldType) -> Result<FieldBuffer> {
        FieldBuffer::new(field_type.clone(), Arc::clone(&self.host), Arc::clone(&self.accelerator))
    }
}
