//! Memory model for weft.
//!
//! Every field register owns a [`FieldBuffer`]: a *master* buffer resident in
//! accelerator memory and a *slave* buffer resident in host memory, with an
//! explicit validity state machine deciding when a transfer is required.
//!
//! Accelerator memory is emulated: it is a separate allocation of `f32` words
//! reachable only through [`Buffer::copy_from`] transfers and the word views
//! handed to kernel programs.

pub mod allocator;
pub mod buffer;
pub mod buffer_pair;
pub mod device;
pub mod error;
pub mod registry;


pub use allocator::{AcceleratorAllocator, Allocator, HostAllocator, LruAllocator, MemorySide, RawBuffer};
pub use buffer::{Buffer, Encoding};
pub use buffer_pair::{FieldBuffer, TransferStats, Validity};
pub use device::{Device, DeviceCapabilities, DeviceSpec};
pub use error::*;
pub use registry::{DeviceRegistry, DeviceSpecExt, get_device, registry};
