//! Error types for kernel synthesis.

use snafu::Snafu;
use weft_dtype::{ElementKind, FieldType};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration errors raised while planning or synthesizing a kernel.
///
/// All of them are detected at construction time; a kernel that synthesized
/// successfully never reports a shape problem while executing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Operand geometries disagree in a way the operation does not allow.
    #[snafu(display("{operation}: shape mismatch: {reason}"))]
    ShapeMismatch { operation: &'static str, reason: String },

    #[snafu(display("{operation} expects {expected} operands, got {actual}"))]
    OperandCount { operation: &'static str, expected: usize, actual: usize },

    #[snafu(display("{operation} does not accept {element} fields"))]
    UnsupportedElement { operation: &'static str, element: ElementKind },

    #[snafu(display("{operation} does not accept {field_type}: {reason}"))]
    UnsupportedShape { operation: &'static str, field_type: FieldType, reason: String },

    /// No tile size fits in the device's local memory.
    #[snafu(display("{operation}: local memory exhausted, need {required} bytes, device has {available}"))]
    LocalMemoryExhausted { operation: &'static str, required: usize, available: usize },

    /// A `%name%` slot in a code template was never filled.
    #[snafu(display("unresolved template placeholder %{placeholder}%"))]
    UnresolvedPlaceholder { placeholder: String },

    #[snafu(display("{operation}: extent {extent} is not a power of two"))]
    NotPowerOfTwo { operation: &'static str, extent: usize },

    /// The opcode is executed on the host and has no accelerator kernel.
    #[snafu(display("{operation} is a host-side operation and cannot be synthesized"))]
    HostOperation { operation: &'static str },

    #[snafu(display("unknown opcode {name}"))]
    UnknownOpcode { name: String },

    /// Buffers handed to a kernel launch do not match its bindings.
    #[snafu(display("kernel {kernel}: {reason}"))]
    Launch { kernel: String, reason: String },

    #[snafu(display("Device error: {source}"))]
    Device {
        #[snafu(source)]
        source: weft_device::Error,
    },

    #[snafu(display("Invalid field type: {source}"))]
    FieldType {
        #[snafu(source)]
        source: weft_dtype::Error,
    },
}
