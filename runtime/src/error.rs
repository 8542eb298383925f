//! Error types for circuit construction and execution.

use snafu::Snafu;
use weft_dtype::FieldType;

use crate::checkpoint::Version;
use crate::circuit::{KernelId, RegisterId};

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("codegen error: {source}"))]
    Codegen { source: weft_codegen::Error },

    #[snafu(display("device error: {source}"))]
    Device { source: weft_device::Error },

    #[snafu(display("field type error: {source}"))]
    FieldType { source: weft_dtype::Error },

    /// Stored parameters were written by a newer kernel version.
    #[snafu(display("kernel {kernel} version {version} cannot restore parameters stored by version {stored}"))]
    IncompatibleVersion { kernel: String, version: Version, stored: Version },

    #[snafu(display("recurrence {register} has no driver at reset"))]
    MissingBinding { register: String },

    #[snafu(display("recurrence {register} is already bound"))]
    DuplicateBinding { register: String },

    #[snafu(display("{register} is not a recurrence"))]
    NotARecurrence { register: String },

    #[snafu(display("recurrence {register} is {expected}, driver is {actual}"))]
    RecurrenceType { register: String, expected: FieldType, actual: FieldType },

    #[snafu(display("recurrence {register} cannot drive itself"))]
    SelfBinding { register: String },

    #[snafu(display("unknown register {id}"))]
    UnknownRegister { id: RegisterId },

    /// The register is still borrowed through a handle returned by the scheduler.
    #[snafu(display("register {id} is in use"))]
    RegisterInUse { id: RegisterId },

    #[snafu(display("unknown kernel {id}"))]
    UnknownKernel { id: KernelId },

    #[snafu(display("no restore constructor registered for tag {tag}"))]
    UnknownTag { tag: String },

    #[snafu(display("checkpoint has no field {name}"))]
    MissingField { name: String },

    #[snafu(display("checkpoint field {name} is not {expected}"))]
    FieldKind { name: String, expected: &'static str },

    /// Dependency order does not exist; `remaining` kernels are on or behind a cycle.
    #[snafu(display("kernel circuit has a cycle through {remaining} kernels"))]
    Cycle { remaining: usize },

    #[snafu(display("{register} expects {expected} values, got {actual}"))]
    ValueCount { register: String, expected: usize, actual: usize },

    #[snafu(display("kernel {kernel} cannot be copied"))]
    NotCopyable { kernel: String },

    #[snafu(display("scheduler must be reset before stepping"))]
    NotReset,
}
