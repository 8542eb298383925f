//! Addressing mode selection.
//!
//! The addressing mode decides how threads map onto field data. It is a pure
//! function of the participating field types and the operation class, so it is
//! recomputed on every kernel construction instead of being stored.

use snafu::ensure;
use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::error::{Result, ShapeMismatchSnafu};
use crate::workgroup::WorkGroupParameters;

/// Tensors with at most this many elements fit in a thread's registers.
pub const MAX_SMALL_TENSOR_ELEMENTS: usize = 4;

/// Thread-to-data assignment of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum AddressingMode {
    /// One thread per field point, holding the whole (small) tensor.
    SmallTensor,
    /// One thread per tensor element of each field point.
    TensorElement,
    /// One thread per field point, looping over a large tensor.
    BigTensor,
}

/// How an operation consumes the tensor at each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// Each output tensor element depends only on the same element of the inputs.
    ElementWise,
    /// Each output point needs the whole input tensor at that point.
    PerPoint,
}

pub fn is_small_tensor(field_type: &FieldType) -> bool {
    field_type.tensor_elements() <= MAX_SMALL_TENSOR_ELEMENTS
}

/// Addressing plan for an element-wise operation.
pub fn select_addressing(
    inputs: &[FieldType],
    output: &FieldType,
    capabilities: &DeviceCapabilities,
) -> Result<(AddressingMode, WorkGroupParameters)> {
    select_addressing_for(OpClass::ElementWise, inputs, output, capabilities)
}

/// Addressing plan for an operation of the given class.
///
/// Every input must have the output's field shape, or be zero-dimensional
/// (broadcast to every point).
pub fn select_addressing_for(
    class: OpClass,
    inputs: &[FieldType],
    output: &FieldType,
    capabilities: &DeviceCapabilities,
) -> Result<(AddressingMode, WorkGroupParameters)> {
    for input in inputs {
        ensure!(
            input.dimensions() == 0 || input.field_shape() == output.field_shape(),
            ShapeMismatchSnafu {
                operation: "addressing",
                reason: format!("input {input} does not cover output {output}"),
            }
        );
    }

    let mode = match class {
        OpClass::ElementWise if is_small_tensor(output) => AddressingMode::SmallTensor,
        OpClass::ElementWise => AddressingMode::TensorElement,
        OpClass::PerPoint if is_small_tensor(output) && inputs.iter().all(is_small_tensor) => {
            AddressingMode::SmallTensor
        }
        OpClass::PerPoint => AddressingMode::BigTensor,
    };
    Ok((mode, WorkGroupParameters::for_field(output, mode, capabilities)))
}
