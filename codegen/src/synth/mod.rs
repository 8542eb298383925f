//! Kernel synthesis.
//!
//! [`synthesize`] maps an opcode and its operand types to a
//! [`CompiledOperation`]. Point operations are planned through the
//! addressing planner; tiled reductions and transforms derive their launch
//! from their own work field and are memoised through a [`PlanStore`].

pub mod block_reduce;
pub mod convolve;
pub mod fft;
pub mod field_reduce;
pub mod filter_adjoint;
pub mod pointwise;
pub mod tensor_reduce;

use std::sync::Arc;

use itertools::Itertools;
use snafu::ensure;
use tracing::debug;
use weft_device::DeviceCapabilities;
use weft_dtype::{FieldLayout, FieldType};

use crate::addressing::AddressingMode;
use crate::error::{HostOperationSnafu, OperandCountSnafu, Result};
use crate::opcode::Opcode;
use crate::plan::PlanStore;
use crate::types::CompiledOperation;

/// Build the kernels implementing `opcode` on operands of type `inputs`.
pub fn synthesize(
    opcode: &Opcode,
    inputs: &[FieldType],
    capabilities: &DeviceCapabilities,
    plans: &dyn PlanStore,
) -> Result<Arc<CompiledOperation>> {
    let operation = match opcode {
        Opcode::Unary(_) | Opcode::Scale(_) | Opcode::Offset(_) | Opcode::Binary(_) | Opcode::ComplexBinary(_) => {
            Arc::new(pointwise::synthesize(opcode, inputs, capabilities)?)
        }
        Opcode::TensorReduce => Arc::new(tensor_reduce::synthesize(inputs, capabilities)?),
        Opcode::Convolve(border) => Arc::new(convolve::synthesize(*border, inputs, capabilities)?),
        Opcode::FieldReduce(op) => field_reduce::synthesize(*op, inputs, capabilities, plans)?,
        Opcode::FilterAdjoint { size } => filter_adjoint::synthesize(*size, inputs, capabilities, plans)?,
        Opcode::Fft(direction) => fft::synthesize(*direction, inputs, capabilities, plans)?,
        Opcode::Constant
        | Opcode::Sensor { .. }
        | Opcode::Actuator { .. }
        | Opcode::Host { .. }
        | Opcode::Recurrence => {
            return HostOperationSnafu { operation: opcode.name() }.fail();
        }
    };

    debug!(
        operation = %opcode,
        output = %operation.output,
        stages = operation.stages.len(),
        kernels = %operation.stages.iter().map(|k| k.name.as_str()).join(", "),
        "operation synthesized"
    );
    Ok(operation)
}

/// Result type of `opcode` applied to `inputs`, without synthesizing.
pub fn output_type(opcode: &Opcode, inputs: &[FieldType]) -> Result<FieldType> {
    match opcode {
        Opcode::Unary(_) | Opcode::Scale(_) | Opcode::Offset(_) | Opcode::Binary(_) | Opcode::ComplexBinary(_) => {
            pointwise::output_type(opcode, inputs)
        }
        Opcode::TensorReduce => tensor_reduce::output_type(inputs),
        Opcode::Convolve(_) => convolve::output_type(inputs),
        Opcode::FieldReduce(_) => field_reduce::output_type(inputs),
        Opcode::FilterAdjoint { size } => filter_adjoint::output_type(*size, inputs),
        Opcode::Fft(_) => fft::output_type(inputs),
        _ => HostOperationSnafu { operation: opcode.name() }.fail(),
    }
}

pub(crate) fn expect_operands(operation: &'static str, inputs: &[FieldType], expected: usize) -> Result<()> {
    ensure!(inputs.len() == expected, OperandCountSnafu { operation, expected, actual: inputs.len() });
    Ok(())
}

/// `64x64`-style tag used in kernel names; `point` for 0-D fields.
pub(crate) fn shape_tag(field_type: &FieldType) -> String {
    let extents = field_type.field_shape().extents();
    if extents.is_empty() { "point".to_string() } else { extents.iter().join("x") }
}

/// OpenCL-C float literal.
pub(crate) fn float_literal(value: f32) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INFINITY".to_string() } else { "-INFINITY".to_string() }
    } else {
        format!("{value:?}f")
    }
}

/// A field point addressed by one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Point {
    pub layer: usize,
    pub row: usize,
    pub column: usize,
    /// Set in tensor-element mode, where each thread owns one element.
    pub element: Option<usize>,
}

/// Mapping from global ids to field points for per-point launches.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PointMap {
    pub dimensions: usize,
    pub mode: AddressingMode,
    pub layout: FieldLayout,
}

impl PointMap {
    pub fn new(field_type: &FieldType, mode: AddressingMode) -> Self {
        Self { dimensions: field_type.dimensions(), mode, layout: field_type.layout() }
    }

    fn per_element(&self) -> bool {
        self.mode == AddressingMode::TensorElement
    }

    pub fn locate(&self, id: [usize; 3]) -> Option<Point> {
        let layout = &self.layout;
        let column = if self.dimensions >= 1 { id[0] } else { 0 };
        let row = if self.dimensions >= 2 { id[1] } else { 0 };
        let (layer, element) = match (self.dimensions, self.per_element()) {
            (3, true) => (id[2] % layout.layers, Some(id[2] / layout.layers)),
            (3, false) => (id[2], None),
            (dims, true) => (0, Some(id[dims])),
            (_, false) => (0, None),
        };
        let inside = column < layout.columns
            && row < layout.rows
            && layer < layout.layers
            && element.is_none_or(|e| e < layout.tensor_elements);
        inside.then_some(Point { layer, row, column, element })
    }

    /// Source lines declaring `_layer/_row/_column` (and `_tensorElement` in
    /// tensor-element mode) from the global id, followed by the bounds guard.
    pub fn prologue(&self, name: &str) -> Vec<String> {
        let gid = |axis: usize| format!("get_global_id({axis})");
        let mut lines = Vec::new();
        lines.push(format!("const int _column = {};", if self.dimensions >= 1 { gid(0) } else { "0".into() }));
        lines.push(format!("const int _row = {};", if self.dimensions >= 2 { gid(1) } else { "0".into() }));
        match (self.dimensions, self.per_element()) {
            (3, true) => {
                lines.push(format!("const int _layer = {} % {name}_layers;", gid(2)));
                lines.push(format!("const int _tensorElement = {} / {name}_layers;", gid(2)));
            }
            (3, false) => lines.push(format!("const int _layer = {};", gid(2))),
            (dims, true) => {
                lines.push("const int _layer = 0;".into());
                lines.push(format!("const int _tensorElement = {};", gid(dims)));
            }
            (_, false) => lines.push("const int _layer = 0;".into()),
        }

        let mut guard = format!("_column >= {name}_columns || _row >= {name}_rows || _layer >= {name}_layers");
        if self.per_element() {
            guard.push_str(&format!(" || _tensorElement >= {name}_tensorElements"));
        }
        lines.push(format!("if ({guard}) return;"));
        lines
    }

    /// Tensor elements a thread at `point` is responsible for.
    pub fn elements(&self, point: &Point) -> std::ops::Range<usize> {
        match point.element {
            Some(e) => e..e + 1,
            None => 0..self.layout.tensor_elements,
        }
    }
}
