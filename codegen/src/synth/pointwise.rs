//! Element-wise point operations.

use std::sync::Arc;

use snafu::ensure;
use weft_device::DeviceCapabilities;
use weft_dtype::{ElementKind, FieldLayout, FieldType};

use super::{PointMap, expect_operands, float_literal, shape_tag};
use crate::addressing::{AddressingMode, select_addressing};
use crate::error::{Result, ShapeMismatchSnafu, UnsupportedElementSnafu};
use crate::opcode::{BinaryOp, Opcode, UnaryOp};
use crate::program::Program;
use crate::source::{SourceWriter, geometry_macros, parameter_list};
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PointOp {
    Unary(UnaryOp),
    Scale(f32),
    Offset(f32),
    Binary(BinaryOp),
    Complex(BinaryOp),
}

impl PointOp {
    fn from_opcode(opcode: &Opcode) -> Option<Self> {
        match opcode {
            Opcode::Unary(op) => Some(Self::Unary(*op)),
            Opcode::Scale(factor) => Some(Self::Scale(*factor)),
            Opcode::Offset(offset) => Some(Self::Offset(*offset)),
            Opcode::Binary(op) => Some(Self::Binary(*op)),
            Opcode::ComplexBinary(op) => Some(Self::Complex(*op)),
            _ => None,
        }
    }

    fn operands(&self) -> usize {
        match self {
            Self::Unary(_) | Self::Scale(_) | Self::Offset(_) => 1,
            Self::Binary(_) | Self::Complex(_) => 2,
        }
    }

    fn apply(&self, a: f32, b: f32) -> f32 {
        match self {
            Self::Unary(op) => op.apply(a),
            Self::Scale(factor) => a * factor,
            Self::Offset(offset) => a + offset,
            Self::Binary(op) => op.apply(a, b),
            Self::Complex(_) => f32::NAN,
        }
    }

    fn render(&self, a: &str, b: &str) -> String {
        match self {
            Self::Unary(op) => op.render(a),
            Self::Scale(factor) => format!("({a} * {})", float_literal(*factor)),
            Self::Offset(offset) => format!("({a} + {})", float_literal(*offset)),
            Self::Binary(op) | Self::Complex(op) => op.render(a, b),
        }
    }
}

fn operation_name(op: PointOp) -> &'static str {
    match op {
        PointOp::Unary(_) | PointOp::Scale(_) | PointOp::Offset(_) => "unary point operation",
        PointOp::Binary(_) => "binary point operation",
        PointOp::Complex(_) => "complex point operation",
    }
}

/// Second operand is a 0-D scalar read at every point.
fn is_broadcast(first: &FieldType, second: &FieldType) -> bool {
    second.dimensions() == 0 && second.tensor_elements() == 1 && first != second
}

fn point_op(opcode: &Opcode) -> Result<PointOp> {
    match PointOp::from_opcode(opcode) {
        Some(op) => Ok(op),
        None => {
            ShapeMismatchSnafu { operation: "point operation", reason: format!("{opcode} is not a point operation") }
                .fail()
        }
    }
}

pub fn output_type(opcode: &Opcode, inputs: &[FieldType]) -> Result<FieldType> {
    let op = point_op(opcode)?;
    let operation = operation_name(op);
    expect_operands(operation, inputs, op.operands())?;
    let first = &inputs[0];

    match op {
        PointOp::Complex(binary) => {
            ensure!(
                binary.complex_defined(),
                ShapeMismatchSnafu { operation, reason: format!("{binary} is not defined on complex values") }
            );
            for input in inputs {
                ensure!(
                    input.element() == ElementKind::Complex,
                    UnsupportedElementSnafu { operation, element: input.element() }
                );
            }
            ensure!(
                inputs[1] == *first,
                ShapeMismatchSnafu { operation, reason: format!("{} vs {}", first, inputs[1]) }
            );
            Ok(first.clone())
        }
        _ => {
            for input in inputs {
                ensure!(!input.element().is_complex(), UnsupportedElementSnafu { operation, element: input.element() });
            }
            if let Some(second) = inputs.get(1) {
                let compatible = (second.field_shape() == first.field_shape()
                    && second.tensor_shape() == first.tensor_shape())
                    || is_broadcast(first, second);
                ensure!(compatible, ShapeMismatchSnafu { operation, reason: format!("{first} vs {second}") });
            }
            Ok(first.with_element(first.element().arithmetic()))
        }
    }
}

pub fn synthesize(opcode: &Opcode, inputs: &[FieldType], capabilities: &DeviceCapabilities) -> Result<CompiledOperation> {
    let output = output_type(opcode, inputs)?;
    let op = point_op(opcode)?;
    let (mode, workgroup) = select_addressing(inputs, &output, capabilities)?;
    let map = PointMap::new(&output, mode);
    let broadcast = inputs.get(1).is_some_and(|second| is_broadcast(&inputs[0], second));

    let name = format!("{}_{}", opcode.name(), shape_tag(&output));
    let source = render(&name, op, inputs, &output, &map, broadcast);

    let mut buffer_args: Vec<BufferArg> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| BufferArg {
            index: i,
            name: operand_name(i).to_string(),
            slot: BufferSlot::Input(i),
            words: input.layout().words(),
            is_output: false,
        })
        .collect();
    buffer_args.push(BufferArg {
        index: inputs.len(),
        name: "out".into(),
        slot: BufferSlot::Output(0),
        words: output.layout().words(),
        is_output: true,
    });

    let program = PointwiseProgram {
        op,
        map,
        a: inputs[0].layout(),
        b: inputs.get(1).map(FieldType::layout),
        broadcast,
        out: output.layout(),
    };
    let kernel = SynthesizedKernel {
        name,
        source,
        buffer_args,
        mode,
        workgroup,
        local_memory_bytes: 0,
        program: Arc::new(program),
    };
    Ok(CompiledOperation::single(kernel, output))
}

fn operand_name(index: usize) -> &'static str {
    if index == 0 { "a" } else { "b" }
}

fn render(name: &str, op: PointOp, inputs: &[FieldType], output: &FieldType, map: &PointMap, broadcast: bool) -> String {
    let mut w = SourceWriter::new();
    for (i, input) in inputs.iter().enumerate() {
        w.lines(geometry_macros(operand_name(i), input));
    }
    w.lines(geometry_macros("out", output));
    w.blank();

    let input_names: Vec<&str> = (0..inputs.len()).map(operand_name).collect();
    w.open(format!("__kernel void {name}({})", parameter_list(&input_names, &["out"])));
    w.lines(map.prologue("out"));

    let elements: Vec<String> = match map.mode {
        AddressingMode::TensorElement => vec!["_tensorElement".to_string()],
        // Small tensors are unrolled: one statement per element.
        _ => (0..output.tensor_elements()).map(|e| e.to_string()).collect(),
    };
    for e in &elements {
        let b_index = if broadcast { "0, 0, 0, 0".to_string() } else { format!("_layer, _row, _column, {e}") };
        let a = format!("readA(_layer, _row, _column, {e})");
        let b = format!("readB({b_index})");
        match op {
            PointOp::Complex(binary) => {
                let ai = format!("readAImag(_layer, _row, _column, {e})");
                let bi = format!("readBImag({b_index})");
                w.open("");
                w.line(format!("const float ar = {a}, ai = {ai}, br = {b}, bi = {bi};"));
                let (re, im) = match binary {
                    BinaryOp::Add => ("ar + br".to_string(), "ai + bi".to_string()),
                    BinaryOp::Subtract => ("ar - br".to_string(), "ai - bi".to_string()),
                    BinaryOp::Multiply => ("ar * br - ai * bi".to_string(), "ar * bi + ai * br".to_string()),
                    _ => {
                        w.line("const float d = br * br + bi * bi;");
                        ("(ar * br + ai * bi) / d".to_string(), "(ai * br - ar * bi) / d".to_string())
                    }
                };
                w.line(format!("writeOut(_layer, _row, _column, {e}, {re});"));
                w.line(format!("writeOutImag(_layer, _row, _column, {e}, {im});"));
                w.close();
            }
            _ => {
                w.line(format!("writeOut(_layer, _row, _column, {e}, {});", op.render(&a, &b)));
            }
        }
    }
    w.close();
    w.finish()
}

#[derive(Debug)]
struct PointwiseProgram {
    op: PointOp,
    map: PointMap,
    a: FieldLayout,
    b: Option<FieldLayout>,
    broadcast: bool,
    out: FieldLayout,
}

impl Program for PointwiseProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let a = inputs[0];
        let b = inputs.get(1).copied();
        let out = &mut *outputs[0];

        for id in workgroup.work_items() {
            let Some(point) = self.map.locate(id) else { continue };
            for e in self.map.elements(&point) {
                let ia = self.a.index(point.layer, point.row, point.column, e);
                let io = self.out.index(point.layer, point.row, point.column, e);
                let ib = match (&self.b, self.broadcast) {
                    (Some(_), true) => 0,
                    (Some(layout), false) => layout.index(point.layer, point.row, point.column, e),
                    (None, _) => 0,
                };
                match self.op {
                    PointOp::Complex(binary) => {
                        let (Some(b), Some(b_layout)) = (b, &self.b) else { continue };
                        let (re, im) = binary.apply_complex(
                            (a[ia], a[ia + self.a.part_stride]),
                            (b[ib], b[ib + b_layout.part_stride]),
                        );
                        out[io] = re;
                        out[io + self.out.part_stride] = im;
                    }
                    op => out[io] = op.apply(a[ia], b.map_or(0.0, |b| b[ib])),
                }
            }
        }
        Ok(())
    }
}
