//! Sum of the tensor elements at every point.

use std::sync::Arc;

use itertools::Itertools;
use snafu::{ResultExt, ensure};
use weft_device::DeviceCapabilities;
use weft_dtype::{FieldLayout, FieldType, Shape};

use super::{PointMap, expect_operands, shape_tag};
use crate::addressing::{AddressingMode, OpClass, select_addressing_for};
use crate::error::{FieldTypeSnafu, Result, UnsupportedElementSnafu};
use crate::program::Program;
use crate::source::{SourceWriter, geometry_macros, parameter_list};
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

const OPERATION: &str = "tensor reduce";

pub fn output_type(inputs: &[FieldType]) -> Result<FieldType> {
    expect_operands(OPERATION, inputs, 1)?;
    let input = &inputs[0];
    ensure!(!input.element().is_complex(), UnsupportedElementSnafu { operation: OPERATION, element: input.element() });
    input.with_element(input.element().arithmetic()).with_tensor_shape(Shape::scalar()).context(FieldTypeSnafu)
}

pub fn synthesize(inputs: &[FieldType], capabilities: &DeviceCapabilities) -> Result<CompiledOperation> {
    let output = output_type(inputs)?;
    let input = &inputs[0];
    let (mode, workgroup) = select_addressing_for(OpClass::PerPoint, inputs, &output, capabilities)?;
    let map = PointMap::new(&output, mode);
    let name = format!("tensor_reduce_{}_{}", input.tensor_elements(), shape_tag(&output));

    let mut w = SourceWriter::new();
    w.lines(geometry_macros("in", input));
    w.lines(geometry_macros("out", &output));
    w.blank();
    w.open(format!("__kernel void {name}({})", parameter_list(&["in"], &["out"])));
    w.lines(map.prologue("out"));
    match mode {
        AddressingMode::BigTensor => {
            w.line("float sum = 0.0f;");
            w.open("for (int e = 0; e < in_tensorElements; e++)");
            w.line("sum += readIn(_layer, _row, _column, e);");
            w.close();
        }
        _ => {
            let terms = (0..input.tensor_elements()).map(|e| format!("readIn(_layer, _row, _column, {e})")).join(" + ");
            w.line(format!("const float sum = {terms};"));
        }
    }
    w.line("writeOut(_layer, _row, _column, 0, sum);");
    w.close();

    let kernel = SynthesizedKernel {
        name,
        source: w.finish(),
        buffer_args: vec![
            BufferArg {
                index: 0,
                name: "in".into(),
                slot: BufferSlot::Input(0),
                words: input.layout().words(),
                is_output: false,
            },
            BufferArg {
                index: 1,
                name: "out".into(),
                slot: BufferSlot::Output(0),
                words: output.layout().words(),
                is_output: true,
            },
        ],
        mode,
        workgroup,
        local_memory_bytes: 0,
        program: Arc::new(TensorReduceProgram { map, input: input.layout(), output: output.layout() }),
    };
    Ok(CompiledOperation::single(kernel, output))
}

#[derive(Debug)]
struct TensorReduceProgram {
    map: PointMap,
    input: FieldLayout,
    output: FieldLayout,
}

impl Program for TensorReduceProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let input = inputs[0];
        let out = &mut *outputs[0];
        for id in workgroup.work_items() {
            let Some(p) = self.map.locate(id) else { continue };
            let sum = (0..self.input.tensor_elements)
                .map(|e| input[self.input.index(p.layer, p.row, p.column, e)])
                .fold(0.0f32, |acc, x| acc + x);
            out[self.output.point_index(p.layer, p.row, p.column)] = sum;
        }
        Ok(())
    }
}
