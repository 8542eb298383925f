//! Direct 2-D convolution with a border policy.

use std::sync::Arc;

use snafu::ensure;
use weft_device::DeviceCapabilities;
use weft_dtype::{FieldLayout, FieldType};

use super::{PointMap, expect_operands, shape_tag};
use crate::addressing::{OpClass, select_addressing_for};
use crate::error::{Result, UnsupportedElementSnafu, UnsupportedShapeSnafu};
use crate::opcode::BorderPolicy;
use crate::program::Program;
use crate::source::{SourceWriter, geometry_macros, parameter_list};
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

const OPERATION: &str = "convolve";

pub fn output_type(inputs: &[FieldType]) -> Result<FieldType> {
    expect_operands(OPERATION, inputs, 2)?;
    for input in inputs {
        ensure!(!input.element().is_complex(), UnsupportedElementSnafu { operation: OPERATION, element: input.element() });
        ensure!(
            input.dimensions() == 2 && input.tensor_order() == 0,
            UnsupportedShapeSnafu { operation: OPERATION, field_type: input.clone(), reason: "expected a 2-D scalar field" }
        );
    }
    let kernel = &inputs[1];
    ensure!(
        kernel.rows() % 2 == 1 && kernel.columns() % 2 == 1,
        UnsupportedShapeSnafu { operation: OPERATION, field_type: kernel.clone(), reason: "kernel extents must be odd" }
    );
    let image = &inputs[0];
    Ok(image.with_element(image.element().arithmetic()))
}

pub fn synthesize(
    border: BorderPolicy,
    inputs: &[FieldType],
    capabilities: &DeviceCapabilities,
) -> Result<CompiledOperation> {
    let output = output_type(inputs)?;
    let (image, kernel) = (&inputs[0], &inputs[1]);
    let (mode, workgroup) = select_addressing_for(OpClass::PerPoint, &inputs[..1], &output, capabilities)?;
    let map = PointMap::new(&output, mode);
    let name = format!("convolve_{border}_{}x{}_{}", kernel.rows(), kernel.columns(), shape_tag(image));

    let mut w = SourceWriter::new();
    w.lines(geometry_macros("in", image));
    w.lines(geometry_macros("kernel", kernel));
    w.lines(geometry_macros("out", &output));
    w.blank();
    w.open(format!("__kernel void {name}({})", parameter_list(&["in", "kernel"], &["out"])));
    w.lines(map.prologue("out"));
    w.line("float sum = 0.0f;");
    w.open("for (int i = 0; i < kernel_rows; i++)");
    w.line("const int sr = _row + kernel_rows / 2 - i;");
    w.open("for (int j = 0; j < kernel_columns; j++)");
    w.line("const int sc = _column + kernel_columns / 2 - j;");
    match border {
        BorderPolicy::Zero => {
            w.line("if (sr >= 0 && sr < in_rows && sc >= 0 && sc < in_columns)");
            w.line("    sum += readKernel(0, i, j, 0) * readIn(0, sr, sc, 0);");
        }
        BorderPolicy::Cyclic => {
            w.line("const int wr = ((sr % in_rows) + in_rows) % in_rows;");
            w.line("const int wc = ((sc % in_columns) + in_columns) % in_columns;");
            w.line("sum += readKernel(0, i, j, 0) * readIn(0, wr, wc, 0);");
        }
        BorderPolicy::Clamp => {
            w.line("sum += readKernel(0, i, j, 0) * readIn(0, clamp(sr, 0, in_rows - 1), clamp(sc, 0, in_columns - 1), 0);");
        }
    }
    w.close();
    w.close();
    w.line("writeOut(_layer, _row, _column, 0, sum);");
    w.close();

    let program = ConvolveProgram { border, map, image: image.layout(), kernel: kernel.layout() };
    let kernel = SynthesizedKernel {
        name,
        source: w.finish(),
        buffer_args: vec![
            BufferArg {
                index: 0,
                name: "in".into(),
                slot: BufferSlot::Input(0),
                words: image.layout().words(),
                is_output: false,
            },
            BufferArg {
                index: 1,
                name: "kernel".into(),
                slot: BufferSlot::Input(1),
                words: kernel.layout().words(),
                is_output: false,
            },
            BufferArg {
                index: 2,
                name: "out".into(),
                slot: BufferSlot::Output(0),
                words: output.layout().words(),
                is_output: true,
            },
        ],
        mode,
        workgroup,
        local_memory_bytes: 0,
        program: Arc::new(program),
    };
    Ok(CompiledOperation::single(kernel, output))
}

#[derive(Debug)]
struct ConvolveProgram {
    border: BorderPolicy,
    map: PointMap,
    image: FieldLayout,
    kernel: FieldLayout,
}

impl Program for ConvolveProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let (image, kernel) = (inputs[0], inputs[1]);
        let out = &mut *outputs[0];
        let (kr, kc) = (self.kernel.rows, self.kernel.columns);

        for id in workgroup.work_items() {
            let Some(p) = self.map.locate(id) else { continue };
            let mut sum = 0.0f32;
            for i in 0..kr {
                let sr = (p.row + kr / 2) as isize - i as isize;
                for j in 0..kc {
                    let sc = (p.column + kc / 2) as isize - j as isize;
                    let row = self.border.resolve(sr, self.image.rows);
                    let column = self.border.resolve(sc, self.image.columns);
                    if let (Some(row), Some(column)) = (row, column) {
                        sum += kernel[i * kc + j] * image[self.image.point_index(0, row, column)];
                    }
                }
            }
            out[self.map.layout.point_index(0, p.row, p.column)] = sum;
        }
        Ok(())
    }
}
