//! Whole-field reduction.
//!
//! Each tensor element plane is reduced independently. Workgroups stride over
//! the plane, each thread accumulating its own elements, and reduce their
//! threads with a binary tree. With several workgroups per plane the partial
//! results go to an intermediate that [`block_reduce`](super::block_reduce)
//! finishes.
//!
//! Power-of-two inputs split evenly into workgroups and threads, so every
//! addition combines two partial sums over equally many inputs. Sums of
//! exactly representable values therefore stay exact.

use std::sync::Arc;

use snafu::{ResultExt, ensure};
use tracing::debug;
use weft_device::DeviceCapabilities;
use weft_dtype::{FieldType, Shape};

use super::block_reduce::{self, reduction_threads, tree_reduce};
use super::{expect_operands, shape_tag};
use crate::addressing::AddressingMode;
use crate::error::{FieldTypeSnafu, Result, UnsupportedElementSnafu};
use crate::opcode::ReduceOp;
use crate::plan::{PlanFamily, PlanKey, PlanStore};
use crate::program::Program;
use crate::source::fill_template;
use crate::types::{BufferArg, BufferSlot, CompiledOperation, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

const OPERATION: &str = "field reduce";

/// Workgroups per compute unit the reduction aims for.
const GROUPS_PER_COMPUTE_UNIT: usize = 4;

const TEMPLATE: &str = r#"#define POINTS %points%
#define GROUPS %groups%
#define TENSOR_ELEMENTS %elements%

__kernel __attribute__((reqd_work_group_size(%threads%, 1, 1)))
void %name%(__global const float* restrict in, __global float* restrict %destination%) {
    __local float scratch[%threads%];
    const int lid = get_local_id(0);
    const int group = get_group_id(0);
    const int element = get_group_id(1);
    __global const float* plane = in + element * POINTS;

    float acc = %identity%;
    for (int i = group * %threads% + lid; i < POINTS; i += GROUPS * %threads%)
        acc = %accumulate%;
    scratch[lid] = acc;
    barrier(CLK_LOCAL_MEM_FENCE);

    for (int s = %threads% / 2; s > 0; s >>= 1) {
        if (lid < s)
            scratch[lid] = %combine%;
        barrier(CLK_LOCAL_MEM_FENCE);
    }
    if (lid == 0)
        %destination%[group * TENSOR_ELEMENTS + element] = scratch[0];
}
"#;

pub fn output_type(inputs: &[FieldType]) -> Result<FieldType> {
    expect_operands(OPERATION, inputs, 1)?;
    let input = &inputs[0];
    ensure!(!input.element().is_complex(), UnsupportedElementSnafu { operation: OPERATION, element: input.element() });
    input.with_element(input.element().arithmetic()).with_field_shape(Shape::scalar()).context(FieldTypeSnafu)
}

pub fn synthesize(
    op: ReduceOp,
    inputs: &[FieldType],
    capabilities: &DeviceCapabilities,
    plans: &dyn PlanStore,
) -> Result<Arc<CompiledOperation>> {
    let output = output_type(inputs)?;
    let input = inputs[0].clone();
    let key = PlanKey::new(PlanFamily::FieldReduce(op), &input, capabilities);
    plans.get_or_build(key, &mut || build(op, &input, &output, capabilities))
}

fn build(op: ReduceOp, input: &FieldType, output: &FieldType, capabilities: &DeviceCapabilities) -> Result<CompiledOperation> {
    let points = input.points();
    let elements = input.tensor_elements();
    let threads = reduction_threads(points, capabilities)?;
    let groups = points.div_ceil(threads).min(capabilities.compute_units.max(1) * GROUPS_PER_COMPUTE_UNIT);
    let name = format!("field_reduce_{op}_{}", shape_tag(input));
    debug!(kernel = %name, points, elements, threads, groups, "field reduction planned");

    let chained = groups > 1;
    let destination = if chained { "partial" } else { "out" };
    let accumulate = op.render("acc", "plane[i]");
    let combine = op.render("scratch[lid]", "scratch[lid + s]");
    let source = fill_template(
        TEMPLATE,
        &[
            ("points", points.to_string()),
            ("groups", groups.to_string()),
            ("elements", elements.to_string()),
            ("threads", threads.to_string()),
            ("name", name.clone()),
            ("destination", destination.to_string()),
            ("identity", op.identity_literal().to_string()),
            ("accumulate", accumulate),
            ("combine", combine),
        ],
    )?;

    let (slot, words) = if chained {
        (BufferSlot::Intermediate(0), groups * elements)
    } else {
        (BufferSlot::Output(0), output.layout().words())
    };
    let first = SynthesizedKernel {
        name: name.clone(),
        source,
        buffer_args: vec![
            BufferArg {
                index: 0,
                name: "in".into(),
                slot: BufferSlot::Input(0),
                words: input.layout().words(),
                is_output: false,
            },
            BufferArg { index: 1, name: destination.into(), slot, words, is_output: true },
        ],
        mode: AddressingMode::SmallTensor,
        workgroup: WorkGroupParameters::for_workgroup_grid(groups, elements, threads),
        local_memory_bytes: threads * size_of::<f32>(),
        program: Arc::new(FieldReduceProgram { op, points, groups, elements }),
    };

    if !chained {
        return Ok(CompiledOperation::single(first, output.clone()));
    }

    let finish = block_reduce::kernel(
        format!("{name}_finish"),
        op,
        groups,
        elements,
        BufferSlot::Intermediate(0),
        (BufferSlot::Output(0), output.layout().words()),
        capabilities,
    )?;
    Ok(CompiledOperation {
        name,
        output: output.clone(),
        stages: smallvec::smallvec![first, finish],
        intermediates: smallvec::smallvec![groups * elements],
    })
}

#[derive(Debug)]
struct FieldReduceProgram {
    op: ReduceOp,
    points: usize,
    groups: usize,
    elements: usize,
}

impl Program for FieldReduceProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let input = inputs[0];
        let destination = &mut *outputs[0];
        let threads = workgroup.local_threads();
        let stride = self.groups * threads;
        let mut scratch = vec![0.0f32; threads];

        for element in 0..self.elements {
            let plane = &input[element * self.points..(element + 1) * self.points];
            for group in 0..self.groups {
                for (lid, slot) in scratch.iter_mut().enumerate() {
                    let mut acc = self.op.identity();
                    for i in (group * threads + lid..self.points).step_by(stride) {
                        acc = self.op.combine(acc, plane[i]);
                    }
                    *slot = acc;
                }
                destination[group * self.elements + element] = tree_reduce(&mut scratch, self.op);
            }
        }
        Ok(())
    }
}
