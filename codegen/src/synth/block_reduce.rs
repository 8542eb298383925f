//! Generic block reduction.
//!
//! Finishes a reduction left unfinished by a tiled kernel: the input holds
//! `groups` rows of `width` partial results, and the output receives the
//! reduction of every column. One workgroup reduces one column with a
//! halving binary tree in local memory.

use std::sync::Arc;

use snafu::ensure;
use weft_device::DeviceCapabilities;

use crate::addressing::AddressingMode;
use crate::error::{LocalMemoryExhaustedSnafu, Result};
use crate::opcode::ReduceOp;
use crate::program::Program;
use crate::source::fill_template;
use crate::types::{BufferArg, BufferSlot, SynthesizedKernel};
use crate::workgroup::WorkGroupParameters;

/// Largest thread count used by reduction kernels.
pub const MAX_REDUCTION_THREADS: usize = 256;

const TEMPLATE: &str = r#"#define GROUPS %groups%
#define WIDTH %width%

__kernel __attribute__((reqd_work_group_size(%threads%, 1, 1)))
void %name%(__global const float* restrict partial, __global float* restrict out) {
    __local float scratch[%threads%];
    const int lid = get_local_id(0);
    const int column = get_group_id(0);

    float acc = %identity%;
    for (int g = lid; g < GROUPS; g += %threads%)
        acc = %accumulate%;
    scratch[lid] = acc;
    barrier(CLK_LOCAL_MEM_FENCE);

    for (int s = %threads% / 2; s > 0; s >>= 1) {
        if (lid < s)
            scratch[lid] = %combine%;
        barrier(CLK_LOCAL_MEM_FENCE);
    }
    if (lid == 0)
        out[column] = scratch[0];
}
"#;

/// Largest power of two not above `value` (1 for 0).
pub(crate) fn floor_power_of_two(value: usize) -> usize {
    if value <= 1 { 1 } else { 1 << (usize::BITS - 1 - value.leading_zeros()) }
}

/// Thread count for a tree over `items` values: a power of two covering the
/// items, limited by the device and by local memory.
pub(crate) fn reduction_threads(items: usize, capabilities: &DeviceCapabilities) -> Result<usize> {
    let limit = floor_power_of_two(capabilities.max_workgroup_size.min(MAX_REDUCTION_THREADS));
    let threads = items.max(1).next_power_of_two().min(limit);
    let required = threads * size_of::<f32>();
    ensure!(
        required <= capabilities.local_memory_bytes,
        LocalMemoryExhaustedSnafu {
            operation: "block reduce",
            required,
            available: capabilities.local_memory_bytes
        }
    );
    Ok(threads)
}

/// Halving tree over a power-of-two scratch array; the result lands in slot 0.
pub(crate) fn tree_reduce(scratch: &mut [f32], op: ReduceOp) -> f32 {
    let mut s = scratch.len() / 2;
    while s > 0 {
        for lid in 0..s {
            scratch[lid] = op.combine(scratch[lid], scratch[lid + s]);
        }
        s /= 2;
    }
    scratch[0]
}

/// Kernel reducing `groups x width` partials from `input` into the first
/// `width` words of `output`.
pub(crate) fn kernel(
    name: String,
    op: ReduceOp,
    groups: usize,
    width: usize,
    input: BufferSlot,
    output: (BufferSlot, usize),
    capabilities: &DeviceCapabilities,
) -> Result<SynthesizedKernel> {
    let threads = reduction_threads(groups, capabilities)?;
    let accumulate = op.render("acc", "partial[g * WIDTH + column]");
    let combine = op.render("scratch[lid]", "scratch[lid + s]");
    let source = fill_template(
        TEMPLATE,
        &[
            ("groups", groups.to_string()),
            ("width", width.to_string()),
            ("threads", threads.to_string()),
            ("name", name.clone()),
            ("identity", op.identity_literal().to_string()),
            ("accumulate", accumulate),
            ("combine", combine),
        ],
    )?;

    Ok(SynthesizedKernel {
        name,
        source,
        buffer_args: vec![
            BufferArg { index: 0, name: "partial".into(), slot: input, words: groups * width, is_output: false },
            BufferArg { index: 1, name: "out".into(), slot: output.0, words: output.1, is_output: true },
        ],
        mode: AddressingMode::SmallTensor,
        workgroup: WorkGroupParameters::for_workgroups(width, threads),
        local_memory_bytes: threads * size_of::<f32>(),
        program: Arc::new(BlockReduceProgram { op, groups, width }),
    })
}

#[derive(Debug)]
struct BlockReduceProgram {
    op: ReduceOp,
    groups: usize,
    width: usize,
}

impl Program for BlockReduceProgram {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()> {
        let partial = inputs[0];
        let out = &mut *outputs[0];
        let threads = workgroup.local_threads();
        let mut scratch = vec![0.0f32; threads];

        for column in 0..workgroup.group_count().min(self.width) {
            for (lid, slot) in scratch.iter_mut().enumerate() {
                let mut acc = self.op.identity();
                for g in (lid..self.groups).step_by(threads) {
                    acc = self.op.combine(acc, partial[g * self.width + column]);
                }
                *slot = acc;
            }
            out[column] = tree_reduce(&mut scratch, self.op);
        }
        Ok(())
    }
}
