//! Synthesized kernels and compiled operations.

use std::cell::{Ref, RefMut};
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tracing::trace;
use weft_device::Buffer;
use weft_dtype::FieldType;

use crate::addressing::AddressingMode;
use crate::error::{DeviceSnafu, LaunchSnafu, Result};
use crate::program::Program;
use crate::workgroup::WorkGroupParameters;

/// Which buffer of a compiled operation a kernel argument refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Input(usize),
    Output(usize),
    /// Scratch buffer owned by the operation, shared between its stages.
    Intermediate(usize),
}

/// Information about a buffer argument to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferArg {
    /// Argument index.
    pub index: usize,
    /// Parameter name in the kernel source.
    pub name: String,
    pub slot: BufferSlot,
    /// Expected length in `f32` words.
    pub words: usize,
    pub is_output: bool,
}

/// One kernel: source text, bindings, launch geometry and host program.
#[derive(Debug, Clone)]
pub struct SynthesizedKernel {
    pub name: String,
    pub source: String,
    pub buffer_args: Vec<BufferArg>,
    pub mode: AddressingMode,
    pub workgroup: WorkGroupParameters,
    /// Local memory used per workgroup.
    pub local_memory_bytes: usize,
    pub program: Arc<dyn Program>,
}

impl SynthesizedKernel {
    /// Run the kernel against the operation's buffers.
    pub fn launch(&self, inputs: &[Buffer], outputs: &[Buffer], intermediates: &[Buffer]) -> Result<()> {
        let mut reads: Vec<Ref<'_, [f32]>> = Vec::new();
        let mut writes: Vec<RefMut<'_, [f32]>> = Vec::new();

        for arg in &self.buffer_args {
            let (pool, index) = match arg.slot {
                BufferSlot::Input(i) => (inputs, i),
                BufferSlot::Output(i) => (outputs, i),
                BufferSlot::Intermediate(i) => (intermediates, i),
            };
            let Some(buffer) = pool.get(index) else {
                return LaunchSnafu { kernel: self.name.clone(), reason: format!("no buffer bound for {:?}", arg.slot) }
                    .fail();
            };
            ensure!(
                buffer.len() == arg.words,
                LaunchSnafu {
                    kernel: self.name.clone(),
                    reason: format!("{} expects {} words, bound buffer has {}", arg.name, arg.words, buffer.len()),
                }
            );
            if arg.is_output {
                writes.push(buffer.words_mut().context(DeviceSnafu)?);
            } else {
                reads.push(buffer.words().context(DeviceSnafu)?);
            }
        }

        let read_slices: Vec<&[f32]> = reads.iter().map(|r| &**r).collect();
        let mut write_slices: Vec<&mut [f32]> = writes.iter_mut().map(|w| &mut **w).collect();

        trace!(kernel = %self.name, global = ?self.workgroup.global(), local = ?self.workgroup.local(), "kernel launch");
        self.program.execute(&read_slices, &mut write_slices, &self.workgroup)
    }
}

/// The kernels implementing one operation, run in order.
///
/// Most operations compile to a single kernel; tiled reductions chain a
/// block-reduction kernel and transforms run one kernel per pass.
#[derive(Debug, Clone)]
pub struct CompiledOperation {
    pub name: String,
    pub output: FieldType,
    pub stages: SmallVec<[SynthesizedKernel; 2]>,
    /// Lengths in words of the scratch buffers the stages share.
    pub intermediates: SmallVec<[usize; 2]>,
}

impl CompiledOperation {
    pub fn single(kernel: SynthesizedKernel, output: FieldType) -> Self {
        Self { name: kernel.name.clone(), output, stages: smallvec::smallvec![kernel], intermediates: SmallVec::new() }
    }

    pub fn execute(&self, inputs: &[Buffer], outputs: &[Buffer], intermediates: &[Buffer]) -> Result<()> {
        ensure!(
            intermediates.len() == self.intermediates.len(),
            LaunchSnafu {
                kernel: self.name.clone(),
                reason: format!("expects {} intermediates, got {}", self.intermediates.len(), intermediates.len()),
            }
        );
        for stage in &self.stages {
            stage.launch(inputs, outputs, intermediates)?;
        }
        Ok(())
    }

    /// Concatenated source of every stage.
    pub fn source(&self) -> String {
        self.stages.iter().map(|stage| stage.source.as_str()).join("\n")
    }

    pub fn local_memory_bytes(&self) -> usize {
        self.stages.iter().map(|stage| stage.local_memory_bytes).max().unwrap_or(0)
    }
}
