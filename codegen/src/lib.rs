//! Kernel synthesis for weft field operations.
//!
//! This crate turns an opcode and the field types of its operands into
//! accelerator kernels: OpenCL-C source text together with the launch
//! geometry and a host program executing the same decomposition.
//!
//! # Architecture
//!
//! - **Addressing**: thread-to-data mapping chosen from the operand types
//! - **Workgroup**: global/local launch sizes
//! - **Source**: geometry macros, templates and line-oriented assembly
//! - **Synth**: per-operation synthesizers, from point-wise arithmetic to
//!   tiled reductions and Fourier transforms
//! - **Plan**: keys and the store that memoises expensive plans
//!
//! # Usage
//!
//! ```ignore
//! use weft_codegen::{Opcode, ReduceOp, Uncached, synthesize};
//!
//! let op = synthesize(&Opcode::FieldReduce(ReduceOp::Sum), &[input], &caps, &Uncached)?;
//! op.execute(&[input_buffer], &[output_buffer], &intermediates)?;
//! ```

pub mod addressing;
pub mod error;
pub mod opcode;
pub mod plan;
pub mod program;
pub mod source;
pub mod synth;
pub mod types;
pub mod workgroup;

#[cfg(test)]
pub mod test;

pub use addressing::{AddressingMode, MAX_SMALL_TENSOR_ELEMENTS, OpClass, select_addressing, select_addressing_for};
pub use error::*;
pub use opcode::{BinaryOp, BorderPolicy, FftDirection, Opcode, ReduceOp, UnaryOp};
pub use plan::{PlanFamily, PlanKey, PlanStore, Uncached};
pub use program::Program;
pub use synth::{output_type, synthesize};
pub use types::*;
pub use workgroup::WorkGroupParameters;
