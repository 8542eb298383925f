use std::fmt;

use crate::error::Result;
use crate::workgroup::WorkGroupParameters;

/// Host execution of a synthesized kernel.
///
/// A program carries out the same decomposition as the kernel's source text:
/// the same launch geometry, local-memory layout, barrier phases and
/// reduction order. Inputs and outputs arrive in binding order.
pub trait Program: Send + Sync + fmt::Debug {
    fn execute(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], workgroup: &WorkGroupParameters) -> Result<()>;
}
