//! Plan keys and the store synthesized plans are memoised in.

use std::sync::Arc;

use weft_device::DeviceCapabilities;
use weft_dtype::FieldType;

use crate::error::Result;
use crate::opcode::{FftDirection, ReduceOp};
use crate::types::CompiledOperation;

/// Operation family a plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum PlanFamily {
    FieldReduce(ReduceOp),
    FilterAdjoint,
    Fft(FftDirection),
}

/// Operand geometry plus device capability identifying a reusable plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub family: PlanFamily,
    pub field_type: FieldType,
    /// Literal parameter of the family (filter size); 0 when unused.
    pub parameter: usize,
    pub capabilities: DeviceCapabilities,
}

impl PlanKey {
    pub fn new(family: PlanFamily, field_type: &FieldType, capabilities: &DeviceCapabilities) -> Self {
        Self { family, field_type: field_type.clone(), parameter: 0, capabilities: *capabilities }
    }

    pub fn with_parameter(mut self, parameter: usize) -> Self {
        self.parameter = parameter;
        self
    }
}

/// Lookup-or-create storage for plans.
///
/// Implementations must build each key at most once and hand every caller
/// the same shared plan.
pub trait PlanStore: Send + Sync {
    fn get_or_build(
        &self,
        key: PlanKey,
        build: &mut dyn FnMut() -> Result<CompiledOperation>,
    ) -> Result<Arc<CompiledOperation>>;
}

/// Store that builds on every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncached;

impl PlanStore for Uncached {
    fn get_or_build(
        &self,
        _key: PlanKey,
        build: &mut dyn FnMut() -> Result<CompiledOperation>,
    ) -> Result<Arc<CompiledOperation>> {
        build().map(Arc::new)
    }
}
