//! Run-time field register: a buffer pair plus cycle bookkeeping.

use snafu::{ResultExt, ensure};
use weft_device::{FieldBuffer, MemorySide};
use weft_dtype::FieldType;

use crate::circuit::RegisterId;
use crate::error::{DeviceSnafu, Result, ValueCountSnafu};

#[derive(Debug)]
pub struct FieldRegister {
    id: RegisterId,
    name: String,
    buffer: FieldBuffer,
    /// Cycle whose clock last advanced the contents.
    last_update: Option<u64>,
    /// Producer had nothing new this cycle.
    skip: bool,
}

impl FieldRegister {
    pub fn new(id: RegisterId, name: impl Into<String>, buffer: FieldBuffer) -> Self {
        Self { id, name: name.into(), buffer, last_update: None, skip: false }
    }

    pub fn id(&self) -> RegisterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        self.buffer.field_type()
    }

    pub fn buffer(&self) -> &FieldBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut FieldBuffer {
        &mut self.buffer
    }

    pub fn last_update(&self) -> Option<u64> {
        self.last_update
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Set whether the producer has new contents this cycle.
    ///
    /// Only the last assignment before the clock counts.
    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    /// Make `side` current before a consumer reads it.
    pub fn sync(&mut self, side: MemorySide) -> Result<()> {
        self.buffer.sync(side).context(DeviceSnafu)
    }

    pub fn read_host(&mut self) -> Result<Vec<f32>> {
        self.buffer.read_host().context(DeviceSnafu)
    }

    pub fn write_host(&mut self, values: &[f32]) -> Result<()> {
        let expected = self.buffer.len();
        ensure!(
            values.len() == expected,
            ValueCountSnafu { register: self.name.clone(), expected, actual: values.len() }
        );
        self.buffer.write_host(values).context(DeviceSnafu)
    }

    /// End-of-cycle bookkeeping: a skipped register keeps its last-update cycle.
    pub fn clock(&mut self, cycle: u64) {
        if self.skip {
            self.skip = false;
        } else {
            self.last_update = Some(cycle);
        }
    }

    /// Forget cycle history; contents are left to the producer's reset.
    pub fn reset(&mut self) {
        self.last_update = None;
        self.skip = false;
    }
}
