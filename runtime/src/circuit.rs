//! Kernel circuit: abstract kernels and the virtual registers between them.
//!
//! Kernels and registers live in arenas indexed by [`KernelId`] and
//! [`RegisterId`]. Every register has exactly one producer; recurrence
//! bindings are kept apart from the dependency edges, so feedback through a
//! recurrence never forms a cycle.

use std::collections::VecDeque;

use snafu::{OptionExt, ensure};
use weft_codegen::Opcode;
use weft_dtype::FieldType;

use crate::error::{CycleSnafu, Result, UnknownKernelSnafu, UnknownRegisterSnafu};
use crate::kernel::KernelStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("k{_0}")]
pub struct KernelId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("r{_0}")]
pub struct RegisterId(pub usize);

/// Where a kernel runs and how the scheduler treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum KernelKind {
    /// Synthesized kernel executed on the accelerator.
    Device,
    /// Application computation on host memory.
    Host,
    Sensor,
    Actuator,
    /// Initial values written at reset.
    Constant,
    /// Placeholder producing a recurrence register; its value is latched.
    Recurrence,
}

impl KernelKind {
    pub fn from_opcode(opcode: &Opcode) -> Self {
        match opcode {
            Opcode::Constant => Self::Constant,
            Opcode::Sensor { .. } => Self::Sensor,
            Opcode::Actuator { .. } => Self::Actuator,
            Opcode::Host { .. } => Self::Host,
            Opcode::Recurrence => Self::Recurrence,
            _ => Self::Device,
        }
    }
}

/// Typed output slot of one kernel.
#[derive(Debug, Clone)]
pub struct VirtualFieldRegister {
    pub id: RegisterId,
    pub name: String,
    pub field_type: FieldType,
    pub producer: KernelId,
    pub consumers: Vec<KernelId>,
}

#[derive(Debug)]
pub struct AbstractKernel {
    pub id: KernelId,
    pub opcode: Opcode,
    pub kind: KernelKind,
    pub inputs: Vec<RegisterId>,
    pub outputs: Vec<RegisterId>,
    pub strategy: Box<dyn KernelStrategy>,
}

/// Recurrence register and the register that drives it, once bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceBinding {
    pub register: RegisterId,
    pub driver: Option<RegisterId>,
}

#[derive(Debug, Default)]
pub struct Circuit {
    kernels: Vec<AbstractKernel>,
    registers: Vec<VirtualFieldRegister>,
    recurrences: Vec<RecurrenceBinding>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kernel producing one register per entry of `outputs` (name, type).
    ///
    /// Inputs must already exist, so kernels are always added after their
    /// producers.
    pub fn add_kernel(
        &mut self,
        opcode: Opcode,
        inputs: &[RegisterId],
        outputs: Vec<(String, FieldType)>,
        strategy: Box<dyn KernelStrategy>,
    ) -> Result<KernelId> {
        for &input in inputs {
            self.register(input)?;
        }
        let id = KernelId(self.kernels.len());
        for &input in inputs {
            let consumers = &mut self.registers[input.0].consumers;
            if !consumers.contains(&id) {
                consumers.push(id);
            }
        }

        let mut output_ids = Vec::with_capacity(outputs.len());
        for (name, field_type) in outputs {
            let register = RegisterId(self.registers.len());
            self.registers.push(VirtualFieldRegister { id: register, name, field_type, producer: id, consumers: Vec::new() });
            output_ids.push(register);
        }

        let kind = KernelKind::from_opcode(&opcode);
        if kind == KernelKind::Recurrence {
            for &register in &output_ids {
                self.recurrences.push(RecurrenceBinding { register, driver: None });
            }
        }
        self.kernels.push(AbstractKernel { id, opcode, kind, inputs: inputs.to_vec(), outputs: output_ids, strategy });
        Ok(id)
    }

    pub fn kernel(&self, id: KernelId) -> Result<&AbstractKernel> {
        self.kernels.get(id.0).context(UnknownKernelSnafu { id })
    }

    pub fn register(&self, id: RegisterId) -> Result<&VirtualFieldRegister> {
        self.registers.get(id.0).context(UnknownRegisterSnafu { id })
    }

    pub fn kernels(&self) -> &[AbstractKernel] {
        &self.kernels
    }

    pub fn kernels_mut(&mut self) -> &mut [AbstractKernel] {
        &mut self.kernels
    }

    pub fn registers(&self) -> &[VirtualFieldRegister] {
        &self.registers
    }

    pub fn recurrences(&self) -> &[RecurrenceBinding] {
        &self.recurrences
    }

    pub(crate) fn recurrence_mut(&mut self, register: RegisterId) -> Option<&mut RecurrenceBinding> {
        self.recurrences.iter_mut().find(|binding| binding.register == register)
    }

    /// Kernels in dependency order; the same circuit always yields the same order.
    pub fn topological_order(&self) -> Result<Vec<KernelId>> {
        let mut in_degree: Vec<usize> = self.kernels.iter().map(|kernel| kernel.inputs.len()).collect();
        let mut ready: VecDeque<KernelId> =
            self.kernels.iter().filter(|kernel| kernel.inputs.is_empty()).map(|kernel| kernel.id).collect();
        let mut order = Vec::with_capacity(self.kernels.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &output in &self.kernels[id.0].outputs {
                for &consumer in &self.registers[output.0].consumers {
                    // One decrement per input slot fed by this register.
                    let uses = self.kernels[consumer.0].inputs.iter().filter(|&&input| input == output).count();
                    in_degree[consumer.0] -= uses;
                    if in_degree[consumer.0] == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }

        let remaining = self.kernels.len() - order.len();
        ensure!(remaining == 0, CycleSnafu { remaining });
        Ok(order)
    }
}
