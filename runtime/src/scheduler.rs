//! Synchronous scheduler.
//!
//! One step runs every kernel in dependency order, then latches all
//! recurrences at once, then advances each register's cycle bookkeeping.
//! Latching goes through a staging buffer per recurrence so that a recurrence
//! driven by another recurrence observes that register's value from before the
//! latch.

use std::cell::{Ref, RefCell};

use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, trace};
use weft_device::{FieldBuffer, MemorySide};

use crate::circuit::{Circuit, KernelId, KernelKind, RegisterId};
use crate::context::Environment;
use crate::error::{
    DeviceSnafu, MissingBindingSnafu, NotResetSnafu, RegisterInUseSnafu, Result, UnknownRegisterSnafu,
};
use crate::kernel::KernelIo;
use crate::register::FieldRegister;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SchedulerState {
    /// Built but never reset; stepping is refused.
    Unreset,
    Idle,
    Stepping,
}

/// Staged copy of a recurrence's driver.
#[derive(Debug)]
pub struct Latch {
    pub register: RegisterId,
    pub driver: Option<RegisterId>,
    pub staging: FieldBuffer,
}

#[derive(Debug)]
pub struct Scheduler {
    env: Environment,
    circuit: Circuit,
    order: Vec<KernelId>,
    registers: Vec<RefCell<FieldRegister>>,
    latches: Vec<Latch>,
    state: SchedulerState,
    cycle: u64,
}

/// Side of its inputs a kernel of `kind` reads.
fn input_side(kind: KernelKind) -> Option<MemorySide> {
    match kind {
        KernelKind::Device => Some(MemorySide::Accelerator),
        KernelKind::Host | KernelKind::Actuator => Some(MemorySide::Host),
        KernelKind::Sensor | KernelKind::Constant | KernelKind::Recurrence => None,
    }
}

fn kernel_io<'a>(
    registers: &'a [RefCell<FieldRegister>],
    inputs: &[RegisterId],
    outputs: &[RegisterId],
    cycle: u64,
) -> KernelIo<'a> {
    KernelIo::new(
        cycle,
        inputs.iter().map(|input| registers[input.0].borrow()).collect(),
        outputs.iter().map(|output| registers[output.0].borrow_mut()).collect(),
    )
}

impl Scheduler {
    pub(crate) fn new(
        env: Environment,
        circuit: Circuit,
        order: Vec<KernelId>,
        registers: Vec<RefCell<FieldRegister>>,
        latches: Vec<Latch>,
    ) -> Self {
        Self { env, circuit, order, registers, latches, state: SchedulerState::Unreset, cycle: 0 }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Kernels in the order every step runs them.
    pub fn order(&self) -> &[KernelId] {
        &self.order
    }

    /// Completed steps since the last reset.
    pub fn step_count(&self) -> u64 {
        self.cycle
    }

    /// Return to cycle 0: check bindings, then reset every kernel.
    pub fn reset(&mut self) -> Result<()> {
        for latch in &self.latches {
            ensure!(
                latch.driver.is_some(),
                MissingBindingSnafu { register: self.circuit.register(latch.register)?.name.clone() }
            );
        }

        for register in &self.registers {
            register.borrow_mut().reset();
        }
        for &id in &self.order {
            let kernel = &mut self.circuit.kernels_mut()[id.0];
            let mut io = kernel_io(&self.registers, &kernel.inputs, &kernel.outputs, 0);
            kernel.strategy.reset(&mut io)?;
        }

        self.cycle = 0;
        self.state = SchedulerState::Idle;
        debug!(kernels = self.order.len(), recurrences = self.latches.len(), "scheduler reset");
        Ok(())
    }

    /// Run one cycle.
    pub fn step(&mut self) -> Result<()> {
        ensure!(self.state != SchedulerState::Unreset, NotResetSnafu);
        self.state = SchedulerState::Stepping;
        let result = self.run_kernels().and_then(|()| self.latch());
        self.state = SchedulerState::Idle;
        result?;

        for register in &self.registers {
            register.borrow_mut().clock(self.cycle);
        }
        self.cycle += 1;
        Ok(())
    }

    /// Run `cycles` steps.
    pub fn run(&mut self, cycles: u64) -> Result<()> {
        (0..cycles).try_for_each(|_| self.step())
    }

    fn run_kernels(&mut self) -> Result<()> {
        let cycle = self.cycle;
        for &id in &self.order {
            let kernel = &mut self.circuit.kernels_mut()[id.0];
            if let Some(side) = input_side(kernel.kind) {
                for input in &kernel.inputs {
                    self.registers[input.0].borrow_mut().sync(side)?;
                }
            }
            let mut io = kernel_io(&self.registers, &kernel.inputs, &kernel.outputs, cycle);
            trace!(%id, opcode = %kernel.opcode, cycle, "kernel invoked");
            kernel.strategy.compute(&mut io)?;
        }
        Ok(())
    }

    fn latch(&mut self) -> Result<()> {
        for latch in &mut self.latches {
            if let Some(driver) = latch.driver {
                let mut driver = self.registers[driver.0].borrow_mut();
                latch.staging.latch_from(driver.buffer_mut()).context(DeviceSnafu)?;
            }
        }
        for latch in &mut self.latches {
            let mut register = self.registers[latch.register.0].borrow_mut();
            register.buffer_mut().latch_from(&mut latch.staging).context(DeviceSnafu)?;
        }
        Ok(())
    }

    fn slot(&self, id: RegisterId) -> Result<&RefCell<FieldRegister>> {
        self.registers.get(id.0).context(UnknownRegisterSnafu { id })
    }

    /// Host contents of `register`, transferring from the accelerator if needed.
    pub fn read(&self, register: RegisterId) -> Result<Vec<f32>> {
        let mut slot = self.slot(register)?.try_borrow_mut().ok().context(RegisterInUseSnafu { id: register })?;
        slot.read_host()
    }

    pub fn register(&self, register: RegisterId) -> Result<Ref<'_, FieldRegister>> {
        self.slot(register)?.try_borrow().ok().context(RegisterInUseSnafu { id: register })
    }
}
