//! Explicit construction context for kernel circuits.
//!
//! Every kernel is added through a [`ConstructionContext`], which owns the
//! circuit being built and the device and plan store its kernels are
//! synthesized against. Device kernels are synthesized as soon as they are
//! added, so configuration errors surface at construction.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;
use weft_codegen::{Opcode, PlanStore};
use weft_device::{Device, DeviceCapabilities};
use weft_dtype::FieldType;

use crate::checkpoint::{Saver, save_persistent};
use crate::circuit::{Circuit, KernelId, KernelKind, RegisterId};
use crate::config::RuntimeConfig;
use crate::error::{
    DeviceSnafu, DuplicateBindingSnafu, NotARecurrenceSnafu, RecurrenceTypeSnafu, Result, SelfBindingSnafu,
    ValueCountSnafu,
};
use crate::kernel::{
    ActuatorStrategy, ConstantStrategy, DeviceStrategy, HostStrategy, KernelStrategy, RecurrenceStrategy,
    SensorStrategy,
};
use crate::plan_cache::global_plan_cache;
use crate::register::FieldRegister;
use crate::scheduler::{Latch, Scheduler};
use crate::sensor::{Actuator, Sensor};

/// Device and plan store kernels are synthesized against.
#[derive(Clone)]
pub struct Environment {
    device: Arc<Device>,
    plans: Arc<dyn PlanStore>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").field("device", &self.device.spec).finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(device: Arc<Device>, plans: Arc<dyn PlanStore>) -> Self {
        Self { device, plans }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.device.capabilities
    }

    pub fn plans(&self) -> &dyn PlanStore {
        self.plans.as_ref()
    }
}

#[derive(Debug)]
pub struct ConstructionContext {
    env: Environment,
    circuit: Circuit,
}

impl ConstructionContext {
    /// Context on the configured device, sharing the process-wide plan cache.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        Ok(Self::with_environment(Environment::new(config.device()?, global_plan_cache())))
    }

    pub fn with_environment(env: Environment) -> Self {
        Self { env, circuit: Circuit::new() }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn field_type(&self, register: RegisterId) -> Result<&FieldType> {
        Ok(&self.circuit.register(register)?.field_type)
    }

    fn input_types(&self, inputs: &[RegisterId]) -> Result<Vec<FieldType>> {
        inputs.iter().map(|&input| self.field_type(input).cloned()).collect()
    }

    fn add(
        &mut self,
        opcode: Opcode,
        inputs: &[RegisterId],
        name: Option<String>,
        strategy: Box<dyn KernelStrategy>,
    ) -> Result<KernelId> {
        let first = self.circuit.registers().len();
        let outputs = strategy
            .output_types()
            .into_iter()
            .enumerate()
            .map(|(i, field_type)| {
                let name = match (&name, i) {
                    (Some(name), 0) => name.clone(),
                    (Some(name), _) => format!("{name}.{i}"),
                    (None, _) => format!("{}{}", opcode.name(), first + i),
                };
                (name, field_type)
            })
            .collect();
        let kernel = self.circuit.add_kernel(opcode, inputs, outputs, strategy)?;
        debug!(%kernel, inputs = inputs.len(), "kernel added");
        Ok(kernel)
    }

    /// Single output register of `kernel`.
    fn output_of(&self, kernel: KernelId) -> Result<RegisterId> {
        Ok(self.circuit.kernel(kernel)?.outputs[0])
    }

    pub fn constant(&mut self, name: impl Into<String>, field_type: FieldType, values: Vec<f32>) -> Result<RegisterId> {
        let name = name.into();
        let strategy = ConstantStrategy::new(&name, field_type, values)?;
        let kernel = self.add(Opcode::Constant, &[], Some(name), Box::new(strategy))?;
        self.output_of(kernel)
    }

    pub fn sensor(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
        sensor: impl Sensor + 'static,
    ) -> Result<RegisterId> {
        let name = name.into();
        let strategy = SensorStrategy::new(field_type, Box::new(sensor));
        let kernel = self.add(Opcode::Sensor { name: name.clone() }, &[], Some(name), Box::new(strategy))?;
        self.output_of(kernel)
    }

    pub fn actuator(
        &mut self,
        name: impl Into<String>,
        input: RegisterId,
        actuator: impl Actuator + 'static,
    ) -> Result<KernelId> {
        let name = name.into();
        let strategy = ActuatorStrategy::new(Box::new(actuator));
        self.add(Opcode::Actuator { name: name.clone() }, &[input], Some(name), Box::new(strategy))
    }

    /// Host computation from the host contents of `inputs` to a field of type `output`.
    pub fn host(
        &mut self,
        name: impl Into<String>,
        inputs: &[RegisterId],
        output: FieldType,
        function: impl Fn(&[Vec<f32>]) -> Vec<f32> + Send + Sync + 'static,
    ) -> Result<RegisterId> {
        let name = name.into();
        let strategy = HostStrategy::new(output, Arc::new(function));
        let kernel = self.add(Opcode::Host { name: name.clone() }, inputs, Some(name), Box::new(strategy))?;
        self.output_of(kernel)
    }

    /// Recurrence register starting at zero.
    pub fn recurrence(&mut self, name: impl Into<String>, field_type: FieldType) -> Result<RegisterId> {
        let strategy = RecurrenceStrategy::new(field_type, None);
        let kernel = self.add(Opcode::Recurrence, &[], Some(name.into()), Box::new(strategy))?;
        self.output_of(kernel)
    }

    /// Recurrence register starting at `initial`.
    pub fn recurrence_with(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
        initial: Vec<f32>,
    ) -> Result<RegisterId> {
        let name = name.into();
        let expected = field_type.layout().words();
        ensure!(initial.len() == expected, ValueCountSnafu { register: name, expected, actual: initial.len() });
        let strategy = RecurrenceStrategy::new(field_type, Some(initial));
        let kernel = self.add(Opcode::Recurrence, &[], Some(name), Box::new(strategy))?;
        self.output_of(kernel)
    }

    /// Synthesize `opcode` over `inputs` and add it as a device kernel.
    pub fn operation(&mut self, opcode: Opcode, inputs: &[RegisterId]) -> Result<RegisterId> {
        self.device_kernel(None, opcode, inputs)
    }

    pub fn named_operation(
        &mut self,
        name: impl Into<String>,
        opcode: Opcode,
        inputs: &[RegisterId],
    ) -> Result<RegisterId> {
        self.device_kernel(Some(name.into()), opcode, inputs)
    }

    fn device_kernel(&mut self, name: Option<String>, opcode: Opcode, inputs: &[RegisterId]) -> Result<RegisterId> {
        let types = self.input_types(inputs)?;
        let strategy = DeviceStrategy::new(&self.env, opcode.clone(), &types)?;
        let kernel = self.add(opcode, inputs, name, Box::new(strategy))?;
        self.output_of(kernel)
    }

    /// Make `driver`'s end-of-cycle value the next cycle's value of `recurrence`.
    pub fn bind_recurrence(&mut self, recurrence: RegisterId, driver: RegisterId) -> Result<()> {
        let register = self.circuit.register(recurrence)?;
        let name = register.name.clone();
        let expected = register.field_type.clone();
        let actual = self.circuit.register(driver)?.field_type.clone();

        ensure!(recurrence != driver, SelfBindingSnafu { register: name.clone() });
        ensure!(expected == actual, RecurrenceTypeSnafu { register: name.clone(), expected, actual });
        let binding = self.circuit.recurrence_mut(recurrence).context(NotARecurrenceSnafu { register: name.clone() })?;
        ensure!(binding.driver.is_none(), DuplicateBindingSnafu { register: name });
        binding.driver = Some(driver);
        Ok(())
    }

    /// Add a copy of `kernel` reading `inputs` instead of its original operands.
    pub fn copy_kernel(&mut self, kernel: KernelId, inputs: &[RegisterId]) -> Result<KernelId> {
        let types = self.input_types(inputs)?;
        let original = self.circuit.kernel(kernel)?;
        let opcode = original.opcode.clone();
        let strategy = original.strategy.copy_with_new_inputs(&self.env, &types)?;
        self.add(opcode, inputs, None, strategy)
    }

    /// Producer of `register`.
    pub fn producer(&self, register: RegisterId) -> Result<KernelId> {
        Ok(self.circuit.register(register)?.producer)
    }

    /// Save `kernel`'s parameters; returns whether it has any.
    pub fn save_kernel(&self, kernel: KernelId, saver: &mut dyn Saver) -> Result<bool> {
        match self.circuit.kernel(kernel)?.strategy.persistent() {
            Some(persistent) => save_persistent(persistent, saver).map(|()| true),
            None => Ok(false),
        }
    }

    /// Allocate every register and hand the circuit to a scheduler.
    pub fn build(self) -> Result<Scheduler> {
        let Self { env, circuit } = self;
        let order = circuit.topological_order()?;
        let device = Arc::clone(env.device());

        let registers = circuit
            .registers()
            .iter()
            .map(|register| {
                let buffer = device.field_buffer(&register.field_type).context(DeviceSnafu)?;
                Ok(RefCell::new(FieldRegister::new(register.id, register.name.clone(), buffer)))
            })
            .collect::<Result<Vec<_>>>()?;

        let latches = circuit
            .recurrences()
            .iter()
            .map(|binding| {
                let field_type = &circuit.register(binding.register)?.field_type;
                let staging = device.field_buffer(field_type).context(DeviceSnafu)?;
                Ok(Latch { register: binding.register, driver: binding.driver, staging })
            })
            .collect::<Result<Vec<_>>>()?;

        let devices = circuit.kernels().iter().filter(|kernel| kernel.kind == KernelKind::Device).count();
        debug!(kernels = order.len(), devices, registers = registers.len(), "circuit built");
        Ok(Scheduler::new(env, circuit, order, registers, latches))
    }
}
