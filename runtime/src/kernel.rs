//! Kernel strategies: what a kernel does when the scheduler invokes it.
//!
//! Every [`AbstractKernel`](crate::circuit::AbstractKernel) pairs an opcode
//! with one strategy object. The scheduler hands a strategy its input and
//! output registers through [`KernelIo`], after making the side the kernel
//! kind reads from current.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use strum::IntoEnumIterator;
use tracing::{debug, trace};
use weft_codegen::{CompiledOperation, Opcode, synthesize};
use weft_device::{Buffer, Encoding, MemorySide};
use weft_dtype::{ElementKind, FieldType, Shape};

use crate::checkpoint::{Persistent, Restorer, Saver, Version};
use crate::circuit::RegisterId;
use crate::context::{ConstructionContext, Environment};
use crate::error::{
    CodegenSnafu, DeviceSnafu, FieldKindSnafu, FieldTypeSnafu, NotCopyableSnafu, Result, ValueCountSnafu,
};
use crate::rate::RateSynchronizer;
use crate::register::FieldRegister;
use crate::sensor::{Actuator, Sensor};

pub const CONSTANT_TAG: &str = "constant";
pub const CONSTANT_VERSION: Version = Version::new(1, 0);
pub const DEVICE_TAG: &str = "device";
pub const DEVICE_VERSION: Version = Version::new(1, 0);

/// Registers a kernel reads and writes during one invocation.
pub struct KernelIo<'a> {
    pub cycle: u64,
    inputs: Vec<Ref<'a, FieldRegister>>,
    outputs: Vec<RefMut<'a, FieldRegister>>,
}

impl<'a> KernelIo<'a> {
    pub fn new(cycle: u64, inputs: Vec<Ref<'a, FieldRegister>>, outputs: Vec<RefMut<'a, FieldRegister>>) -> Self {
        Self { cycle, inputs, outputs }
    }

    pub fn input(&self, index: usize) -> &FieldRegister {
        &self.inputs[index]
    }

    pub fn inputs(&self) -> impl Iterator<Item = &FieldRegister> {
        self.inputs.iter().map(|input| &**input)
    }

    pub fn output(&mut self, index: usize) -> &mut FieldRegister {
        &mut self.outputs[index]
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut FieldRegister> {
        self.outputs.iter_mut().map(|output| &mut **output)
    }

    /// Host contents of input `index`; the scheduler made the host side current.
    pub fn input_values(&self, index: usize) -> Result<Vec<f32>> {
        self.inputs[index].buffer().side(MemorySide::Host).read_f32().context(DeviceSnafu)
    }
}

pub trait KernelStrategy: fmt::Debug {
    /// Produce this cycle's outputs.
    fn compute(&mut self, io: &mut KernelIo<'_>) -> Result<()>;

    /// Restore initial state; called by every scheduler reset.
    fn reset(&mut self, _io: &mut KernelIo<'_>) -> Result<()> {
        Ok(())
    }

    /// Types of the registers this kernel drives.
    fn output_types(&self) -> Vec<FieldType>;

    /// Same kernel rebuilt for operands of different types.
    fn copy_with_new_inputs(&self, env: &Environment, inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>>;

    fn persistent(&self) -> Option<&dyn Persistent> {
        None
    }
}

/// Synthesized operation executed on the accelerator.
#[derive(Debug)]
pub struct DeviceStrategy {
    opcode: Opcode,
    operation: Arc<CompiledOperation>,
    intermediates: Vec<Buffer>,
}

impl DeviceStrategy {
    pub fn new(env: &Environment, opcode: Opcode, inputs: &[FieldType]) -> Result<Self> {
        let operation = synthesize(&opcode, inputs, env.capabilities(), env.plans()).context(CodegenSnafu)?;
        let intermediates = operation
            .intermediates
            .iter()
            .map(|&words| Buffer::allocate(Arc::clone(&env.device().accelerator), words, Encoding::F32))
            .collect::<Result<Vec<_>, _>>()
            .context(DeviceSnafu)?;
        for stage in &operation.stages {
            debug!(
                kernel = %stage.name,
                mode = ?stage.mode,
                global = ?stage.workgroup.global(),
                local = ?stage.workgroup.local(),
                "device kernel bound"
            );
        }
        Ok(Self { opcode, operation, intermediates })
    }

    pub fn operation(&self) -> &Arc<CompiledOperation> {
        &self.operation
    }
}

impl KernelStrategy for DeviceStrategy {
    fn compute(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        let inputs: SmallVec<[Buffer; 4]> = io.inputs().map(|input| input.buffer().master().clone()).collect();
        let outputs: SmallVec<[Buffer; 1]> =
            io.outputs_mut().map(|output| output.buffer_mut().write(MemorySide::Accelerator).clone()).collect();
        self.operation.execute(&inputs, &outputs, &self.intermediates).context(CodegenSnafu)
    }

    fn output_types(&self) -> Vec<FieldType> {
        vec![self.operation.output.clone()]
    }

    fn copy_with_new_inputs(&self, env: &Environment, inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        Ok(Box::new(Self::new(env, self.opcode.clone(), inputs)?))
    }

    fn persistent(&self) -> Option<&dyn Persistent> {
        Some(self)
    }
}

impl Persistent for DeviceStrategy {
    fn tag(&self) -> &'static str {
        DEVICE_TAG
    }

    fn version(&self) -> Version {
        DEVICE_VERSION
    }

    fn save(&self, saver: &mut dyn Saver) -> Result<()> {
        saver.write_string("opcode", &self.opcode.to_string())
    }
}

pub(crate) fn restore_device(
    restorer: &dyn Restorer,
    cx: &mut ConstructionContext,
    inputs: &[RegisterId],
) -> Result<Vec<RegisterId>> {
    let opcode: Opcode = restorer.read_string("opcode")?.parse().context(CodegenSnafu)?;
    Ok(vec![cx.operation(opcode, inputs)?])
}

/// Fixed values written at reset.
#[derive(Debug, Clone)]
pub struct ConstantStrategy {
    field_type: FieldType,
    values: Vec<f32>,
}

impl ConstantStrategy {
    pub fn new(name: &str, field_type: FieldType, values: Vec<f32>) -> Result<Self> {
        let expected = field_type.layout().words();
        ensure!(values.len() == expected, ValueCountSnafu { register: name, expected, actual: values.len() });
        Ok(Self { field_type, values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

impl KernelStrategy for ConstantStrategy {
    fn compute(&mut self, _io: &mut KernelIo<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        io.output(0).write_host(&self.values)
    }

    fn output_types(&self) -> Vec<FieldType> {
        vec![self.field_type.clone()]
    }

    fn copy_with_new_inputs(&self, _env: &Environment, _inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        Ok(Box::new(self.clone()))
    }

    fn persistent(&self) -> Option<&dyn Persistent> {
        Some(self)
    }
}

impl Persistent for ConstantStrategy {
    fn tag(&self) -> &'static str {
        CONSTANT_TAG
    }

    fn version(&self) -> Version {
        CONSTANT_VERSION
    }

    fn save(&self, saver: &mut dyn Saver) -> Result<()> {
        saver.write_string("field_shape", &join_extents(self.field_type.field_shape()))?;
        saver.write_string("tensor_shape", &join_extents(self.field_type.tensor_shape()))?;
        saver.write_string("element", &self.field_type.element().to_string())?;
        saver.write_float_array("values", &self.values)
    }
}

fn join_extents(shape: &Shape) -> String {
    shape.extents().iter().join(",")
}

fn parse_extents(name: &str, text: &str) -> Result<Shape> {
    let extents = text
        .split(',')
        .filter(|extent| !extent.is_empty())
        .map(|extent| extent.parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()
        .context(FieldKindSnafu { name, expected: "a list of extents" })?;
    Ok(Shape::new(&extents))
}

pub(crate) fn restore_constant(
    restorer: &dyn Restorer,
    cx: &mut ConstructionContext,
    _inputs: &[RegisterId],
) -> Result<Vec<RegisterId>> {
    let field_shape = parse_extents("field_shape", &restorer.read_string("field_shape")?)?;
    let tensor_shape = parse_extents("tensor_shape", &restorer.read_string("tensor_shape")?)?;
    let element_name = restorer.read_string("element")?;
    let element = ElementKind::iter()
        .find(|element| element.to_string() == element_name)
        .context(FieldKindSnafu { name: "element", expected: "an element kind" })?;
    let field_type = FieldType::new(field_shape, tensor_shape, element).context(FieldTypeSnafu)?;
    Ok(vec![cx.constant("constant", field_type, restorer.read_float_array("values")?)?])
}

/// External input, optionally paced and pipelined.
#[derive(Debug)]
pub struct SensorStrategy {
    field_type: FieldType,
    sensor: Box<dyn Sensor>,
    pacing: RateSynchronizer,
    /// Values fetched last cycle, published this cycle (pipelined sensors).
    staged: Option<Vec<f32>>,
}

impl SensorStrategy {
    pub fn new(field_type: FieldType, sensor: Box<dyn Sensor>) -> Self {
        let pacing = RateSynchronizer::new(sensor.desired_rate());
        Self { field_type, sensor, pacing, staged: None }
    }
}

impl KernelStrategy for SensorStrategy {
    fn compute(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        self.pacing.start();
        let fresh = if self.sensor.pipelined() {
            let published = self.staged.take();
            self.staged = self.sensor.next_values();
            published
        } else {
            self.sensor.next_values()
        };

        let cycle = io.cycle;
        let output = io.output(0);
        match fresh {
            Some(values) => {
                output.write_host(&values)?;
                output.set_skip(false);
            }
            None => {
                trace!(register = output.name(), cycle, "sensor produced nothing");
                output.set_skip(true);
            }
        }
        self.pacing.finish();
        Ok(())
    }

    fn reset(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        self.staged = None;
        self.pacing.reset();
        self.sensor.reset();
        let zeros = vec![0.0; self.field_type.layout().words()];
        io.output(0).write_host(&zeros)
    }

    fn output_types(&self) -> Vec<FieldType> {
        vec![self.field_type.clone()]
    }

    fn copy_with_new_inputs(&self, _env: &Environment, _inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        NotCopyableSnafu { kernel: "sensor" }.fail()
    }
}

#[derive(Debug)]
pub struct ActuatorStrategy {
    actuator: Box<dyn Actuator>,
}

impl ActuatorStrategy {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self { actuator }
    }
}

impl KernelStrategy for ActuatorStrategy {
    fn compute(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        self.actuator.consume(&io.input_values(0)?);
        Ok(())
    }

    fn reset(&mut self, _io: &mut KernelIo<'_>) -> Result<()> {
        self.actuator.reset();
        Ok(())
    }

    fn output_types(&self) -> Vec<FieldType> {
        Vec::new()
    }

    fn copy_with_new_inputs(&self, _env: &Environment, _inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        NotCopyableSnafu { kernel: "actuator" }.fail()
    }
}

/// Host computation over the host contents of every input.
pub type HostFn = Arc<dyn Fn(&[Vec<f32>]) -> Vec<f32> + Send + Sync>;

#[derive(Clone)]
pub struct HostStrategy {
    output: FieldType,
    function: HostFn,
}

impl fmt::Debug for HostStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStrategy").field("output", &self.output).finish_non_exhaustive()
    }
}

impl HostStrategy {
    pub fn new(output: FieldType, function: HostFn) -> Self {
        Self { output, function }
    }
}

impl KernelStrategy for HostStrategy {
    fn compute(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        let inputs = (0..io.inputs.len()).map(|index| io.input_values(index)).collect::<Result<Vec<_>>>()?;
        let values = (self.function)(&inputs);
        io.output(0).write_host(&values)
    }

    fn output_types(&self) -> Vec<FieldType> {
        vec![self.output.clone()]
    }

    fn copy_with_new_inputs(&self, _env: &Environment, _inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        Ok(Box::new(self.clone()))
    }
}

/// Producer of a recurrence register. Its contents come from the latch.
#[derive(Debug, Clone)]
pub struct RecurrenceStrategy {
    field_type: FieldType,
    initial: Option<Vec<f32>>,
}

impl RecurrenceStrategy {
    pub fn new(field_type: FieldType, initial: Option<Vec<f32>>) -> Self {
        Self { field_type, initial }
    }
}

impl KernelStrategy for RecurrenceStrategy {
    fn compute(&mut self, _io: &mut KernelIo<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self, io: &mut KernelIo<'_>) -> Result<()> {
        match &self.initial {
            Some(values) => io.output(0).write_host(values),
            None => io.output(0).write_host(&vec![0.0; self.field_type.layout().words()]),
        }
    }

    fn output_types(&self) -> Vec<FieldType> {
        vec![self.field_type.clone()]
    }

    fn copy_with_new_inputs(&self, _env: &Environment, _inputs: &[FieldType]) -> Result<Box<dyn KernelStrategy>> {
        Ok(Box::new(self.clone()))
    }
}
