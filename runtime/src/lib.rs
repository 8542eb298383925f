//! Synchronous execution of weft kernel circuits.
//!
//! A circuit is built through a [`ConstructionContext`]: constants, sensors,
//! recurrences and synthesized device operations are added one kernel at a
//! time and wired through virtual field registers. [`ConstructionContext::build`]
//! allocates a master/slave buffer pair per register and returns a
//! [`Scheduler`] that steps the circuit deterministically.
//!
//! # Plan cache
//!
//! Expensive plans (Fourier transforms, tiled reductions) are shared through
//! [`PlanCache`], a concurrent map computing each key once.
//!
//! # Example
//!
//! ```ignore
//! let mut cx = ConstructionContext::new(&RuntimeConfig::from_env()?)?;
//! let state = cx.recurrence("state", FieldType::scalar(&[64, 64])?)?;
//! let next = cx.operation(Opcode::Offset(1.0), &[state])?;
//! cx.bind_recurrence(state, next)?;
//!
//! let mut scheduler = cx.build()?;
//! scheduler.reset()?;
//! scheduler.run(10)?;
//! ```

pub mod checkpoint;
pub mod circuit;
pub mod config;
pub mod context;
pub mod error;
pub mod kernel;
pub mod plan_cache;
pub mod rate;
pub mod register;
pub mod scheduler;
pub mod sensor;

#[cfg(test)]
pub mod test;

pub use checkpoint::{MemoryCheckpoint, Persistent, RestoreFn, RestoreRegistry, Restorer, Saver, Version};
pub use circuit::{AbstractKernel, Circuit, KernelId, KernelKind, RecurrenceBinding, RegisterId, VirtualFieldRegister};
pub use config::RuntimeConfig;
pub use context::{ConstructionContext, Environment};
pub use error::*;
pub use kernel::{KernelIo, KernelStrategy};
pub use plan_cache::{PlanCache, global_plan_cache};
pub use rate::RateSynchronizer;
pub use register::FieldRegister;
pub use scheduler::{Scheduler, SchedulerState};
pub use sensor::{Actuator, RecordingActuator, Sensor, SequenceSensor};
