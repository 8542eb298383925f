//! External inputs and outputs of a circuit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Source of field values from outside the circuit.
pub trait Sensor: fmt::Debug {
    /// Values for this cycle, or `None` when nothing new arrived.
    fn next_values(&mut self) -> Option<Vec<f32>>;

    fn reset(&mut self) {}

    /// Cycles per second the sensor wants to be paced at; 0 is unconstrained.
    fn desired_rate(&self) -> f64 {
        0.0
    }

    /// Whether values fetched during cycle N are published in cycle N + 1.
    fn pipelined(&self) -> bool {
        false
    }
}

/// Sink for field values leaving the circuit.
pub trait Actuator: fmt::Debug {
    fn consume(&mut self, values: &[f32]);

    fn reset(&mut self) {}
}

/// Sensor replaying a fixed sequence of frames, then reporting nothing.
#[derive(Debug, Clone, Default)]
pub struct SequenceSensor {
    frames: Vec<Option<Vec<f32>>>,
    remaining: VecDeque<Option<Vec<f32>>>,
    rate: f64,
    pipelined: bool,
}

impl SequenceSensor {
    pub fn new(frames: impl IntoIterator<Item = Option<Vec<f32>>>) -> Self {
        let frames: Vec<_> = frames.into_iter().collect();
        Self { remaining: frames.iter().cloned().collect(), frames, rate: 0.0, pipelined: false }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pipelining(mut self) -> Self {
        self.pipelined = true;
        self
    }
}

impl Sensor for SequenceSensor {
    fn next_values(&mut self) -> Option<Vec<f32>> {
        self.remaining.pop_front().flatten()
    }

    /// Rewind to the first frame.
    fn reset(&mut self) {
        self.remaining = self.frames.iter().cloned().collect();
    }

    fn desired_rate(&self) -> f64 {
        self.rate
    }

    fn pipelined(&self) -> bool {
        self.pipelined
    }
}

/// Actuator recording every frame it consumes.
///
/// Clones share the same record, so a handle kept outside the circuit sees
/// what the circuit delivered.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    frames: Arc<Mutex<Vec<Vec<f32>>>>,
    resets: Arc<Mutex<usize>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<f32>> {
        self.frames.lock().clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock()
    }
}

impl Actuator for RecordingActuator {
    fn consume(&mut self, values: &[f32]) {
        self.frames.lock().push(values.to_vec());
    }

    fn reset(&mut self) {
        self.frames.lock().clear();
        *self.resets.lock() += 1;
    }
}
