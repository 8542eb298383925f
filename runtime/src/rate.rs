//! Pacing of I/O-bound kernels to a desired rate.

use std::time::{Duration, Instant};

use tracing::trace;

/// Paces a kernel so that consecutive cycles are `1 / rate` seconds apart.
///
/// Deadlines carry from one cycle to the next, so work done between two
/// paced calls (the rest of the step) counts against the budget. A cycle that
/// overruns its deadline is not delayed; the schedule restarts from that
/// point and falling behind is never an error.
#[derive(Debug, Clone)]
pub struct RateSynchronizer {
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl RateSynchronizer {
    /// Synchronizer for `rate` cycles per second; a non-positive rate never sleeps.
    pub fn new(rate: f64) -> Self {
        let period = (rate > 0.0 && rate.is_finite()).then(|| Duration::from_secs_f64(1.0 / rate));
        Self { period, deadline: None }
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Open the first window if none is running.
    pub fn start(&mut self) {
        if let (Some(period), None) = (self.period, self.deadline) {
            self.deadline = Some(Instant::now() + period);
        }
    }

    /// Sleep until the current deadline, then open the next window.
    ///
    /// Returns the time slept.
    pub fn finish(&mut self) -> Duration {
        let (Some(period), Some(deadline)) = (self.period, self.deadline) else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            self.deadline = Some(now + period);
        } else {
            trace!(?remaining, "pacing");
            std::thread::sleep(remaining);
            self.deadline = Some(deadline + period);
        }
        remaining
    }

    /// Forget the running schedule.
    pub fn reset(&mut self) {
        self.deadline = None;
    }
}
