//! Virtual tick clock.
//!
//! The [`TickClock`] counts discrete simulation ticks. It starts at zero and
//! only moves forward, one tick per engine step, so a run's timeline is
//! independent of host speed.

use serde::{Deserialize, Serialize};

/// Monotonic tick counter bounded by a run length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickClock {
    now: u64,
    run_length: u64,
}

impl TickClock {
    /// Create a clock at tick zero that runs for `run_length` ticks.
    pub fn new(run_length: u64) -> Self {
        Self { now: 0, run_length }
    }

    /// Last tick that has started (0 before the first step).
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn run_length(&self) -> u64 {
        self.run_length
    }

    /// Whether the configured run length has been reached.
    pub fn finished(&self) -> bool {
        self.now >= self.run_length
    }

    /// Start the next tick and return its number.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the run length has already been reached.
    pub fn advance(&mut self) -> u64 {
        debug_assert!(
            self.now < self.run_length,
            "Cannot advance past run length: now={}, run_length={}",
            self.now,
            self.run_length,
        );
        self.now += 1;
        self.now
    }
}
