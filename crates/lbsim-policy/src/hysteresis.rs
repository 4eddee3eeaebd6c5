//! Hysteresis scaling policy.
//!
//! Grows the pool when the queue holds more than `scale_up_factor` requests
//! per worker and shrinks it when the queue drops below `scale_down_factor`
//! per worker. Between the two thresholds lies a dead zone where nothing
//! happens, which keeps the pool from flapping on every tick.

use crate::traits::*;

/// Two-threshold queue-pressure controller.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    params: ScalingParams,
}

impl Hysteresis {
    pub fn new(params: ScalingParams) -> Self {
        debug_assert!(
            params.scale_down_factor <= params.scale_up_factor,
            "scale_down_factor ({}) must not exceed scale_up_factor ({})",
            params.scale_down_factor,
            params.scale_up_factor,
        );
        Self { params }
    }
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self::new(ScalingParams::default())
    }
}

impl ScalingPolicy for Hysteresis {
    fn evaluate(&mut self, pool: &PoolSnapshot) -> ScaleDecision {
        let queue = pool.queue_length as u64;
        let workers = pool.worker_count as u64;

        if queue > self.params.scale_up_factor as u64 * workers {
            ScaleDecision::ScaleUp
        } else if queue < self.params.scale_down_factor as u64 * workers
            && pool.worker_count > self.params.min_workers
        {
            ScaleDecision::ScaleDown
        } else {
            ScaleDecision::NoChange
        }
    }

    fn name(&self) -> &str {
        "hysteresis"
    }
}
