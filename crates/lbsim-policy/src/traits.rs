//! Scaling policy trait definitions.
//!
//! All autoscaling policies implement the [`ScalingPolicy`] trait, which
//! receives a read-only view of the worker pool and returns a
//! [`ScaleDecision`]. Cooldown accounting stays with the engine: a policy is
//! only consulted on ticks where a scaling action is permitted.

use serde::{Deserialize, Serialize};

/// Read-only view of the worker pool, taken after the dispatch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Tick the snapshot was taken at.
    pub tick: u64,
    /// Workers currently in the pool.
    pub worker_count: u32,
    /// Requests waiting in the pending queue.
    pub queue_length: usize,
}

/// Decision returned by a scaling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDecision {
    /// Append one worker to the pool.
    ScaleUp,
    /// Remove the most recently added worker.
    ScaleDown,
    /// Leave the pool as it is.
    NoChange,
}

/// Queue-pressure thresholds, expressed as queued requests per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingParams {
    /// Scale up when `queue_length > scale_up_factor * worker_count`.
    pub scale_up_factor: u32,
    /// Scale down when `queue_length < scale_down_factor * worker_count`.
    pub scale_down_factor: u32,
    /// The pool never shrinks below this many workers.
    pub min_workers: u32,
}

impl Default for ScalingParams {
    fn default() -> Self {
        Self {
            scale_up_factor: 25,
            scale_down_factor: 15,
            min_workers: 1,
        }
    }
}

/// The core trait that all autoscaling policies implement.
pub trait ScalingPolicy {
    /// Decide whether the pool should grow, shrink, or stay put.
    fn evaluate(&mut self, pool: &PoolSnapshot) -> ScaleDecision;

    /// Human-readable policy name (used in reports).
    fn name(&self) -> &str;
}
