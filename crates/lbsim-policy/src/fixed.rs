//! Fixed-size pool.
//!
//! Never scales. Useful as a baseline when comparing against the
//! hysteresis controller on the same arrival stream.

use crate::traits::*;

/// Policy that keeps the pool at its initial size.
#[derive(Debug, Clone, Default)]
pub struct FixedPool;

impl FixedPool {
    pub fn new() -> Self {
        Self
    }
}

impl ScalingPolicy for FixedPool {
    fn evaluate(&mut self, _pool: &PoolSnapshot) -> ScaleDecision {
        ScaleDecision::NoChange
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
