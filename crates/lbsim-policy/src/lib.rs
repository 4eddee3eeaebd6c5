//! Built-in autoscaling policies for lbsim.
//!
//! This crate provides the [`ScalingPolicy`] trait and the built-in
//! implementations the dispatch engine can be run with:
//!
//! | Policy | Strategy |
//! |--------|----------|
//! | [`Hysteresis`] | Grow above `25n` queued, shrink below `15n` |
//! | [`FixedPool`] | Never scale (baseline) |

pub mod fixed;
pub mod hysteresis;
pub mod traits;

pub use fixed::FixedPool;
pub use hysteresis::Hysteresis;
pub use traits::*;

/// Create a scaling policy by name.
pub fn policy_by_name(name: &str, params: ScalingParams) -> Option<Box<dyn ScalingPolicy>> {
    match name {
        "hysteresis" => Some(Box::new(Hysteresis::new(params))),
        "fixed" => Some(Box::new(FixedPool::new())),
        _ => None,
    }
}

/// List all available built-in policy names.
pub fn available_policies() -> Vec<&'static str> {
    vec!["hysteresis", "fixed"]
}
