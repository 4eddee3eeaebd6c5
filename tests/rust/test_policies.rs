/// Integration tests for the scaling policies and their use by the engine.
use lbsim_core::config::SimConfig;
use lbsim_core::engine::DispatchEngine;
use lbsim_core::report::ScaleEventKind;
use lbsim_core::request::{JobClass, Request};
use lbsim_policy::*;

fn pool(workers: u32, queue: usize) -> PoolSnapshot {
    PoolSnapshot {
        tick: 1,
        worker_count: workers,
        queue_length: queue,
    }
}

#[test]
fn test_hysteresis_decisions() {
    let mut policy = Hysteresis::default();
    let cases = [
        // (workers, queue, expected)
        (1, 26, ScaleDecision::ScaleUp),
        (1, 25, ScaleDecision::NoChange),
        (1, 10, ScaleDecision::NoChange),
        (1, 0, ScaleDecision::NoChange),
        (2, 29, ScaleDecision::ScaleDown),
        (2, 30, ScaleDecision::NoChange),
        (2, 51, ScaleDecision::ScaleUp),
        (4, 0, ScaleDecision::ScaleDown),
    ];
    for (workers, queue, expected) in cases {
        assert_eq!(
            policy.evaluate(&pool(workers, queue)),
            expected,
            "workers={} queue={}",
            workers,
            queue
        );
    }
}

#[test]
fn test_large_pool_does_not_overflow() {
    let mut policy = Hysteresis::default();
    assert_eq!(
        policy.evaluate(&pool(u32::MAX, usize::MAX)),
        ScaleDecision::ScaleUp
    );
}

#[test]
fn test_fixed_pool_never_scales() {
    let mut policy = FixedPool::new();
    for (workers, queue) in [(1, 10_000), (8, 0), (3, 40)] {
        assert_eq!(
            policy.evaluate(&pool(workers, queue)),
            ScaleDecision::NoChange
        );
    }
}

#[test]
fn test_registry_names_match() {
    for name in available_policies() {
        let policy = policy_by_name(name, ScalingParams::default()).unwrap();
        assert_eq!(policy.name(), name);
    }
}

#[test]
fn test_configured_factors_reach_engine() {
    let mut config = SimConfig::new(1, 10).with_seed(1);
    config.simulation.initial_backlog_per_worker = 0;
    config.scaling.scale_up_factor = 5;
    config.scaling.scale_down_factor = 2;
    let mut engine = DispatchEngine::from_config(config).unwrap();

    for id in 0..6 {
        engine.enqueue(Request::new(id, "10.0.0.1", "10.0.0.2", JobClass::Batch, 20, 0));
    }
    let event = engine.autoscale().unwrap();
    assert_eq!(event.kind, ScaleEventKind::ScaleUp);
    assert_eq!(engine.policy_name(), "hysteresis");
}

#[test]
fn test_inverted_factors_rejected() {
    let mut config = SimConfig::new(1, 10);
    config.scaling.scale_up_factor = 10;
    config.scaling.scale_down_factor = 20;
    assert!(DispatchEngine::from_config(config).is_err());
}
