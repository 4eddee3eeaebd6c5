/// Integration tests for the dispatch engine.
use lbsim_core::admission::{leading_octet, AdmissionFilter, OctetRange, RejectReason};
use lbsim_core::config::{ScaleDownMode, SimConfig};
use lbsim_core::engine::DispatchEngine;
use lbsim_core::generator::TickRange;
use lbsim_core::random::RandomSource;
use lbsim_core::report::{RecordingSink, ScaleEventKind};
use lbsim_core::request::{JobClass, Request};
use lbsim_core::worker::WorkerState;
use lbsim_core::SimError;
use lbsim_policy::{PoolSnapshot, ScaleDecision, ScalingPolicy};
use std::collections::VecDeque;

/// Replays a script of draws, clamped into the requested range. Once the
/// script runs out every draw returns the top of its range.
struct Scripted(VecDeque<u32>);

impl Scripted {
    fn new(draws: &[u32]) -> Box<Self> {
        Box::new(Self(draws.iter().copied().collect()))
    }
}

impl RandomSource for Scripted {
    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        self.0.pop_front().unwrap_or(high).clamp(low, high)
    }
}

/// Policy that asks to grow on every evaluation.
struct AlwaysUp;

impl ScalingPolicy for AlwaysUp {
    fn evaluate(&mut self, _pool: &PoolSnapshot) -> ScaleDecision {
        ScaleDecision::ScaleUp
    }
    fn name(&self) -> &str {
        "always_up"
    }
}

fn no_backlog(workers: u32, ticks: u64) -> SimConfig {
    let mut config = SimConfig::new(workers, ticks).with_seed(42);
    config.simulation.initial_backlog_per_worker = 0;
    config
}

fn request(id: u64) -> Request {
    Request::new(id, "10.0.0.1", "10.0.0.2", JobClass::Streaming, 12, 0)
}

#[test]
fn test_single_arrival_occupies_worker() {
    let mut config = no_backlog(1, 2);
    config.arrivals.admission_percent = 100;
    config.arrivals.streaming_service_ticks = TickRange::new(5, 5);
    let rng = Scripted::new(&[
        0, // admitted
        10, 0, 0, 1, // origin
        10, 0, 0, 2, // destination
        0, // streaming
        5, // service time
    ]);
    let mut engine = DispatchEngine::with_random(config, rng, RecordingSink::new()).unwrap();

    let record = engine.step().unwrap();
    let worker = &engine.workers()[0];
    assert_eq!(worker.state(), WorkerState::Busy);
    assert_eq!(worker.remaining_time(), 5);
    assert_eq!(worker.current_request().map(Request::origin), Some("10.0.0.1"));
    assert_eq!(record.tick, 1);
    assert_eq!(record.worker_count, 1);
    assert_eq!(record.queue_length, 0);
    assert_eq!(record.processed_count, 0);
    assert_eq!(record.blocked_count, 0);

    // Dispatched work is first advanced on the following tick; the second
    // arrival waits behind it.
    engine.step().unwrap();
    assert_eq!(engine.workers()[0].remaining_time(), 4);
    assert_eq!(engine.queue_length(), 1);
}

#[test]
fn test_blocked_origin_never_queued() {
    let mut config = no_backlog(1, 1);
    config.arrivals.admission_percent = 100;
    config.admission.blocked_range = OctetRange::new(192, 200);
    let rng = Scripted::new(&[0, 193, 10, 1, 1, 10, 0, 0, 2, 0, 11]);
    let mut engine = DispatchEngine::with_random(config, rng, RecordingSink::new()).unwrap();

    let record = engine.step().unwrap();
    assert_eq!(record.blocked_count, 1);
    assert_eq!(record.queue_length, 0);
    assert!(engine.workers()[0].is_idle());
    assert_eq!(engine.counters().accepted, 0);
    assert_eq!(engine.counters().malformed, 0);
}

#[test]
fn test_admission_draw_threshold() {
    // A draw equal to the admission percent is not admitted.
    let mut config = no_backlog(1, 1);
    config.arrivals.admission_percent = 90;
    let mut engine =
        DispatchEngine::with_random(config, Scripted::new(&[90]), RecordingSink::new()).unwrap();
    engine.step().unwrap();
    assert_eq!(engine.counters().accepted + engine.counters().blocked, 0);

    let mut config = no_backlog(1, 1);
    config.arrivals.admission_percent = 90;
    let mut engine =
        DispatchEngine::with_random(config, Scripted::new(&[89, 10]), RecordingSink::new()).unwrap();
    engine.step().unwrap();
    assert_eq!(engine.counters().accepted, 1);
}

#[test]
fn test_queue_above_threshold_scales_up() {
    let mut engine = DispatchEngine::from_config(no_backlog(1, 10)).unwrap();
    for id in 0..26 {
        engine.enqueue(request(id));
    }
    let event = engine.autoscale().unwrap();
    assert_eq!(event.kind, ScaleEventKind::ScaleUp);
    assert_eq!(engine.worker_count(), 2);
    assert_eq!(engine.scale_cooldown(), 3);
    assert!(engine.workers()[1].is_idle());
}

#[test]
fn test_queue_between_thresholds_no_action() {
    let mut engine = DispatchEngine::from_config(no_backlog(1, 10)).unwrap();
    for id in 0..10 {
        engine.enqueue(request(id));
    }
    assert!(engine.autoscale().is_none());
    assert_eq!(engine.worker_count(), 1);
    assert_eq!(engine.scale_cooldown(), 0);
}

#[test]
fn test_queue_at_exact_threshold_no_action() {
    let mut engine = DispatchEngine::from_config(no_backlog(2, 10)).unwrap();
    for id in 0..50 {
        engine.enqueue(request(id));
    }
    assert!(engine.autoscale().is_none());
    assert_eq!(engine.worker_count(), 2);
}

#[test]
fn test_backlog_seeded_at_construction() {
    let engine = DispatchEngine::from_config(SimConfig::new(4, 10).with_seed(7)).unwrap();
    assert_eq!(engine.queue_length(), 80);
    assert_eq!(engine.counters().seeded, 80);
    assert!(engine.pending().all(|r| r.arrival_tick() == 0));
}

#[test]
fn test_same_seed_same_records() {
    let config = SimConfig::new(2, 300).with_seed(1234);
    let (_, a) = lbsim_core::run_with_sink(config.clone(), RecordingSink::new()).unwrap();
    let (_, b) = lbsim_core::run_with_sink(config, RecordingSink::new()).unwrap();
    assert_eq!(a.records.len(), 300);
    assert_eq!(a.records, b.records);
    assert_eq!(a.scale_events, b.scale_events);
}

#[test]
fn test_record_invariants_over_long_run() {
    let config = SimConfig::new(3, 2_000).with_seed(99);
    let (summary, sink) = lbsim_core::run_with_sink(config, RecordingSink::new()).unwrap();

    for (i, record) in sink.records.iter().enumerate() {
        assert_eq!(record.tick, i as u64 + 1);
        assert!(record.worker_count >= 1);
    }
    for pair in sink.records.windows(2) {
        assert!(pair[1].processed_count >= pair[0].processed_count);
        assert!(pair[1].blocked_count >= pair[0].blocked_count);
    }

    let c = summary.counters;
    assert_eq!(
        summary.queue_remaining as u64,
        c.seeded + c.accepted - c.dispatched
    );
    assert_eq!(c.dispatched, c.processed + summary.in_flight as u64 + c.dropped);
    assert_eq!(c.dropped, 0);
    assert!(c.malformed <= c.blocked);
    assert!(summary.peak_workers >= summary.final_workers);
}

#[test]
fn test_scale_actions_respect_cooldown() {
    let config = SimConfig::new(1, 3_000).with_seed(5);
    let (summary, sink) = lbsim_core::run_with_sink(config, RecordingSink::new()).unwrap();
    assert!(summary.counters.scale_ups > 0);

    let acting: Vec<u64> = sink
        .scale_events
        .iter()
        .filter(|e| e.kind != ScaleEventKind::ScaleDownSkipped)
        .map(|e| e.tick)
        .collect();
    for pair in acting.windows(2) {
        assert!(pair[1] - pair[0] >= 4, "actions at {} and {}", pair[0], pair[1]);
    }
}

#[test]
fn test_cooldown_paces_forced_growth() {
    let mut engine = DispatchEngine::from_config(no_backlog(1, 8))
        .unwrap()
        .with_policy(Box::new(AlwaysUp));
    let mut counts = Vec::new();
    while !engine.is_finished() {
        counts.push(engine.step().unwrap().worker_count);
    }
    assert_eq!(counts, vec![2, 2, 2, 2, 3, 3, 3, 3]);
    let ids: Vec<u32> = engine.workers().iter().map(|w| w.id()).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

/// Four workers working off a backlog of 80 five-tick requests with no new
/// arrivals. The queue crosses the scale-down threshold (60) at tick 26 while
/// every worker is still busy.
fn draining(mode: ScaleDownMode) -> SimConfig {
    let mut config = SimConfig::new(4, 200).with_seed(3);
    config.arrivals.admission_percent = 0;
    config.arrivals.streaming_service_ticks = TickRange::new(5, 5);
    config.arrivals.batch_service_ticks = TickRange::new(5, 5);
    config.scaling.scale_down = mode;
    config
}

fn assert_request_accounting(summary: &lbsim_core::RunSummary) {
    let c = summary.counters;
    assert_eq!(c.dispatched, c.processed + summary.in_flight as u64 + c.dropped);
    assert_eq!(
        summary.queue_remaining as u64,
        c.seeded + c.accepted - c.dispatched
    );
}

#[test]
fn test_drop_in_flight_discards_busy_worker() {
    let (summary, sink) =
        lbsim_core::run_with_sink(draining(ScaleDownMode::DropInFlight), RecordingSink::new())
            .unwrap();

    let first = sink
        .scale_events
        .iter()
        .find(|e| e.kind == ScaleEventKind::ScaleDown)
        .unwrap();
    assert_eq!(first.tick, 26);
    assert_eq!(first.worker_id, 3);
    assert!(first.dropped_request.is_some());

    let c = summary.counters;
    assert!(c.scale_downs > 0);
    assert!(c.dropped > 0);
    assert_eq!(c.scale_downs_skipped, 0);
    assert_eq!(summary.final_workers, 1);
    assert_request_accounting(&summary);
}

#[test]
fn test_require_idle_skips_busy_worker() {
    let (summary, sink) =
        lbsim_core::run_with_sink(draining(ScaleDownMode::RequireIdle), RecordingSink::new())
            .unwrap();

    let first = sink.scale_events.first().unwrap();
    assert_eq!(first.tick, 26);
    assert_eq!(first.kind, ScaleEventKind::ScaleDownSkipped);
    assert_eq!(first.worker_count, 4);

    let c = summary.counters;
    assert!(c.scale_downs_skipped > 0);
    assert_eq!(c.dropped, 0);
    // Once the backlog is gone the idle workers are released.
    assert!(c.scale_downs > 0);
    assert_eq!(summary.final_workers, 1);
    assert_request_accounting(&summary);
}

#[test]
fn test_per_tick_invariants_hold_in_both_modes() {
    for mode in [ScaleDownMode::RequireIdle, ScaleDownMode::DropInFlight] {
        let mut config = SimConfig::new(4, 3_000).with_seed(31);
        config.simulation.initial_backlog_per_worker = 0;
        config.arrivals.admission_percent = 30;
        config.arrivals.streaming_service_ticks = TickRange::new(2, 4);
        config.arrivals.batch_service_ticks = TickRange::new(3, 6);
        config.scaling.scale_down = mode;

        let mut engine = DispatchEngine::new(config.clone(), RecordingSink::new()).unwrap();
        while !engine.is_finished() {
            let record = engine.step().unwrap();
            for worker in engine.workers() {
                assert_eq!(
                    worker.is_idle(),
                    worker.remaining_time() == 0,
                    "worker {} at tick {}",
                    worker.id(),
                    record.tick
                );
            }
            let c = engine.counters();
            assert_eq!(
                record.queue_length as u64,
                c.seeded + c.accepted - c.dispatched,
                "queue at tick {}",
                record.tick
            );
            let busy = engine.workers().iter().filter(|w| !w.is_idle()).count() as u64;
            assert_eq!(c.dispatched, c.processed + busy + c.dropped);
        }
        let summary = engine.summary();
        assert!(summary.counters.scale_downs > 0);

        // Reporting has no influence on the outcome.
        let quiet = lbsim_core::run_simulation(config).unwrap();
        assert_eq!(summary, quiet);
    }
}

#[test]
fn test_fixed_policy_keeps_pool() {
    let mut config = SimConfig::new(3, 500).with_seed(3);
    config.scaling.policy = "fixed".to_string();
    let (summary, sink) = lbsim_core::run_with_sink(config, RecordingSink::new()).unwrap();
    assert!(sink.records.iter().all(|r| r.worker_count == 3));
    assert!(sink.scale_events.is_empty());
    assert_eq!(summary.final_workers, 3);
    assert_eq!(summary.policy, "fixed");
}

#[test]
fn test_compare_policies_share_arrivals() {
    let config = SimConfig::new(2, 400).with_seed(21);
    let results = lbsim_core::compare_policies(&config, &["hysteresis", "fixed"]).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].policy, "hysteresis");
    assert_eq!(results[1].policy, "fixed");
    assert_eq!(results[0].counters.seeded, results[1].counters.seeded);
    assert_eq!(results[0].seed, results[1].seed);
    assert!(lbsim_core::compare_policies(&config, &["nonexistent"]).is_err());
}

#[test]
fn test_sweep_workers() {
    let config = SimConfig::new(1, 200).with_seed(8);
    let results = lbsim_core::sweep_workers(&config, &[1, 2, 4]).unwrap();
    let initial: Vec<u32> = results.iter().map(|r| r.initial_workers).collect();
    assert_eq!(initial, vec![1, 2, 4]);
    assert_eq!(results[2].counters.seeded, 80);
}

#[test]
fn test_invalid_config_is_an_error() {
    let mut config = SimConfig::new(1, 10);
    config.arrivals.admission_percent = 101;
    assert!(matches!(
        lbsim_core::run_simulation(config),
        Err(SimError::Config(_))
    ));
}

/// Admits only origins whose first octet matches.
struct OnlyOctet(u8);

impl AdmissionFilter for OnlyOctet {
    fn check(&self, request: &Request) -> Result<(), RejectReason> {
        match leading_octet(request.origin()) {
            Some(octet) if octet == self.0 => Ok(()),
            Some(octet) => Err(RejectReason::BlockedRange {
                octet,
                range: OctetRange::new(0, 255),
            }),
            None => Err(RejectReason::MalformedAddress {
                address: request.origin().to_string(),
            }),
        }
    }
}

#[test]
fn test_custom_admission_filter() {
    let mut config = no_backlog(2, 300);
    config.arrivals.admission_percent = 100;
    config.scaling.policy = "fixed".to_string();
    let mut engine = DispatchEngine::from_config(config)
        .unwrap()
        .with_filter(Box::new(OnlyOctet(10)));

    assert!(engine.submit(request(0)).is_ok());
    let foreign = Request::new(1, "11.0.0.1", "10.0.0.2", JobClass::Batch, 20, 0);
    assert!(engine.submit(foreign).is_err());

    let summary = engine.run().unwrap();
    assert!(summary.counters.blocked > summary.counters.accepted);
    assert!(engine.pending().all(|r| r.origin().starts_with("10.")));
}
