//! Discrete-time dispatch engine.
//!
//! The engine owns the worker pool, the pending queue, and every counter. One
//! call to [`DispatchEngine::step`] is one tick, and a tick always runs the
//! same five phases in the same order:
//!
//! 1. **Arrival**: maybe generate a request and pass it through admission.
//! 2. **Advance**: tick every worker in pool order; completions count here.
//! 3. **Dispatch**: hand queued requests, FIFO, to idle workers in pool order.
//! 4. **Autoscale**: consult the scaling policy unless cooling down.
//! 5. **Report**: emit a [`StateRecord`] to the sink.
//!
//! A request dispatched in phase 3 is not advanced until the next tick's
//! phase 2. Swapping phases 2 and 3 shifts every completion by one tick.

use crate::admission::{AdmissionFilter, BlockedRangeFilter, RejectReason};
use crate::clock::TickClock;
use crate::config::{ConfigError, ScaleDownMode, SimConfig};
use crate::generator::RequestGenerator;
use crate::metrics::{Counters, MetricsCollector, RunSummary};
use crate::random::{RandomSource, SeededRandom};
use crate::report::{NullSink, ReportSink, ScaleEvent, ScaleEventKind, StateRecord};
use crate::request::Request;
use crate::worker::{Worker, WorkerError};
use lbsim_policy::{PoolSnapshot, ScaleDecision, ScalingPolicy};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invariant violated at tick {tick}: {source}")]
    Invariant {
        tick: u64,
        #[source]
        source: WorkerError,
    },
    #[error("run already finished after {0} ticks")]
    Finished(u64),
}

/// The dispatch engine: worker pool, pending queue, and scaling loop.
pub struct DispatchEngine<S: ReportSink = NullSink> {
    config: SimConfig,
    clock: TickClock,
    /// Pool in insertion order; grows and shrinks at the tail.
    workers: Vec<Worker>,
    next_worker_id: u32,
    /// Strict FIFO of requests waiting for a worker.
    pending: VecDeque<Request>,
    /// Ticks left before another scaling action is allowed.
    scale_cooldown: u32,
    counters: Counters,
    metrics: MetricsCollector,
    generator: RequestGenerator,
    filter: Box<dyn AdmissionFilter>,
    policy: Box<dyn ScalingPolicy>,
    rng: Box<dyn RandomSource>,
    seed: Option<u64>,
    sink: S,
}

impl DispatchEngine<NullSink> {
    /// Engine with reporting disabled.
    pub fn from_config(config: SimConfig) -> Result<Self, EngineError> {
        Self::new(config, NullSink)
    }
}

impl<S: ReportSink> DispatchEngine<S> {
    /// Create an engine from config, seeding from `simulation.seed` or, when
    /// absent, from the wall clock.
    pub fn new(config: SimConfig, sink: S) -> Result<Self, EngineError> {
        let rng = match config.simulation.seed {
            Some(seed) => SeededRandom::from_seed(seed),
            None => SeededRandom::from_clock(),
        };
        let seed = rng.seed();
        let mut engine = Self::with_random(config, Box::new(rng), sink)?;
        engine.seed = Some(seed);
        Ok(engine)
    }

    /// Create an engine drawing from a caller-supplied random source.
    ///
    /// The initial backlog is generated here, so the source is consulted
    /// before the first tick. `simulation.seed` is ignored and the run
    /// reports no seed.
    pub fn with_random(
        config: SimConfig,
        rng: Box<dyn RandomSource>,
        sink: S,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let policy = lbsim_policy::policy_by_name(&config.scaling.policy, config.scaling_params())
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "unknown scaling policy {:?}",
                    config.scaling.policy
                ))
            })?;
        let generator = RequestGenerator::new(
            config.arrivals.streaming_service_ticks,
            config.arrivals.batch_service_ticks,
        );
        let filter = Box::new(BlockedRangeFilter::new(config.admission.blocked_range));
        let initial_workers = config.simulation.initial_workers;

        let mut engine = Self {
            clock: TickClock::new(config.simulation.run_ticks),
            workers: Vec::with_capacity(initial_workers as usize),
            next_worker_id: 0,
            pending: VecDeque::new(),
            scale_cooldown: 0,
            counters: Counters::default(),
            metrics: MetricsCollector::new(initial_workers),
            generator,
            filter,
            policy,
            rng,
            seed: None,
            sink,
            config,
        };

        for _ in 0..initial_workers {
            engine.spawn_worker();
        }
        for _ in 0..engine.config.initial_backlog() {
            let request = engine.generator.generate(&mut *engine.rng, 0);
            engine.enqueue(request);
        }
        Ok(engine)
    }

    /// Replace the scaling policy.
    pub fn with_policy(mut self, policy: Box<dyn ScalingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the admission filter.
    pub fn with_filter(mut self, filter: Box<dyn AdmissionFilter>) -> Self {
        self.filter = filter;
        self
    }

    // --- Accessors ---

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Last tick started (0 before the first step).
    pub fn tick(&self) -> u64 {
        self.clock.now()
    }

    pub fn is_finished(&self) -> bool {
        self.clock.finished()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker_count(&self) -> u32 {
        self.workers.len() as u32
    }

    pub fn queue_length(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.pending.iter()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn scale_cooldown(&self) -> u32 {
        self.scale_cooldown
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    // --- Queue entry ---

    /// Queue a request without admission checks (initial backlog).
    pub fn enqueue(&mut self, request: Request) {
        self.pending.push_back(request);
        self.counters.seeded += 1;
    }

    /// Pass a request through admission; queue it if accepted.
    ///
    /// Rejected requests are counted in `blocked` and discarded.
    pub fn submit(&mut self, request: Request) -> Result<(), RejectReason> {
        match self.filter.check(&request) {
            Ok(()) => {
                self.pending.push_back(request);
                self.counters.accepted += 1;
                Ok(())
            }
            Err(reason) => {
                self.counters.blocked += 1;
                if let RejectReason::MalformedAddress { address } = &reason {
                    self.counters.malformed += 1;
                    debug!(request = request.id(), address = %address, "malformed origin address");
                }
                Err(reason)
            }
        }
    }

    // --- Tick phases ---

    /// Run one full tick and report its state record.
    pub fn step(&mut self) -> Result<StateRecord, EngineError> {
        if self.clock.finished() {
            return Err(EngineError::Finished(self.clock.run_length()));
        }
        let tick = self.clock.advance();

        self.arrive(tick);
        self.advance();
        self.dispatch()?;

        let busy = self.workers.iter().filter(|w| !w.is_idle()).count() as u32;
        let (queue, workers) = (self.pending.len(), self.worker_count());
        self.metrics.sample_tick(queue, workers, busy);

        self.autoscale();

        let record = self.state_record();
        self.sink.record(&record);
        Ok(record)
    }

    /// Run until the configured run length, then emit the final summary.
    ///
    /// Requests still queued or in flight at the end are left as they are.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        while !self.clock.finished() {
            self.step()?;
        }
        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            workers = summary.final_workers,
            processed = summary.counters.processed,
            blocked = summary.counters.blocked,
            "simulation complete"
        );
        self.sink.summary(&summary);
        Ok(summary)
    }

    /// Arrival phase.
    fn arrive(&mut self, tick: u64) {
        let roll = self.rng.next_in_range(0, 99);
        if roll >= self.config.arrivals.admission_percent {
            return;
        }
        let request = self.generator.generate(&mut *self.rng, tick);
        let id = request.id();
        if let Err(reason) = self.submit(request) {
            trace!(tick, request = id, %reason, "request rejected at admission");
        }
    }

    /// Advance phase: one tick of work on every worker, in pool order.
    pub fn advance(&mut self) {
        for worker in &mut self.workers {
            if worker.tick().is_some() {
                self.counters.processed += 1;
            }
        }
    }

    /// Dispatch phase: idle workers take queued requests, FIFO, in pool order.
    pub fn dispatch(&mut self) -> Result<(), EngineError> {
        let tick = self.clock.now();
        for worker in self.workers.iter_mut().filter(|w| w.is_idle()) {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            let wait = request.wait_ticks(tick);
            if let Err((source, request)) = worker.assign(request) {
                self.pending.push_front(request);
                return Err(EngineError::Invariant { tick, source });
            }
            self.counters.dispatched += 1;
            self.metrics.record_wait(wait);
        }
        Ok(())
    }

    /// Autoscale phase.
    ///
    /// While cooling down the counter is consumed and nothing else happens.
    /// Otherwise the policy decides; any resulting event is also reported to
    /// the sink.
    pub fn autoscale(&mut self) -> Option<ScaleEvent> {
        if self.scale_cooldown > 0 {
            self.scale_cooldown -= 1;
            return None;
        }

        let snapshot = self.pool_snapshot();
        let event = match self.policy.evaluate(&snapshot) {
            ScaleDecision::ScaleUp => Some(self.scale_up()),
            ScaleDecision::ScaleDown => self.scale_down(),
            ScaleDecision::NoChange => None,
        }?;

        self.sink.scale_event(&event);
        Some(event)
    }

    fn scale_up(&mut self) -> ScaleEvent {
        let worker_id = self.spawn_worker();
        self.scale_cooldown = self.config.scaling.cooldown_ticks;
        self.counters.scale_ups += 1;
        self.metrics.observe_pool(self.worker_count());

        let event = ScaleEvent {
            tick: self.clock.now(),
            kind: ScaleEventKind::ScaleUp,
            worker_id,
            worker_count: self.worker_count(),
            dropped_request: None,
        };
        info!(
            tick = event.tick,
            worker = worker_id,
            workers = event.worker_count,
            queue = self.pending.len(),
            "scaled up"
        );
        event
    }

    /// Remove the newest worker, honoring the configured scale-down mode.
    fn scale_down(&mut self) -> Option<ScaleEvent> {
        if self.workers.len() <= 1 {
            return None;
        }
        let tick = self.clock.now();
        let newest = self.workers.last()?;

        if !newest.is_idle() && self.config.scaling.scale_down == ScaleDownMode::RequireIdle {
            self.counters.scale_downs_skipped += 1;
            debug!(tick, worker = newest.id(), "scale down skipped: newest worker busy");
            return Some(ScaleEvent {
                tick,
                kind: ScaleEventKind::ScaleDownSkipped,
                worker_id: newest.id(),
                worker_count: self.worker_count(),
                dropped_request: None,
            });
        }

        let worker = self.workers.pop()?;
        let worker_id = worker.id();
        let dropped = worker.shutdown().map(|request| {
            self.counters.dropped += 1;
            warn!(
                tick,
                worker = worker_id,
                request = request.id(),
                "scale down discarded an in-flight request"
            );
            request.id()
        });
        self.scale_cooldown = self.config.scaling.cooldown_ticks;
        self.counters.scale_downs += 1;

        let event = ScaleEvent {
            tick,
            kind: ScaleEventKind::ScaleDown,
            worker_id,
            worker_count: self.worker_count(),
            dropped_request: dropped,
        };
        info!(
            tick,
            worker = worker_id,
            workers = event.worker_count,
            queue = self.pending.len(),
            "scaled down"
        );
        Some(event)
    }

    fn spawn_worker(&mut self) -> u32 {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        self.workers.push(Worker::new(id));
        id
    }

    // --- Observation ---

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            tick: self.clock.now(),
            worker_count: self.worker_count(),
            queue_length: self.pending.len(),
        }
    }

    pub fn state_record(&self) -> StateRecord {
        StateRecord {
            tick: self.clock.now(),
            worker_count: self.worker_count(),
            queue_length: self.pending.len(),
            processed_count: self.counters.processed,
            blocked_count: self.counters.blocked,
        }
    }

    /// Cumulative summary of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            name: self.config.simulation.name.clone(),
            policy: self.policy.name().to_string(),
            seed: self.seed,
            ticks: self.clock.now(),
            initial_workers: self.config.simulation.initial_workers,
            final_workers: self.worker_count(),
            peak_workers: self.metrics.peak_workers(),
            counters: self.counters,
            queue_remaining: self.pending.len(),
            in_flight: self.workers.iter().filter(|w| !w.is_idle()).count() as u32,
            workers: self.workers.iter().map(Worker::snapshot).collect(),
            queue_length: self.metrics.queue_length(),
            queue_wait: self.metrics.queue_wait(),
            utilization: self.metrics.utilization(),
        }
    }
}
