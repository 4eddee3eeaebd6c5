//! lbsim: discrete-time request dispatch and autoscaling simulator.
//!
//! Requests arrive at random, pass an address-based admission filter, wait
//! in a FIFO queue, and are served by a pool of single-request workers. A
//! pluggable policy from `lbsim-policy` grows and shrinks the pool from the
//! ratio of queue length to pool size.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐     ┌───────────┐     ┌──────────────┐
//! │ Generator │────▶│ Admission │────▶│ Pending FIFO │
//! │ (random)  │     │  Filter   │     │    Queue     │
//! └───────────┘     └───────────┘     └──────┬───────┘
//!                                            │ dispatch
//!                  ┌─────────────────────────┼──────────┐
//!                  ▼                         ▼          ▼
//!            ┌──────────┐             ┌──────────┐ ┌──────────┐
//!            │ Worker 0 │             │ Worker 1 │ │ Worker N │
//!            └──────────┘             └──────────┘ └──────────┘
//!                  ▲
//!          ┌───────┴───────┐          ┌──────────────┐
//!          │ ScalingPolicy │          │ ReportSink   │
//!          │  + cooldown   │          │ (per tick)   │
//!          └───────────────┘          └──────────────┘
//! ```

pub mod admission;
pub mod clock;
pub mod config;
pub mod engine;
pub mod generator;
pub mod metrics;
pub mod random;
pub mod report;
pub mod request;
pub mod trace;
pub mod worker;

pub use admission::{AdmissionFilter, BlockedRangeFilter, OctetRange, RejectReason};
pub use clock::TickClock;
pub use config::{ConfigError, ScaleDownMode, SimConfig};
pub use engine::{DispatchEngine, EngineError};
pub use generator::{RequestGenerator, TickRange};
pub use metrics::{format_comparison_table, format_table, Counters, RunSummary};
pub use random::{RandomSource, SeededRandom};
pub use report::{
    ConsoleSink, CsvLogSink, FanOut, NullSink, RecordingSink, ReportSink, ScaleEvent,
    ScaleEventKind, StateRecord,
};
pub use request::{JobClass, Request};
pub use trace::{load_records, JsonlTraceSink, TraceError};
pub use worker::{Worker, WorkerError, WorkerSnapshot, WorkerState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Run a complete simulation with reporting disabled.
pub fn run_simulation(config: SimConfig) -> Result<RunSummary, SimError> {
    run_with_sink(config, NullSink).map(|(summary, _)| summary)
}

/// Run a complete simulation, handing the sink back afterwards.
///
/// An invalid config is reported as [`SimError::Config`] before any engine
/// is built.
pub fn run_with_sink<S: ReportSink>(
    config: SimConfig,
    sink: S,
) -> Result<(RunSummary, S), SimError> {
    config.validate()?;
    let mut engine = DispatchEngine::new(config, sink)?;
    let summary = engine.run()?;
    Ok((summary, engine.into_sink()))
}

/// Run the same configuration under each named policy.
///
/// An unseeded config is pinned to one seed first so every run sees the
/// same arrivals.
pub fn compare_policies(config: &SimConfig, policies: &[&str]) -> Result<Vec<RunSummary>, SimError> {
    let config = pinned(config);
    policies
        .iter()
        .map(|name| {
            let mut cfg = config.clone();
            cfg.scaling.policy = (*name).to_string();
            run_simulation(cfg)
        })
        .collect()
}

/// Run the same configuration at several initial pool sizes.
pub fn sweep_workers(config: &SimConfig, counts: &[u32]) -> Result<Vec<RunSummary>, SimError> {
    let config = pinned(config);
    counts
        .iter()
        .map(|&workers| {
            let mut cfg = config.clone();
            cfg.simulation.initial_workers = workers;
            run_simulation(cfg)
        })
        .collect()
}

fn pinned(config: &SimConfig) -> SimConfig {
    let mut config = config.clone();
    if config.simulation.seed.is_none() {
        config.simulation.seed = Some(SeededRandom::from_clock().seed());
    }
    config
}
