//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks cumulative request counters, per-tick queue and pool samples, and
//! per-dispatch queue waits, and folds them into a [`RunSummary`] at the end
//! of a run.

use crate::worker::{WorkerSnapshot, WorkerState};
use serde::{Deserialize, Serialize};

/// Cumulative request and scaling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Requests queued at construction (initial backlog).
    pub seeded: u64,
    /// Arrivals that passed admission.
    pub accepted: u64,
    /// Arrivals refused at admission (including malformed ones).
    pub blocked: u64,
    /// Subset of `blocked` refused for an unparseable origin.
    pub malformed: u64,
    /// Requests handed to a worker.
    pub dispatched: u64,
    /// Requests that ran to completion.
    pub processed: u64,
    /// In-flight requests discarded by a scale-down.
    pub dropped: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub scale_downs_skipped: u64,
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p90: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p90: percentile_sorted(&sorted, 90.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Aggregated results of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Simulation name from the config.
    pub name: String,
    /// Scaling policy name.
    pub policy: String,
    /// Seed the random source was created with, if known.
    pub seed: Option<u64>,
    /// Ticks simulated.
    pub ticks: u64,
    pub initial_workers: u32,
    pub final_workers: u32,
    pub peak_workers: u32,
    #[serde(flatten)]
    pub counters: Counters,
    /// Requests still queued when the run stopped.
    pub queue_remaining: usize,
    /// Requests still on a worker when the run stopped.
    pub in_flight: u32,
    /// The pool as it stood when the run stopped.
    pub workers: Vec<WorkerSnapshot>,
    /// Queue length sampled once per tick.
    pub queue_length: Percentiles,
    /// Ticks between arrival and dispatch.
    pub queue_wait: Percentiles,
    /// Mean fraction of workers busy per tick.
    pub utilization: f64,
}

/// Per-tick sampler feeding [`RunSummary`].
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    queue_samples: Vec<f64>,
    wait_samples: Vec<f64>,
    worker_ticks: u64,
    busy_worker_ticks: u64,
    peak_workers: u32,
}

impl MetricsCollector {
    pub fn new(initial_workers: u32) -> Self {
        Self {
            peak_workers: initial_workers,
            ..Self::default()
        }
    }

    /// Record the pool and queue as they stand after dispatch.
    pub fn sample_tick(&mut self, queue_length: usize, worker_count: u32, busy_workers: u32) {
        self.queue_samples.push(queue_length as f64);
        self.worker_ticks += worker_count as u64;
        self.busy_worker_ticks += busy_workers as u64;
    }

    /// Record how long a request waited before dispatch.
    pub fn record_wait(&mut self, wait_ticks: u64) {
        self.wait_samples.push(wait_ticks as f64);
    }

    /// Track the largest pool seen.
    pub fn observe_pool(&mut self, worker_count: u32) {
        self.peak_workers = self.peak_workers.max(worker_count);
    }

    pub fn peak_workers(&self) -> u32 {
        self.peak_workers
    }

    /// Mean fraction of workers busy per tick (0 before any tick).
    pub fn utilization(&self) -> f64 {
        if self.worker_ticks == 0 {
            return 0.0;
        }
        self.busy_worker_ticks as f64 / self.worker_ticks as f64
    }

    pub fn queue_length(&self) -> Percentiles {
        Percentiles::from_values(&self.queue_samples)
    }

    pub fn queue_wait(&self) -> Percentiles {
        Percentiles::from_values(&self.wait_samples)
    }
}

/// Format a run summary as a pretty-printed table string.
pub fn format_table(s: &RunSummary) -> String {
    let c = &s.counters;
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} ({}) Results  ", s.name, s.policy)
    ));
    let seed = s.seed.map_or_else(|| "custom".to_string(), |seed| seed.to_string());
    out.push_str(&format!(
        "  Ticks: {} | Seed: {} | Workers: {} -> {} (peak {})\n",
        s.ticks, seed, s.initial_workers, s.final_workers, s.peak_workers
    ));
    out.push_str(&format!("{:-<70}\n", "  Requests  "));
    out.push_str(&format!(
        "  Seeded: {}  Accepted: {}  Blocked: {} ({} malformed)\n",
        c.seeded, c.accepted, c.blocked, c.malformed
    ));
    out.push_str(&format!(
        "  Dispatched: {}  Processed: {}  Dropped: {}\n",
        c.dispatched, c.processed, c.dropped
    ));
    out.push_str(&format!(
        "  Left in queue: {}  In flight: {}\n",
        s.queue_remaining, s.in_flight
    ));
    out.push_str(&format!("{:-<70}\n", "  Queue  "));
    out.push_str(&format!(
        "  Length          P50={:>8.1}  P90={:>8.1}  P99={:>8.1}  max={:>8.0}\n",
        s.queue_length.p50, s.queue_length.p90, s.queue_length.p99, s.queue_length.max
    ));
    out.push_str(&format!(
        "  Wait (ticks)    P50={:>8.1}  P90={:>8.1}  P99={:>8.1}  max={:>8.0}\n",
        s.queue_wait.p50, s.queue_wait.p90, s.queue_wait.p99, s.queue_wait.max
    ));
    out.push_str(&format!("{:-<70}\n", "  Scaling  "));
    out.push_str(&format!(
        "  Scale ups: {}  Scale downs: {} ({} skipped)  Utilization: {:.1}%\n",
        c.scale_ups,
        c.scale_downs,
        c.scale_downs_skipped,
        s.utilization * 100.0
    ));
    out.push_str(&format!("{:-<70}\n", "  Workers  "));
    for w in &s.workers {
        let state = match (w.state, w.current_request) {
            (WorkerState::Busy, Some(id)) => format!("busy (request {}, {} left)", id, w.remaining_time),
            (WorkerState::Busy, None) => "busy".to_string(),
            (WorkerState::Idle, _) => "idle".to_string(),
        };
        out.push_str(&format!(
            "  #{:<4} served {:>6}  busy {:>7} ticks  {}\n",
            w.id, w.requests_served, w.busy_ticks, state
        ));
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of several runs.
pub fn format_comparison_table(results: &[RunSummary]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Run Comparison  "));
    out.push_str(&format!(
        "{:<14} {:>8} {:>8} {:>10} {:>8} {:>9} {:>9} {:>8}\n",
        "Policy", "Workers", "Peak", "Processed", "Blocked", "Queue p50", "Wait p99", "Util%"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for s in results {
        out.push_str(&format!(
            "{:<14} {:>8} {:>8} {:>10} {:>8} {:>9.1} {:>9.1} {:>7.1}%\n",
            s.policy,
            format!("{}->{}", s.initial_workers, s.final_workers),
            s.peak_workers,
            s.counters.processed,
            s.counters.blocked,
            s.queue_length.p50,
            s.queue_wait.p99,
            s.utilization * 100.0,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
