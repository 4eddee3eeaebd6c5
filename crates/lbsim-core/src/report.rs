//! Reporting sinks.
//!
//! The engine hands every state record, scale event, and the final summary to
//! a single [`ReportSink`]. Sinks are write-only from the engine's point of
//! view: a sink that fails or does nothing never changes the simulation.
//! Fanning out to several destinations is done with [`FanOut`].

use crate::metrics::{format_table, RunSummary};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;
use tracing::warn;

/// Engine state observed at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub tick: u64,
    pub worker_count: u32,
    pub queue_length: usize,
    pub processed_count: u64,
    pub blocked_count: u64,
}

impl fmt::Display for StateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Cycle {}] Servers: {}, Queue: {}, Processed: {}, Blocked: {}",
            self.tick,
            self.worker_count,
            self.queue_length,
            self.processed_count,
            self.blocked_count
        )
    }
}

/// Kind of pool change reported by the autoscale phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleEventKind {
    ScaleUp,
    ScaleDown,
    /// The policy asked to shrink but the newest worker was busy.
    ScaleDownSkipped,
}

/// A scaling action (or a refused one), annotated for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleEvent {
    pub tick: u64,
    pub kind: ScaleEventKind,
    /// Worker added, removed, or kept.
    pub worker_id: u32,
    /// Pool size after the event.
    pub worker_count: u32,
    /// Id of an in-flight request discarded by the removal.
    pub dropped_request: Option<u64>,
}

impl fmt::Display for ScaleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScaleEventKind::ScaleUp => write!(
                f,
                "[Cycle {}] Scale up: added worker {} ({} workers)",
                self.tick, self.worker_id, self.worker_count
            ),
            ScaleEventKind::ScaleDown => {
                write!(
                    f,
                    "[Cycle {}] Scale down: removed worker {} ({} workers)",
                    self.tick, self.worker_id, self.worker_count
                )?;
                if let Some(id) = self.dropped_request {
                    write!(f, ", dropped in-flight request {}", id)?;
                }
                Ok(())
            }
            ScaleEventKind::ScaleDownSkipped => write!(
                f,
                "[Cycle {}] Scale down skipped: worker {} is busy ({} workers)",
                self.tick, self.worker_id, self.worker_count
            ),
        }
    }
}

/// Destination for engine reports.
pub trait ReportSink {
    /// Called once per tick, after the autoscale phase.
    fn record(&mut self, record: &StateRecord);

    /// Called whenever the autoscale phase changes (or refuses to change) the pool.
    fn scale_event(&mut self, _event: &ScaleEvent) {}

    /// Called once when the run terminates.
    fn summary(&mut self, _summary: &RunSummary) {}
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn record(&mut self, record: &StateRecord) {
        (**self).record(record)
    }
    fn scale_event(&mut self, event: &ScaleEvent) {
        (**self).scale_event(event)
    }
    fn summary(&mut self, summary: &RunSummary) {
        (**self).summary(summary)
    }
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn record(&mut self, record: &StateRecord) {
        (**self).record(record)
    }
    fn scale_event(&mut self, event: &ScaleEvent) {
        (**self).scale_event(event)
    }
    fn summary(&mut self, summary: &RunSummary) {
        (**self).summary(summary)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn record(&mut self, _record: &StateRecord) {}
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub records: Vec<StateRecord>,
    pub scale_events: Vec<ScaleEvent>,
    pub summary: Option<RunSummary>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingSink {
    fn record(&mut self, record: &StateRecord) {
        self.records.push(*record);
    }
    fn scale_event(&mut self, event: &ScaleEvent) {
        self.scale_events.push(*event);
    }
    fn summary(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}

/// Prints a state line every `interval` ticks, every scale event, and the
/// final summary table.
#[derive(Debug)]
pub struct ConsoleSink<W: Write = Stdout> {
    interval: u64,
    out: W,
}

impl ConsoleSink {
    /// Console sink on stdout. `interval` of 0 suppresses the per-tick
    /// lines and the scale events.
    pub fn new(interval: u64) -> Self {
        Self::with_writer(interval, io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn with_writer(interval: u64, out: W) -> Self {
        Self { interval, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl fmt::Display) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!(error = %e, "console write failed");
        }
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn record(&mut self, record: &StateRecord) {
        if self.interval > 0 && record.tick % self.interval == 0 {
            self.line(record);
        }
    }

    fn scale_event(&mut self, event: &ScaleEvent) {
        if self.interval > 0 {
            self.line(event);
        }
    }

    fn summary(&mut self, summary: &RunSummary) {
        self.line(format_table(summary));
    }
}

/// CSV state log: a header, one row per tick, `#`-prefixed annotations.
///
/// The first write error is logged and the sink goes quiet afterwards.
#[derive(Debug)]
pub struct CsvLogSink<W: Write> {
    writer: Option<W>,
}

impl CsvLogSink<BufWriter<File>> {
    /// Create (or truncate) a log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvLogSink<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "Clock,Servers,QueueSize,Processed,Blocked")?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    /// Recover the underlying writer (None if it failed earlier).
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }

    fn write_with(&mut self, f: impl FnOnce(&mut W) -> io::Result<()>) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = f(writer) {
                warn!(error = %e, "state log write failed; disabling log sink");
                self.writer = None;
            }
        }
    }
}

impl<W: Write> ReportSink for CsvLogSink<W> {
    fn record(&mut self, r: &StateRecord) {
        self.write_with(|w| {
            writeln!(
                w,
                "{},{},{},{},{}",
                r.tick, r.worker_count, r.queue_length, r.processed_count, r.blocked_count
            )
        });
    }

    fn scale_event(&mut self, event: &ScaleEvent) {
        self.write_with(|w| writeln!(w, "# {}", event));
    }

    fn summary(&mut self, s: &RunSummary) {
        self.write_with(|w| {
            writeln!(w, "# Simulation complete")?;
            writeln!(w, "# Initial Servers: {}", s.initial_workers)?;
            writeln!(w, "# Final Servers: {}", s.final_workers)?;
            writeln!(w, "# Requests Processed: {}", s.counters.processed)?;
            writeln!(w, "# Blocked Requests: {}", s.counters.blocked)?;
            w.flush()
        });
    }
}

/// Broadcasts every report to a list of sinks, in order.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for FanOut {
    fn record(&mut self, record: &StateRecord) {
        for sink in &mut self.sinks {
            sink.record(record);
        }
    }
    fn scale_event(&mut self, event: &ScaleEvent) {
        for sink in &mut self.sinks {
            sink.scale_event(event);
        }
    }
    fn summary(&mut self, summary: &RunSummary) {
        for sink in &mut self.sinks {
            sink.summary(summary);
        }
    }
}
