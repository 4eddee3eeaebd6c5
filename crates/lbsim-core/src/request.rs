//! Request model for the dispatch simulation.
//!
//! A [`Request`] is an immutable unit of work: where it came from, where it is
//! going, what kind of job it is, and how many ticks it needs on a worker.
//! Fields are private so nothing can edit a request once the generator has
//! built it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job class of a request. Each class draws its service time from its own
/// range when the request is synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    /// Short-lived streaming job.
    Streaming,
    /// Longer batch processing job.
    Batch,
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobClass::Streaming => f.write_str("streaming"),
            JobClass::Batch => f.write_str("batch"),
        }
    }
}

/// A single request flowing through the simulated dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    id: u64,
    origin: String,
    destination: String,
    job_class: JobClass,
    service_time: u32,
    arrival_tick: u64,
}

impl Request {
    pub fn new(
        id: u64,
        origin: impl Into<String>,
        destination: impl Into<String>,
        job_class: JobClass,
        service_time: u32,
        arrival_tick: u64,
    ) -> Self {
        Self {
            id,
            origin: origin.into(),
            destination: destination.into(),
            job_class,
            service_time,
            arrival_tick,
        }
    }

    /// Sequence number assigned by the generator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Origin address. Opaque to the engine apart from its first octet.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn job_class(&self) -> JobClass {
        self.job_class
    }

    /// Ticks of worker time needed to complete this request.
    pub fn service_time(&self) -> u32 {
        self.service_time
    }

    /// Tick at which the request was generated.
    pub fn arrival_tick(&self) -> u64 {
        self.arrival_tick
    }

    /// Ticks spent waiting if the request is dispatched at `tick`.
    pub fn wait_ticks(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.arrival_tick)
    }
}
