//! Single-slot simulated worker.
//!
//! Each [`Worker`] serves at most one request at a time. It is a two-state
//! machine: `assign` moves it from idle to busy, and every `tick` burns one
//! unit of the request's service time until it reaches zero and the worker
//! releases the request.

use crate::request::Request;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invariant violations raised by [`Worker::assign`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker {worker_id} is busy and cannot accept another request")]
    Busy { worker_id: u32 },
    #[error("request {request_id} has zero service time and cannot be assigned to worker {worker_id}")]
    ZeroServiceTime { worker_id: u32, request_id: u64 },
}

/// State of a worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No request assigned; ready for dispatch.
    #[default]
    Idle,
    /// Serving a request.
    Busy,
}

/// Point-in-time view of a worker, carried in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: u32,
    pub state: WorkerState,
    pub remaining_time: u32,
    pub current_request: Option<u64>,
    /// Requests this worker has completed.
    pub requests_served: u64,
    /// Ticks this worker has spent serving requests.
    pub busy_ticks: u64,
}

/// A simulated single-capacity worker.
#[derive(Debug, Clone)]
pub struct Worker {
    id: u32,
    state: WorkerState,
    current: Option<Request>,
    remaining_time: u32,
    // --- Counters ---
    requests_served: u64,
    busy_ticks: u64,
}

impl Worker {
    /// Create an idle worker.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            current: None,
            remaining_time: 0,
            requests_served: 0,
            busy_ticks: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Ticks left on the current request (0 when idle).
    pub fn remaining_time(&self) -> u32 {
        self.remaining_time
    }

    pub fn current_request(&self) -> Option<&Request> {
        self.current.as_ref()
    }

    /// Start serving `request`.
    ///
    /// On error the request is handed back untouched together with the reason.
    pub fn assign(&mut self, request: Request) -> Result<(), (WorkerError, Request)> {
        if self.state == WorkerState::Busy {
            return Err((WorkerError::Busy { worker_id: self.id }, request));
        }
        if request.service_time() == 0 {
            let err = WorkerError::ZeroServiceTime {
                worker_id: self.id,
                request_id: request.id(),
            };
            return Err((err, request));
        }
        self.remaining_time = request.service_time();
        self.current = Some(request);
        self.state = WorkerState::Busy;
        Ok(())
    }

    /// Advance one tick. Returns the request if it completed on this tick.
    ///
    /// A no-op on an idle worker.
    pub fn tick(&mut self) -> Option<Request> {
        if self.state != WorkerState::Busy || self.remaining_time == 0 {
            return None;
        }
        self.remaining_time -= 1;
        self.busy_ticks += 1;
        if self.remaining_time > 0 {
            return None;
        }
        self.state = WorkerState::Idle;
        self.requests_served += 1;
        self.current.take()
    }

    /// Tear the worker down, surrendering any in-flight request.
    pub fn shutdown(mut self) -> Option<Request> {
        self.current.take()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id,
            state: self.state,
            remaining_time: self.remaining_time,
            current_request: self.current.as_ref().map(Request::id),
            requests_served: self.requests_served,
            busy_ticks: self.busy_ticks,
        }
    }
}
