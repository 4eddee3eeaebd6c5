//! Synthetic request generation.
//!
//! Produces the requests that seed the initial backlog and arrive during the
//! run. Addresses are random dotted quads, the job class is a fair coin, and
//! the service time is drawn from the class's own tick range.

use crate::random::RandomSource;
use crate::request::{JobClass, Request};
use serde::{Deserialize, Serialize};

/// Inclusive range of service ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRange {
    pub low: u32,
    pub high: u32,
}

impl TickRange {
    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// Whether the range is usable as a service-time distribution.
    pub fn is_valid(&self) -> bool {
        self.low >= 1 && self.low <= self.high
    }
}

/// Builds synthetic [`Request`]s from a [`RandomSource`].
#[derive(Debug, Clone)]
pub struct RequestGenerator {
    streaming: TickRange,
    batch: TickRange,
    next_id: u64,
}

impl RequestGenerator {
    pub fn new(streaming: TickRange, batch: TickRange) -> Self {
        Self {
            streaming,
            batch,
            next_id: 0,
        }
    }

    /// Draw one request arriving at `tick`.
    ///
    /// Draw order is origin (4 octets), destination (4 octets), job class,
    /// then service time.
    pub fn generate(&mut self, rng: &mut dyn RandomSource, tick: u64) -> Request {
        let origin = random_address(rng);
        let destination = random_address(rng);

        let job_class = if rng.next_in_range(0, 1) == 0 {
            JobClass::Streaming
        } else {
            JobClass::Batch
        };
        let range = match job_class {
            JobClass::Streaming => self.streaming,
            JobClass::Batch => self.batch,
        };
        let service_time = rng.next_in_range(range.low, range.high);

        let id = self.next_id;
        self.next_id += 1;
        Request::new(id, origin, destination, job_class, service_time, tick)
    }
}

/// Random IPv4-style address, each octet uniform over `0..=255`.
pub fn random_address(rng: &mut dyn RandomSource) -> String {
    let octets: [u32; 4] = std::array::from_fn(|_| rng.next_in_range(0, 255));
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}
