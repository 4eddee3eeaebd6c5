//! Admission filtering by origin address.
//!
//! The only thing the filter looks at is the first dotted component of the
//! origin address. If it parses as an octet inside the configured blocked
//! range the request is turned away; if it does not parse at all the request
//! is turned away with a separate reason so the two cases can be told apart.

use crate::request::Request;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request was refused entry to the pending queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("origin octet {octet} is inside blocked range {range}")]
    BlockedRange { octet: u8, range: OctetRange },
    #[error("malformed origin address {address:?}")]
    MalformedAddress { address: String },
}

/// Inclusive range over the first address octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctetRange {
    pub low: u8,
    pub high: u8,
}

impl OctetRange {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, octet: u8) -> bool {
        (self.low..=self.high).contains(&octet)
    }
}

impl std::fmt::Display for OctetRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Decides whether a request may enter the pending queue.
pub trait AdmissionFilter {
    fn check(&self, request: &Request) -> Result<(), RejectReason>;
}

/// Rejects requests whose origin's leading octet falls in a blocked range.
#[derive(Debug, Clone)]
pub struct BlockedRangeFilter {
    range: OctetRange,
}

impl BlockedRangeFilter {
    pub fn new(range: OctetRange) -> Self {
        Self { range }
    }
}

impl AdmissionFilter for BlockedRangeFilter {
    fn check(&self, request: &Request) -> Result<(), RejectReason> {
        let address = request.origin();
        let octet = leading_octet(address).ok_or_else(|| RejectReason::MalformedAddress {
            address: address.to_string(),
        })?;
        if self.range.contains(octet) {
            return Err(RejectReason::BlockedRange {
                octet,
                range: self.range,
            });
        }
        Ok(())
    }
}

/// Parse the first dotted component of `address` as an octet.
pub fn leading_octet(address: &str) -> Option<u8> {
    let first = address.split('.').next()?;
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    first.parse().ok()
}
