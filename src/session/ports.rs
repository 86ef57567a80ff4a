//! Host port allocation for session sandboxes.
//!
//! The allocator is stateless: the set of ports in use is rebuilt from
//! the live session table on every call, so there is nothing to persist
//! and nothing to drift. Callers serialize allocation against insertion
//! (the orchestrator holds its registry write lock across both), which
//! is what makes claim-then-insert atomic.

use std::collections::BTreeSet;

use crate::error::Error;

/// Inclusive range of host ports scanned for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First candidate port
    pub start: u16,
    /// Last candidate port, inclusive
    pub end: u16,
}

impl PortRange {
    /// Creates a range covering `start..=end`.
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Number of ports in the range.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    /// True when the range contains no ports at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the lowest port in `range` not present in `used`.
///
/// Scans ascending so freed ports are reused from the bottom of the
/// range. Fails with [`Error::ResourceExhausted`] when every candidate
/// is taken.
pub fn first_free(range: PortRange, used: &BTreeSet<u16>) -> Result<u16, Error> {
    (range.start..=range.end)
        .find(|port| !used.contains(port))
        .ok_or_else(|| Error::resource_exhausted(range.start, range.end))
}
