//! Missing-content circuit breaker.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{Result, ScrapeError};

/// Missing pages tolerated when the tolerance is 0%.
pub const ZERO_TOLERANCE_ALLOWANCE: usize = 3;

/// Pages that answered 404, measured against the expected content.
#[derive(Debug, Default)]
pub struct MissingTracker {
    missing: HashSet<String>,
    expected: usize,
    tolerance: Option<u8>,
}

impl MissingTracker {
    /// `tolerance` is a percentage of the expected content; `None` never trips.
    pub fn new(tolerance: Option<u8>) -> Self {
        Self {
            missing: HashSet::new(),
            expected: 0,
            tolerance: tolerance.map(|t| t.min(100)),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Raise the expected count; it never goes down.
    pub fn expect_at_least(&mut self, expected: usize) {
        self.expected = self.expected.max(expected);
    }

    pub fn missing(&self) -> usize {
        self.missing.len()
    }

    /// Record a 404. Fails on the call that pushes the ratio past the tolerance.
    pub fn record_missing(&mut self, url: &str) -> Result<()> {
        if self.missing.insert(url.to_string()) {
            warn!("Missing page {} ({} so far)", url, self.missing.len());
        }
        self.check()
    }

    pub fn check(&self) -> Result<()> {
        let Some(tolerance) = self.tolerance else {
            return Ok(());
        };
        let missing = self.missing.len();
        let exceeded = if tolerance == 0 {
            missing > ZERO_TOLERANCE_ALLOWANCE
        } else {
            missing * 100 > usize::from(tolerance) * self.expected.max(1)
        };
        if exceeded {
            return Err(ScrapeError::MissingThresholdExceeded {
                missing,
                expected: self.expected,
                tolerance,
            });
        }
        Ok(())
    }
}
