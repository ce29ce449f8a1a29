// crates/pipeline-ledger-core/src/core/time.rs
// ============================================================================
// Module: Pipeline Ledger Time Model
// Description: Unix-millisecond timestamps for task and operation records.
// Purpose: Provide a single comparable time value across stored records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Ledger records carry explicit unix-millisecond timestamps. The core never
//! reads wall-clock time; backends stamp records when they write them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per minute, used for duration reporting.
pub const MILLIS_PER_MINUTE: f64 = 60_000.0;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix epoch timestamp in milliseconds.
///
/// # Invariants
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the elapsed milliseconds from `earlier` to `self`.
    ///
    /// Negative spans (clock skew between writes) are reported as zero.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn millis_since_clamps_negative_spans() {
        let early = Timestamp::from_unix_millis(1_000);
        let late = Timestamp::from_unix_millis(4_500);
        assert_eq!(late.millis_since(early), 3_500);
        assert_eq!(early.millis_since(late), 0);
    }
}
