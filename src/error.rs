//! Error handling
//!
//! One crate-wide taxonomy. Detector and timeout errors are isolated to the
//! target they occurred on; corruption of persisted state is recoverable
//! (the owning subsystem rebuilds); lookups never surface an error at all,
//! they degrade to an `unknown` verdict.

use std::time::Duration;

pub type ScanResult<T> = Result<T, ScanError>;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// One detector failed for one target. Attached to that target's
    /// result; never aborts the scan.
    #[error("detector '{detector_id}' failed: {reason}")]
    Detector { detector_id: String, reason: String },

    /// A detector or remote call exceeded its deadline. Inconclusive;
    /// never coerced to clean or malicious.
    #[error("{what} timed out after {elapsed:?}")]
    Timeout { what: String, elapsed: Duration },

    /// Remote endpoint unreachable or returned a transport-level failure.
    /// Feeds the circuit breaker and triggers the local-DB fallback.
    #[error("network error: {0}")]
    Network(String),

    /// Persisted cache / bloom state failed an integrity check.
    /// The owning subsystem rebuilds from scratch.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The caller cancelled the scan. Remaining targets are reported as
    /// cancelled, in-flight ones as incomplete.
    #[error("scan cancelled by caller")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ScanError {
    pub fn detector(detector_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Detector {
            detector_id: detector_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    /// Inconclusive outcomes (timeouts, cancellation) must not be treated
    /// as evidence in either direction.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScanError::Timeout {
                what: "remote lookup".to_string(),
                elapsed: Duration::ZERO,
            }
        } else {
            ScanError::Network(e.to_string())
        }
    }
}
