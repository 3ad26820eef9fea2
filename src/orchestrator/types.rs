//! Orchestrator result types.

use crate::error::ScanError;
use crate::model::{Finding, RiskAssessment};

/// How one target's scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// All scheduled detector stages ran (individual detectors may still
    /// have failed; see `errors`).
    Completed,
    /// Stopped early: cancellation mid-target, target timeout, or the
    /// grace period expired while this target was in flight.
    Incomplete,
    /// Cancelled before any detector ran for this target.
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Incomplete => "incomplete",
            ScanStatus::Cancelled => "cancelled",
        }
    }
}

/// One detector-level failure, isolated to its target.
#[derive(Debug)]
pub struct DetectorFailure {
    pub detector_id: String,
    pub error: ScanError,
}

/// Everything the scan produced for one target.
#[derive(Debug)]
pub struct TargetScanResult {
    pub target_id: String,
    pub status: ScanStatus,
    /// Absent when the target was cancelled before assessment.
    pub assessment: Option<RiskAssessment>,
    pub findings: Vec<Finding>,
    pub errors: Vec<DetectorFailure>,
    /// Whether the expensive detector stage ran.
    pub escalated: bool,
}

impl TargetScanResult {
    pub fn cancelled(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            status: ScanStatus::Cancelled,
            assessment: None,
            findings: Vec::new(),
            errors: Vec::new(),
            escalated: false,
        }
    }

    pub fn incomplete(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            status: ScanStatus::Incomplete,
            assessment: None,
            findings: Vec::new(),
            errors: Vec::new(),
            escalated: false,
        }
    }
}
