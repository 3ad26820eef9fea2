//! Detectors
//!
//! All detector kinds (signature, heuristic, behavioral, ML-based) conform
//! to the single `Detect` contract; the orchestrator treats them uniformly
//! through the registry and never sees their internals.

pub mod registry;
pub mod reputation;

use async_trait::async_trait;

use crate::error::ScanResult;
use crate::model::{Finding, ScanTarget};

/// Relative execution cost. Cheap detectors run first and feed the interim
/// assessment that decides whether expensive ones run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetectorCost {
    Cheap,
    Expensive,
}

impl DetectorCost {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorCost::Cheap => "cheap",
            DetectorCost::Expensive => "expensive",
        }
    }
}

/// One pluggable detection capability.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable identifier, attached to every finding and error.
    fn id(&self) -> &str;

    fn cost(&self) -> DetectorCost;

    /// Tie-break within one cost class; lower runs earlier.
    fn priority(&self) -> u8 {
        100
    }

    /// Examine one target. Errors are isolated to this target.
    async fn detect(&self, target: &ScanTarget) -> ScanResult<Vec<Finding>>;
}

pub use registry::DetectorRegistry;
pub use reputation::ReputationDetector;
