//! ScanShield Core - On-Device Threat Detection Pipeline
//!
//! Scans inventory targets against a battery of pluggable detectors,
//! aggregates their findings into one deterministic risk verdict, and
//! resolves indicator lookups through a bloom-prefiltered, multi-layer
//! cache backed by a circuit-breaker-protected remote client.
//!
//! Subsystems:
//! - [`orchestrator`]: bounded-concurrency scan scheduling with
//!   cancellation and an early-exit cost policy
//! - [`decision`]: pure findings-to-verdict scoring
//! - [`lookup`]: the fast lookup chain (bloom / L1 / L2 / L3 / remote /
//!   local DB)
//! - [`detector`]: the pluggable detection capability and registry
//!
//! The UI, auth, platform inventory collection and concrete detector
//! content live outside this crate; only their interfaces appear here.

pub mod config;
pub mod constants;
pub mod decision;
pub mod detector;
pub mod error;
pub mod lookup;
pub mod model;
pub mod orchestrator;

pub use config::{BloomConfig, BreakerConfig, LookupConfig, RemoteConfig, ScanOptions};
pub use decision::{assess, DecisionPolicy};
pub use detector::{Detector, DetectorCost, DetectorRegistry, ReputationDetector};
pub use error::{ScanError, ScanResult};
pub use lookup::{BloomDelta, LookupService};
pub use model::{
    EvidenceCategory, Finding, LookupEntry, RecommendedAction, RiskAssessment, ScanTarget,
    Severity, SourceLayer, TargetKind, Verdict,
};
pub use orchestrator::{CancellationToken, ScanOrchestrator, ScanStatus, TargetScanResult};
