//! Shared Data Model
//!
//! Types flowing between the orchestrator, the decision engine and the
//! lookup subsystem. No logic beyond constructors and small helpers.

mod types;

pub use types::{
    EvidenceCategory, Finding, LookupEntry, RecommendedAction, RiskAssessment, ScanTarget,
    Severity, SourceLayer, TargetKind, Verdict,
};
