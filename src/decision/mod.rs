//! Risk Decision Engine
//!
//! Turns heterogeneous detector findings for one target into a single
//! deterministic `RiskAssessment`. Pure functions only: no locks, no I/O,
//! no dependency on the concurrency machinery.

pub mod engine;
pub mod rules;

pub use engine::{assess, assess_with_policy};
pub use rules::DecisionPolicy;
