//! Scan Orchestrator
//!
//! Schedules detector execution across many targets under a bounded worker
//! pool, applies the early-exit cost policy using interim decision-engine
//! output, and emits per-target results as a finite stream.

pub mod cancel;
pub mod scanner;
mod types;

pub use cancel::CancellationToken;
pub use scanner::ScanOrchestrator;
pub use types::{DetectorFailure, ScanStatus, TargetScanResult};
