//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To change the default lookup server or tuning knobs, only edit this file.

use std::path::PathBuf;

/// Default Remote Lookup API base URL
///
/// This is the fallback URL when no environment variable is set.
pub const DEFAULT_LOOKUP_URL: &str = "https://intel.scanshield.io";

/// Client-side timeout for one remote lookup call (ms)
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 50;

/// Consecutive remote failures before the circuit breaker opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker cooldown window (ms)
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Scan worker pool size (targets scanned in parallel)
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Interim score at or above which expensive detectors run
pub const DEFAULT_DEEP_SCAN_THRESHOLD: f32 = 40.0;

/// Timeout for a single detector invocation (ms)
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 2_000;

/// Timeout for one whole target, all stages included (ms)
pub const DEFAULT_TARGET_TIMEOUT_MS: u64 = 10_000;

/// Grace period granted to in-flight targets after cancellation (ms)
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 500;

/// L1 in-process LRU capacity
pub const DEFAULT_L1_CAPACITY: usize = 1_024;

/// L2 sharded cache capacity (per shard)
pub const DEFAULT_L2_SHARD_CAPACITY: usize = 4_096;

/// Number of L2 shards
pub const L2_SHARD_COUNT: usize = 16;

/// Bloom filter target capacity (expected known-clean keys)
pub const DEFAULT_BLOOM_CAPACITY: usize = 100_000;

/// Bloom filter target false-positive rate
pub const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// Confidence attached to a bloom-filter "known clean" hit
pub const BLOOM_CLEAN_CONFIDENCE: f32 = 0.85;

/// TTL for cached verdicts resolved from remote / local DB (secs)
pub const DEFAULT_VERDICT_TTL_SECS: u64 = 6 * 60 * 60;

/// Short TTL for cached `unknown` results (secs)
pub const DEFAULT_UNKNOWN_TTL_SECS: u64 = 60;

/// Internal fan-out width for batch lookups
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;

/// Maintenance sweep interval (secs)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "ScanShield";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get the remote lookup URL from environment or use default
pub fn get_lookup_url() -> String {
    std::env::var("SCANSHIELD_LOOKUP_URL").unwrap_or_else(|_| DEFAULT_LOOKUP_URL.to_string())
}

/// Get the directory for persisted state (bloom filter, L3 cache)
pub fn get_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SCANSHIELD_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scanshield")
}
