//! Engine configuration
//!
//! Every tunable is carried by an explicit config struct injected at
//! construction time. Defaults come from `constants.rs`; nothing reads
//! ambient global state after construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

/// Remote lookup endpoint settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Client-side timeout for one call, independent of breaker state.
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: constants::get_lookup_url(),
            timeout: Duration::from_millis(constants::DEFAULT_REMOTE_TIMEOUT_MS),
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing one probe.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_millis(constants::DEFAULT_COOLDOWN_MS),
        }
    }
}

/// Bloom filter sizing.
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// Expected number of known-clean keys.
    pub capacity: usize,
    /// Target false-positive rate.
    pub fp_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_BLOOM_CAPACITY,
            fp_rate: constants::DEFAULT_BLOOM_FP_RATE,
        }
    }
}

/// Fast Lookup Subsystem configuration.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub l1_capacity: usize,
    pub l2_shard_capacity: usize,
    /// TTL for verdicts resolved from remote or the local DB.
    pub verdict_ttl: Duration,
    /// Short TTL for `unknown` results; never cached long-term.
    pub unknown_ttl: Duration,
    /// Internal fan-out width for batch lookups.
    pub batch_concurrency: usize,
    /// Interval between background expiry sweeps.
    pub sweep_interval: Duration,
    pub bloom: BloomConfig,
    pub breaker: BreakerConfig,
    pub remote: RemoteConfig,
    /// Directory for persisted state (bloom bit-array, L3 database).
    /// `None` keeps everything in memory (used by tests).
    pub state_dir: Option<PathBuf>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            l1_capacity: constants::DEFAULT_L1_CAPACITY,
            l2_shard_capacity: constants::DEFAULT_L2_SHARD_CAPACITY,
            verdict_ttl: Duration::from_secs(constants::DEFAULT_VERDICT_TTL_SECS),
            unknown_ttl: Duration::from_secs(constants::DEFAULT_UNKNOWN_TTL_SECS),
            batch_concurrency: constants::DEFAULT_LOOKUP_CONCURRENCY,
            sweep_interval: Duration::from_secs(constants::DEFAULT_SWEEP_INTERVAL_SECS),
            bloom: BloomConfig::default(),
            breaker: BreakerConfig::default(),
            remote: RemoteConfig::default(),
            state_dir: Some(constants::get_state_dir()),
        }
    }
}

impl LookupConfig {
    /// Fully in-memory configuration (no persisted state).
    pub fn in_memory() -> Self {
        Self {
            state_dir: None,
            ..Self::default()
        }
    }
}

/// Scan orchestrator options.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker pool size: targets scanned in parallel.
    pub batch_size: usize,
    /// Interim score at or above which expensive detectors run.
    pub deep_scan_threshold: f32,
    /// Deadline for a single detector invocation.
    pub detector_timeout: Duration,
    /// Deadline for one whole target, all stages included.
    pub target_timeout: Duration,
    /// How long in-flight targets may finish after cancellation.
    pub cancel_grace: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            deep_scan_threshold: constants::DEFAULT_DEEP_SCAN_THRESHOLD,
            detector_timeout: Duration::from_millis(constants::DEFAULT_DETECTOR_TIMEOUT_MS),
            target_timeout: Duration::from_millis(constants::DEFAULT_TARGET_TIMEOUT_MS),
            cancel_grace: Duration::from_millis(constants::DEFAULT_CANCEL_GRACE_MS),
        }
    }
}
