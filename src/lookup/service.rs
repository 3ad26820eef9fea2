//! Lookup Service
//!
//! One explicitly constructed service owns the bloom filter, the three
//! cache layers, the circuit breaker and the remote client. Explicit
//! lifecycle: `open` -> `lookup`/`batch_lookup` -> `flush`/`shutdown`.
//! Never a global.
//!
//! Consistency: fresh verdicts are written through L1+L2+L3 under one
//! stack lock, and promotions take the same lock, so a reader walking
//! L1 -> L2 -> L3 can never observe a half-updated stack.
//!
//! A lookup never returns an error and never hangs: if the whole chain
//! misses, the answer is an `unknown` verdict cached only with a short TTL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::LookupConfig;
use crate::constants::BLOOM_CLEAN_CONFIDENCE;
use crate::error::ScanResult;
use crate::model::{LookupEntry, SourceLayer, Verdict};

use super::bloom::{BloomDelta, BloomFilter};
use super::breaker::CircuitBreaker;
use super::cache::{LruCache, ShardedTtlCache};
use super::remote::{HttpRemoteClient, IocVerdict, RemoteLookup};
use super::store::{DurableCache, LocalThreatDb};
use crate::constants::L2_SHARD_COUNT;

const BLOOM_FILE: &str = "bloom_v1.bin";
const L3_FILE: &str = "l3_cache_v1.db";
const THREAT_DB_FILE: &str = "threat_db_v1.db";

// ============================================================================
// STATS
// ============================================================================

#[derive(Default)]
struct LookupStats {
    bloom_hits: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,
    remote_calls: AtomicU64,
    remote_failures: AtomicU64,
    local_db_hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time counter snapshot, for status reporting and tests.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LookupStatsSnapshot {
    pub bloom_hits: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub remote_calls: u64,
    pub remote_failures: u64,
    pub local_db_hits: u64,
    pub misses: u64,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct LookupService {
    config: LookupConfig,
    bloom: RwLock<BloomFilter>,
    l1: Mutex<LruCache>,
    l2: ShardedTtlCache,
    l3: DurableCache,
    local_db: LocalThreatDb,
    breaker: CircuitBreaker,
    remote: Arc<dyn RemoteLookup>,
    /// Serializes write-through and promotion so the layer stack is always
    /// consistent for readers.
    stack_lock: Mutex<()>,
    /// Concurrency budget for batch fan-out; may be shared with the scan
    /// orchestrator.
    limiter: Arc<Semaphore>,
    stats: LookupStats,
    bloom_path: Option<PathBuf>,
}

impl LookupService {
    /// Open with the stock HTTP client.
    pub fn with_default_client(config: LookupConfig) -> ScanResult<Arc<Self>> {
        let remote = Arc::new(HttpRemoteClient::new(config.remote.clone())?);
        Self::open(config, remote)
    }

    /// Open with an injected remote client and a private concurrency budget.
    pub fn open(config: LookupConfig, remote: Arc<dyn RemoteLookup>) -> ScanResult<Arc<Self>> {
        let limiter = Arc::new(Semaphore::new(config.batch_concurrency.max(1)));
        Self::open_shared(config, remote, limiter)
    }

    /// Open sharing an external concurrency budget (one global budget keeps
    /// scan workers plus lookup fan-out bounded together). The budget must
    /// be larger than the scan worker pool, or a detector fanning out a
    /// batch lookup could wait on permits its own workers hold.
    pub fn open_shared(
        config: LookupConfig,
        remote: Arc<dyn RemoteLookup>,
        limiter: Arc<Semaphore>,
    ) -> ScanResult<Arc<Self>> {
        let bloom_path = config.state_dir.as_ref().map(|d| d.join(BLOOM_FILE));
        let l3_path = config.state_dir.as_ref().map(|d| d.join(L3_FILE));
        let db_path = config.state_dir.as_ref().map(|d| d.join(THREAT_DB_FILE));

        let bloom = Self::load_bloom(&config, bloom_path.as_deref());
        let l3 = DurableCache::open(l3_path)?;
        let local_db = LocalThreatDb::open(db_path)?;

        log::info!(
            "{} {} lookup service open: bloom {} keys / {} bits, L3 {} entries",
            crate::constants::APP_NAME,
            crate::constants::APP_VERSION,
            bloom.inserted_count(),
            bloom.bit_count(),
            l3.len().unwrap_or(0)
        );

        Ok(Arc::new(Self {
            l1: Mutex::new(LruCache::new(config.l1_capacity)),
            l2: ShardedTtlCache::new(L2_SHARD_COUNT, config.l2_shard_capacity),
            l3,
            local_db,
            breaker: CircuitBreaker::new(config.breaker.clone()),
            bloom: RwLock::new(bloom),
            remote,
            stack_lock: Mutex::new(()),
            limiter,
            stats: LookupStats::default(),
            bloom_path,
            config,
        }))
    }

    /// Load the persisted bloom image; corruption or version mismatch
    /// rebuilds an empty filter instead of failing.
    fn load_bloom(config: &LookupConfig, path: Option<&std::path::Path>) -> BloomFilter {
        if let Some(path) = path {
            match std::fs::read(path) {
                Ok(image) => match BloomFilter::deserialize(&image, config.bloom.fp_rate) {
                    Ok(filter) => return filter,
                    Err(e) => {
                        log::warn!("bloom filter image rejected ({e}), rebuilding empty");
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("bloom filter unreadable ({e}), rebuilding empty"),
            }
        }
        BloomFilter::from_config(&config.bloom)
    }

    // ========================================================================
    // LOOKUP CHAIN
    // ========================================================================

    /// Resolve one key. Short-circuits at the first layer with a confident
    /// answer; infallible by design.
    pub async fn lookup(&self, key: &str) -> LookupEntry {
        // 1. Known-clean bloom prefilter. Positive carries the configured
        //    false-positive rate; negative is authoritative and the chain
        //    continues.
        if self.bloom.read().might_contain(key) {
            self.stats.bloom_hits.fetch_add(1, Ordering::Relaxed);
            return LookupEntry::new(
                key,
                Verdict::Clean,
                BLOOM_CLEAN_CONFIDENCE,
                self.config.verdict_ttl,
            )
            .from_layer(SourceLayer::Bloom);
        }

        // 2. L1, the top layer; a hit promotes nothing.
        if let Some(entry) = self.l1.lock().get(key) {
            self.stats.l1_hits.fetch_add(1, Ordering::Relaxed);
            return entry.from_layer(SourceLayer::L1);
        }

        // 3. L2; a hit promotes into L1.
        if let Some(entry) = self.l2.get(key) {
            self.stats.l2_hits.fetch_add(1, Ordering::Relaxed);
            let _stack = self.stack_lock.lock();
            self.l1.lock().put(key, entry.clone());
            return entry.from_layer(SourceLayer::L2);
        }

        // 4. L3; a hit promotes into L1 and L2.
        if let Ok(Some(entry)) = self.l3.get(key) {
            self.stats.l3_hits.fetch_add(1, Ordering::Relaxed);
            let _stack = self.stack_lock.lock();
            self.l1.lock().put(key, entry.clone());
            self.l2.put(key, entry.clone());
            return entry.from_layer(SourceLayer::L3);
        }

        // 5. Remote, if the breaker admits the call.
        if self.breaker.allow_request() {
            self.stats.remote_calls.fetch_add(1, Ordering::Relaxed);
            match self.remote.lookup_hash(key).await {
                Ok(resp) => {
                    self.breaker.record_success();
                    // Even a remote-confirmed `unknown` only gets the short
                    // TTL, so a later real verdict is not masked.
                    let ttl = if resp.verdict == Verdict::Unknown {
                        self.config.unknown_ttl
                    } else if resp.ttl > 0 {
                        Duration::from_secs(resp.ttl)
                    } else {
                        self.config.verdict_ttl
                    };
                    let entry = LookupEntry::new(key, resp.verdict, resp.confidence, ttl)
                        .from_layer(SourceLayer::Remote);
                    self.write_through(&entry);
                    if resp.verdict == Verdict::Clean {
                        self.bloom.write().insert(key);
                    }
                    return entry;
                }
                Err(e) => {
                    self.stats.remote_failures.fetch_add(1, Ordering::Relaxed);
                    self.breaker.record_failure();
                    log::debug!("remote lookup for {key} failed: {e}");
                }
            }
        }

        // 6. Local exhaustive database fallback.
        match self.local_db.lookup(key) {
            Ok(Some(known)) => {
                self.stats.local_db_hits.fetch_add(1, Ordering::Relaxed);
                let entry = LookupEntry::new(
                    key,
                    known.verdict,
                    known.confidence,
                    self.config.verdict_ttl,
                )
                .from_layer(SourceLayer::LocalDb);
                self.write_through(&entry);
                return entry;
            }
            Ok(None) => {}
            Err(e) => log::warn!("local threat db lookup failed: {e}"),
        }

        // 7. Everything missed. Cache the negative answer only briefly so a
        //    later real verdict is not masked.
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let entry = LookupEntry::new(key, Verdict::Unknown, 0.5, self.config.unknown_ttl)
            .from_layer(SourceLayer::Miss);
        self.write_through(&entry);
        entry
    }

    /// Resolve many keys with bounded internal fan-out. A failure on one
    /// key never fails the batch; results are per-key.
    pub async fn batch_lookup(self: &Arc<Self>, keys: &[String]) -> HashMap<String, LookupEntry> {
        let mut set = JoinSet::new();
        for key in keys {
            let service = Arc::clone(self);
            let limiter = Arc::clone(&self.limiter);
            let key = key.clone();
            set.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let entry = service.lookup(&key).await;
                (key, entry)
            });
        }

        let mut results = HashMap::with_capacity(keys.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((key, entry)) => {
                    results.insert(key, entry);
                }
                Err(e) => log::error!("batch lookup task failed: {e}"),
            }
        }
        results
    }

    /// Raw IOC reputation over `POST /v1/ioc/lookup`, with the same breaker
    /// accounting as hash lookups.
    pub async fn lookup_iocs(&self, iocs: &[String]) -> ScanResult<Vec<IocVerdict>> {
        if !self.breaker.allow_request() {
            return Err(crate::error::ScanError::Network(
                "circuit breaker open".to_string(),
            ));
        }
        self.stats.remote_calls.fetch_add(1, Ordering::Relaxed);
        match self.remote.lookup_iocs(iocs).await {
            Ok(results) => {
                self.breaker.record_success();
                Ok(results)
            }
            Err(e) => {
                self.stats.remote_failures.fetch_add(1, Ordering::Relaxed);
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    /// One logical write across all three layers.
    fn write_through(&self, entry: &LookupEntry) {
        let _stack = self.stack_lock.lock();
        self.l1.lock().put(&entry.key, entry.clone());
        self.l2.put(&entry.key, entry.clone());
        if let Err(e) = self.l3.put(entry) {
            log::warn!("L3 write-through for {} failed: {e}", entry.key);
        }
    }

    // ========================================================================
    // FEED + LIFECYCLE
    // ========================================================================

    /// Apply an append-only known-clean delta from the external feed.
    pub fn apply_delta(&self, delta: &BloomDelta) -> ScanResult<usize> {
        let added = self.bloom.write().apply_delta(delta)?;
        log::info!("bloom delta applied: {added} new known-clean keys");
        Ok(added)
    }

    /// Access to the local exhaustive database (signature distribution
    /// loading lives outside this subsystem).
    pub fn local_db(&self) -> &LocalThreatDb {
        &self.local_db
    }

    pub fn breaker_state(&self) -> super::breaker::BreakerState {
        self.breaker.state()
    }

    pub fn stats(&self) -> LookupStatsSnapshot {
        LookupStatsSnapshot {
            bloom_hits: self.stats.bloom_hits.load(Ordering::Relaxed),
            l1_hits: self.stats.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.stats.l2_hits.load(Ordering::Relaxed),
            l3_hits: self.stats.l3_hits.load(Ordering::Relaxed),
            remote_calls: self.stats.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.stats.remote_failures.load(Ordering::Relaxed),
            local_db_hits: self.stats.local_db_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries from every in-process layer and the L3 store.
    pub fn sweep_expired(&self) -> usize {
        let mut removed = self.l1.lock().sweep_expired();
        removed += self.l2.sweep_expired();
        match self.l3.sweep_expired() {
            Ok(n) => removed += n,
            Err(e) => log::warn!("L3 sweep failed: {e}"),
        }
        removed
    }

    /// Persist the bloom filter image.
    pub fn flush(&self) -> ScanResult<()> {
        if let Some(path) = &self.bloom_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let image = self.bloom.read().serialize();
            std::fs::write(path, image)?;
        }
        Ok(())
    }

    /// Final sweep + flush. Call before dropping the service.
    pub fn shutdown(&self) -> ScanResult<()> {
        let removed = self.sweep_expired();
        log::info!("lookup service shutdown: {removed} expired entries swept");
        self.flush()
    }

    /// Background maintenance: periodic expiry sweep + bloom flush, on the
    /// configured `sweep_interval`. The task holds only a weak reference
    /// and exits once the service drops.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else { break };
                let removed = service.sweep_expired();
                if removed > 0 {
                    log::debug!("maintenance sweep removed {removed} expired entries");
                }
                if let Err(e) = service.flush() {
                    log::warn!("maintenance flush failed: {e}");
                }
            }
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
