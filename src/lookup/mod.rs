//! Fast Lookup Subsystem
//!
//! Bloom-prefiltered, multi-layer cached indicator lookups with a
//! circuit-breaker-protected remote client and a local exhaustive-database
//! fallback. Target p95 for the common case is < 20ms.
//!
//! Resolution chain: bloom -> L1 -> L2 -> L3 -> remote (breaker) ->
//! local DB -> `unknown`.

pub mod bloom;
pub mod breaker;
pub mod cache;
pub mod remote;
pub mod service;
pub mod store;

pub use bloom::{BloomDelta, BloomFilter};
pub use breaker::{BreakerState, CircuitBreaker};
pub use cache::{LruCache, ShardedTtlCache};
pub use remote::{HashLookupResponse, HttpRemoteClient, IocVerdict, RemoteLookup};
pub use service::{LookupService, LookupStatsSnapshot};
pub use store::{DurableCache, KnownHash, LocalThreatDb};
