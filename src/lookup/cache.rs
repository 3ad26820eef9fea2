//! In-Process Cache Layers
//!
//! L1: bounded LRU with O(1) get/put (hash map over an index-linked list).
//! L2: larger sharded map with TTL eviction; shards keep writer contention
//! off the hot read path.
//!
//! Both layers evict expired entries lazily on access; the service's
//! maintenance task sweeps them periodically.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

use crate::model::LookupEntry;

const NIL: usize = usize::MAX;

// ============================================================================
// L1: LRU
// ============================================================================

struct LruNode {
    key: String,
    entry: LookupEntry,
    prev: usize,
    next: usize,
}

/// Bounded LRU over lookup entries. Not internally synchronized; the
/// service wraps it in a mutex.
pub struct LruCache {
    capacity: usize,
    map: HashMap<String, usize>,
    nodes: Vec<LruNode>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get a live entry and mark it most-recently-used.
    /// Expired entries are evicted and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<LookupEntry> {
        let idx = *self.map.get(key)?;
        if self.nodes[idx].entry.is_expired() {
            self.remove(key);
            return None;
        }
        self.detach(idx);
        self.push_front(idx);
        Some(self.nodes[idx].entry.clone())
    }

    /// Insert or replace; evicts the least-recently-used entry at capacity.
    pub fn put(&mut self, key: &str, entry: LookupEntry) {
        if let Some(&idx) = self.map.get(key) {
            self.nodes[idx].entry = entry;
            self.detach(idx);
            self.push_front(idx);
            return;
        }

        if self.map.len() >= self.capacity {
            self.evict_lru();
        }

        let node = LruNode {
            key: key.to_string(),
            entry,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.map.insert(key.to_string(), idx);
        self.push_front(idx);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.map.remove(key) {
            Some(idx) => {
                self.detach(idx);
                self.free.push(idx);
                true
            }
            None => false,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, &idx)| self.nodes[idx].entry.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_lru(&mut self) {
        if self.tail != NIL {
            let key = self.nodes[self.tail].key.clone();
            self.remove(&key);
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        } else if self.head == idx {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else if self.tail == idx {
            self.tail = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

// ============================================================================
// L2: SHARDED TTL MAP
// ============================================================================

/// Larger secondary cache. Sharded so concurrent lookups from the scan
/// worker pool don't serialize on one lock.
pub struct ShardedTtlCache {
    shards: Vec<RwLock<HashMap<String, LookupEntry>>>,
    shard_capacity: usize,
}

impl ShardedTtlCache {
    pub fn new(shard_count: usize, shard_capacity: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            shard_capacity: shard_capacity.max(1),
        }
    }

    fn shard_for(&self, key: &str) -> &RwLock<HashMap<String, LookupEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn get(&self, key: &str) -> Option<LookupEntry> {
        let shard = self.shard_for(key);
        let hit = shard.read().get(key).cloned();
        match hit {
            Some(entry) if entry.is_expired() => {
                shard.write().remove(key);
                None
            }
            other => other,
        }
    }

    pub fn put(&self, key: &str, entry: LookupEntry) {
        let shard = self.shard_for(key);
        let mut guard = shard.write();
        if guard.len() >= self.shard_capacity && !guard.contains_key(key) {
            // Expired entries go first; otherwise drop the oldest write.
            guard.retain(|_, e| !e.is_expired());
            if guard.len() >= self.shard_capacity {
                if let Some(oldest) = guard
                    .iter()
                    .min_by_key(|(_, e)| e.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    guard.remove(&oldest);
                }
            }
        }
        guard.insert(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) {
        self.shard_for(key).write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut guard = shard.write();
            let before = guard.len();
            guard.retain(|_, e| !e.is_expired());
            removed += before - guard.len();
        }
        removed
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verdict;
    use std::time::Duration;

    fn entry(key: &str, ttl_secs: u64) -> LookupEntry {
        LookupEntry::new(key, Verdict::Clean, 0.9, Duration::from_secs(ttl_secs))
    }

    fn expired_entry(key: &str) -> LookupEntry {
        let mut e = entry(key, 60);
        e.cached_at = chrono::Utc::now() - chrono::Duration::seconds(120);
        e
    }

    #[test]
    fn lru_get_put_round_trip() {
        let mut lru = LruCache::new(4);
        lru.put("a", entry("a", 60));
        let hit = lru.get("a").unwrap();
        assert_eq!(hit.verdict, Verdict::Clean);
        assert!(lru.get("b").is_none());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut lru = LruCache::new(2);
        lru.put("a", entry("a", 60));
        lru.put("b", entry("b", 60));
        // Touch "a" so "b" becomes LRU.
        lru.get("a");
        lru.put("c", entry("c", 60));
        assert!(lru.get("a").is_some());
        assert!(lru.get("b").is_none());
        assert!(lru.get("c").is_some());
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn lru_replaces_existing_key_without_eviction() {
        let mut lru = LruCache::new(2);
        lru.put("a", entry("a", 60));
        lru.put("b", entry("b", 60));
        let mut updated = entry("a", 60);
        updated.verdict = Verdict::Malicious;
        lru.put("a", updated);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get("a").unwrap().verdict, Verdict::Malicious);
        assert!(lru.get("b").is_some());
    }

    #[test]
    fn lru_expired_entry_is_a_miss() {
        let mut lru = LruCache::new(4);
        lru.put("a", expired_entry("a"));
        assert!(lru.get("a").is_none());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn lru_slot_reuse_after_remove() {
        let mut lru = LruCache::new(3);
        for round in 0..10 {
            let key = format!("k{round}");
            lru.put(&key, entry(&key, 60));
            if round % 2 == 0 {
                lru.remove(&key);
            }
        }
        assert!(lru.len() <= 3);
        // Internal slab never needs to outgrow capacity by much.
        assert!(lru.nodes.len() <= 4);
    }

    #[test]
    fn lru_sweep_removes_only_expired() {
        let mut lru = LruCache::new(8);
        lru.put("live", entry("live", 60));
        lru.put("dead1", expired_entry("dead1"));
        lru.put("dead2", expired_entry("dead2"));
        assert_eq!(lru.sweep_expired(), 2);
        assert_eq!(lru.len(), 1);
        assert!(lru.get("live").is_some());
    }

    #[test]
    fn sharded_cache_round_trip_and_remove() {
        let cache = ShardedTtlCache::new(4, 16);
        cache.put("x", entry("x", 60));
        assert!(cache.get("x").is_some());
        cache.remove("x");
        assert!(cache.get("x").is_none());
    }

    #[test]
    fn sharded_cache_expired_is_a_miss() {
        let cache = ShardedTtlCache::new(4, 16);
        cache.put("x", expired_entry("x"));
        assert!(cache.get("x").is_none());
    }

    #[test]
    fn sharded_cache_respects_shard_capacity() {
        let cache = ShardedTtlCache::new(1, 8);
        for i in 0..32 {
            cache.put(&format!("k{i}"), entry("k", 60));
        }
        assert!(cache.len() <= 8);
    }

    #[test]
    fn sharded_cache_sweep() {
        let cache = ShardedTtlCache::new(4, 16);
        cache.put("live", entry("live", 60));
        cache.put("dead", expired_entry("dead"));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
