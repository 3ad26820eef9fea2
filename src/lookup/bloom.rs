//! Known-Clean Bloom Filter
//!
//! Probabilistic membership test over the known-clean key set.
//! Append-only (no removal), so an inserted key always tests positive and
//! false negatives are impossible by construction. False positives are
//! bounded by the configured rate `p`.
//!
//! Persistence is a compact binary image with a version tag and a CRC32
//! over the bit array; any mismatch on load is reported as corruption and
//! the caller rebuilds from scratch.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::BloomConfig;
use crate::error::{ScanError, ScanResult};

/// On-disk format version. Bump when the layout changes.
pub const BLOOM_FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"SSBF";
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8 + 4;

/// Append-only bloom filter over string keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Bit array, packed into u64 blocks.
    bits: Vec<u64>,
    /// Total number of bits `m`.
    m: u64,
    /// Number of hash functions `k`.
    k: u32,
    /// Keys inserted so far.
    inserted: u64,
    /// Configured target false-positive rate, kept for reporting.
    fp_rate: f64,
}

impl BloomFilter {
    /// Size a filter for `capacity` expected elements at false-positive
    /// rate `p`: `m = -n*ln(p) / (ln 2)^2`, `k = (m/n)*ln 2`.
    pub fn with_capacity(capacity: usize, fp_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let m = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * ln2).round().max(1.0) as u32;

        Self {
            bits: vec![0u64; m.div_ceil(64) as usize],
            m,
            k,
            inserted: 0,
            fp_rate: p,
        }
    }

    pub fn from_config(cfg: &BloomConfig) -> Self {
        Self::with_capacity(cfg.capacity, cfg.fp_rate)
    }

    /// Append a key. Never removes or flips bits back.
    pub fn insert(&mut self, key: &str) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.k as u64 {
            let bit = self.index(h1, h2, i);
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// Membership test. `false` is authoritative ("definitely not in the
    /// clean set"); `true` may be a false positive at rate <= `p`.
    pub fn might_contain(&self, key: &str) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        (0..self.k as u64).all(|i| {
            let bit = self.index(h1, h2, i);
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted
    }

    pub fn bit_count(&self) -> u64 {
        self.m
    }

    pub fn hash_count(&self) -> u32 {
        self.k
    }

    pub fn target_fp_rate(&self) -> f64 {
        self.fp_rate
    }

    /// Double hashing: derive k indices from two 64-bit halves of one
    /// SHA-256 digest. Deterministic across processes and restarts.
    fn hash_pair(key: &str) -> (u64, u64) {
        let digest = Sha256::digest(key.as_bytes());
        let h1 = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let h2 = u64::from_le_bytes(digest[8..16].try_into().unwrap());
        (h1, h2 | 1) // odd h2 so all m slots stay reachable
    }

    fn index(&self, h1: u64, h2: u64, i: u64) -> u64 {
        h1.wrapping_add(i.wrapping_mul(h2)) % self.m
    }

    // ========================================================================
    // DELTA FEED
    // ========================================================================

    /// Apply an append-only delta payload from the external feed.
    /// Returns the number of keys added.
    pub fn apply_delta(&mut self, delta: &BloomDelta) -> ScanResult<usize> {
        if delta.format_version != BLOOM_FORMAT_VERSION {
            return Err(ScanError::DataCorruption(format!(
                "bloom delta version {} != {}",
                delta.format_version, BLOOM_FORMAT_VERSION
            )));
        }
        if delta.checksum != delta.compute_checksum() {
            return Err(ScanError::DataCorruption(
                "bloom delta checksum mismatch".to_string(),
            ));
        }
        for key in &delta.keys {
            self.insert(key);
        }
        Ok(delta.keys.len())
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Serialize to the versioned binary image.
    pub fn serialize(&self) -> Vec<u8> {
        let byte_len = self.bits.len() * 8;
        let mut out = Vec::with_capacity(HEADER_LEN + byte_len);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&BLOOM_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.k.to_le_bytes());
        out.extend_from_slice(&self.m.to_le_bytes());
        out.extend_from_slice(&self.inserted.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        for block in &self.bits {
            hasher.update(&block.to_le_bytes());
        }
        out.extend_from_slice(&hasher.finalize().to_le_bytes());

        for block in &self.bits {
            out.extend_from_slice(&block.to_le_bytes());
        }
        out
    }

    /// Deserialize a binary image. Any structural or integrity failure is
    /// `DataCorruption`; the caller decides to rebuild.
    pub fn deserialize(data: &[u8], fp_rate: f64) -> ScanResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(ScanError::DataCorruption("bloom image truncated".into()));
        }
        if &data[0..4] != MAGIC {
            return Err(ScanError::DataCorruption("bloom image bad magic".into()));
        }
        let version = u32::from_le_bytes(data[4..8].try_into().unwrap());
        if version != BLOOM_FORMAT_VERSION {
            return Err(ScanError::DataCorruption(format!(
                "bloom image version {} != {}",
                version, BLOOM_FORMAT_VERSION
            )));
        }
        let k = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let m = u64::from_le_bytes(data[12..20].try_into().unwrap());
        let inserted = u64::from_le_bytes(data[20..28].try_into().unwrap());
        let stored_crc = u32::from_le_bytes(data[28..32].try_into().unwrap());

        let body = &data[HEADER_LEN..];
        let expected_blocks = m.div_ceil(64) as usize;
        if k == 0 || m == 0 || body.len() != expected_blocks * 8 {
            return Err(ScanError::DataCorruption("bloom image bad geometry".into()));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(ScanError::DataCorruption("bloom image crc mismatch".into()));
        }

        let bits = body
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();

        Ok(Self {
            bits,
            m,
            k,
            inserted,
            fp_rate,
        })
    }
}

/// Append-only payload of newly known-clean keys from the periodic feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomDelta {
    pub format_version: u32,
    pub keys: Vec<String>,
    /// CRC32 over the key list; stands in for the feed signature.
    pub checksum: u32,
}

impl BloomDelta {
    pub fn new(keys: Vec<String>) -> Self {
        let mut delta = Self {
            format_version: BLOOM_FORMAT_VERSION,
            keys,
            checksum: 0,
        };
        delta.checksum = delta.compute_checksum();
        delta
    }

    /// Parses a delta payload as it arrives from the feed. Checksum
    /// verification happens later, in [`BloomFilter::apply_delta`].
    pub fn from_json(bytes: &[u8]) -> ScanResult<Self> {
        let delta: Self = serde_json::from_slice(bytes)?;
        Ok(delta)
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for key in &self.keys {
            hasher.update(key.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_matches_formula() {
        // n=100_000, p=0.01 -> ~9.59 bits/element, k ~= 7
        let f = BloomFilter::with_capacity(100_000, 0.01);
        let bits_per_element = f.bit_count() as f64 / 100_000.0;
        assert!((bits_per_element - 9.585).abs() < 0.1);
        assert_eq!(f.hash_count(), 7);
    }

    #[test]
    fn no_false_negatives_over_all_inserted_keys() {
        let mut f = BloomFilter::with_capacity(10_000, 0.01);
        let keys: Vec<String> = (0..10_000).map(|i| format!("hash-{i:08x}")).collect();
        for k in &keys {
            f.insert(k);
        }
        for k in &keys {
            assert!(f.might_contain(k), "false negative for inserted key {k}");
        }
    }

    #[test]
    fn observed_fp_rate_within_bound() {
        use rand::Rng;

        let mut f = BloomFilter::with_capacity(100_000, 0.01);
        for i in 0..100_000 {
            f.insert(&format!("member-{i}"));
        }

        let mut rng = rand::thread_rng();
        let sample = 100_000;
        let mut false_positives = 0u32;
        for _ in 0..sample {
            let probe: u64 = rng.gen();
            // Distinct namespace, so probes were never inserted.
            if f.might_contain(&format!("probe-{probe:016x}")) {
                false_positives += 1;
            }
        }
        let observed = false_positives as f64 / sample as f64;
        assert!(observed <= 0.02, "observed fp rate {observed} > 0.02");
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let f = BloomFilter::with_capacity(1_000, 0.01);
        assert!(!f.might_contain("anything"));
    }

    #[test]
    fn serialize_round_trip() {
        let mut f = BloomFilter::with_capacity(1_000, 0.01);
        for i in 0..500 {
            f.insert(&format!("key-{i}"));
        }
        let image = f.serialize();
        let loaded = BloomFilter::deserialize(&image, 0.01).unwrap();
        assert_eq!(loaded.inserted_count(), 500);
        assert_eq!(loaded.bit_count(), f.bit_count());
        for i in 0..500 {
            assert!(loaded.might_contain(&format!("key-{i}")));
        }
    }

    #[test]
    fn corrupted_image_is_rejected() {
        let mut f = BloomFilter::with_capacity(1_000, 0.01);
        f.insert("key");
        let mut image = f.serialize();
        let last = image.len() - 1;
        image[last] ^= 0xFF;
        match BloomFilter::deserialize(&image, 0.01) {
            Err(ScanError::DataCorruption(_)) => {}
            other => panic!("expected DataCorruption, got {other:?}"),
        }
    }

    #[test]
    fn truncated_and_bad_magic_images_are_rejected() {
        assert!(matches!(
            BloomFilter::deserialize(&[1, 2, 3], 0.01),
            Err(ScanError::DataCorruption(_))
        ));
        let mut image = BloomFilter::with_capacity(100, 0.01).serialize();
        image[0] = b'X';
        assert!(matches!(
            BloomFilter::deserialize(&image, 0.01),
            Err(ScanError::DataCorruption(_))
        ));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut image = BloomFilter::with_capacity(100, 0.01).serialize();
        image[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            BloomFilter::deserialize(&image, 0.01),
            Err(ScanError::DataCorruption(_))
        ));
    }

    #[test]
    fn delta_feed_appends_keys() {
        let mut f = BloomFilter::with_capacity(1_000, 0.01);
        let delta = BloomDelta::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(f.apply_delta(&delta).unwrap(), 3);
        assert!(f.might_contain("a"));
        assert!(f.might_contain("b"));
        assert!(f.might_contain("c"));
    }

    #[test]
    fn delta_parses_from_feed_json() {
        let delta = BloomDelta::new(vec!["x".into(), "y".into()]);
        let bytes = serde_json::to_vec(&delta).unwrap();
        let parsed = BloomDelta::from_json(&bytes).unwrap();
        let mut f = BloomFilter::with_capacity(1_000, 0.01);
        assert_eq!(f.apply_delta(&parsed).unwrap(), 2);
        assert!(f.might_contain("y"));
    }

    #[test]
    fn tampered_delta_is_rejected_and_filter_untouched() {
        let mut f = BloomFilter::with_capacity(1_000, 0.01);
        let mut delta = BloomDelta::new(vec!["a".into()]);
        delta.keys.push("evil".into());
        assert!(matches!(
            f.apply_delta(&delta),
            Err(ScanError::DataCorruption(_))
        ));
        assert!(!f.might_contain("a"));
        assert!(!f.might_contain("evil"));
    }
}
