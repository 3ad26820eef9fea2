//! Durable Lookup Storage
//!
//! Two SQLite-backed stores:
//! - `DurableCache`: the restart-surviving L3 cache layer.
//! - `LocalThreatDb`: the exhaustive local database used as fallback when
//!   the remote endpoint is unreachable or the breaker is open.
//!
//! Both carry a `schema_version` meta row. A version mismatch or an
//! unreadable file is treated as corruption: the store is rebuilt from
//! scratch (with a warning) instead of propagating an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ScanResult;
use crate::model::{LookupEntry, SourceLayer, Verdict};

pub const L3_SCHEMA_VERSION: i64 = 1;
pub const THREAT_DB_SCHEMA_VERSION: i64 = 1;

/// Open a connection, in-memory when no path is given.
fn open_connection(path: Option<&Path>) -> ScanResult<Connection> {
    Ok(match path {
        Some(p) => {
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(p)?
        }
        None => Connection::open_in_memory()?,
    })
}

/// Read the stored schema version, if the meta table exists at all.
fn stored_schema_version(conn: &Connection) -> Option<i64> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )
    .optional()
    .ok()
    .flatten()
}

// ============================================================================
// L3 DURABLE CACHE
// ============================================================================

pub struct DurableCache {
    conn: Mutex<Connection>,
}

impl DurableCache {
    /// Open (or rebuild) the L3 cache. `None` path keeps it in memory.
    pub fn open(path: Option<PathBuf>) -> ScanResult<Self> {
        match Self::try_open(path.as_deref()) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                log::warn!("L3 cache unreadable ({e}), rebuilding from scratch");
                if let Some(p) = path.as_deref() {
                    let _ = std::fs::remove_file(p);
                }
                Self::try_open(path.as_deref())
            }
        }
    }

    fn try_open(path: Option<&Path>) -> ScanResult<Self> {
        let conn = open_connection(path)?;

        match stored_schema_version(&conn) {
            Some(v) if v == L3_SCHEMA_VERSION => {}
            Some(v) => {
                log::warn!("L3 cache schema v{v} != v{L3_SCHEMA_VERSION}, rebuilding");
                conn.execute_batch(
                    "DROP TABLE IF EXISTS lookup_cache; DROP TABLE IF EXISTS meta;",
                )?;
            }
            None => {}
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lookup_cache (
                key          TEXT PRIMARY KEY,
                verdict      TEXT NOT NULL,
                confidence   REAL NOT NULL,
                ttl_ms       INTEGER NOT NULL,
                cached_at_ms INTEGER NOT NULL
            );",
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![L3_SCHEMA_VERSION],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch a live entry; expired rows are deleted on the way out.
    pub fn get(&self, key: &str) -> ScanResult<Option<LookupEntry>> {
        let conn = self.conn.lock();
        let row: Option<(String, f64, i64, i64)> = conn
            .query_row(
                "SELECT verdict, confidence, ttl_ms, cached_at_ms
                 FROM lookup_cache WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let Some((verdict, confidence, ttl_ms, cached_at_ms)) = row else {
            return Ok(None);
        };

        let entry = LookupEntry {
            key: key.to_string(),
            verdict: Verdict::parse(&verdict),
            confidence: confidence as f32,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            cached_at: Utc
                .timestamp_millis_opt(cached_at_ms)
                .single()
                .unwrap_or_else(Utc::now),
            source: SourceLayer::L3,
        };

        if entry.is_expired() {
            conn.execute("DELETE FROM lookup_cache WHERE key = ?1", params![key])?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub fn put(&self, entry: &LookupEntry) -> ScanResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO lookup_cache
             (key, verdict, confidence, ttl_ms, cached_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.key,
                entry.verdict.as_str(),
                entry.confidence as f64,
                entry.ttl.as_millis() as i64,
                entry.cached_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn len(&self) -> ScanResult<usize> {
        let n: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM lookup_cache", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> ScanResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete every expired row. Returns how many were removed.
    pub fn sweep_expired(&self) -> ScanResult<usize> {
        let now = Utc::now().timestamp_millis();
        let removed = self.conn.lock().execute(
            "DELETE FROM lookup_cache WHERE cached_at_ms + ttl_ms <= ?1",
            params![now],
        )?;
        Ok(removed)
    }
}

// ============================================================================
// LOCAL EXHAUSTIVE THREAT DATABASE
// ============================================================================

/// Known verdict for one hash, as loaded from the signature distribution.
#[derive(Debug, Clone)]
pub struct KnownHash {
    pub hash: String,
    pub verdict: Verdict,
    pub confidence: f32,
}

pub struct LocalThreatDb {
    conn: Mutex<Connection>,
}

impl LocalThreatDb {
    pub fn open(path: Option<PathBuf>) -> ScanResult<Self> {
        match Self::try_open(path.as_deref()) {
            Ok(db) => Ok(db),
            Err(e) => {
                log::warn!("local threat db unreadable ({e}), rebuilding from scratch");
                if let Some(p) = path.as_deref() {
                    let _ = std::fs::remove_file(p);
                }
                Self::try_open(path.as_deref())
            }
        }
    }

    fn try_open(path: Option<&Path>) -> ScanResult<Self> {
        let conn = open_connection(path)?;

        match stored_schema_version(&conn) {
            Some(v) if v == THREAT_DB_SCHEMA_VERSION => {}
            Some(v) => {
                log::warn!("threat db schema v{v} != v{THREAT_DB_SCHEMA_VERSION}, rebuilding");
                conn.execute_batch(
                    "DROP TABLE IF EXISTS known_hashes; DROP TABLE IF EXISTS meta;",
                )?;
            }
            None => {}
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS known_hashes (
                hash       TEXT PRIMARY KEY,
                verdict    TEXT NOT NULL,
                confidence REAL NOT NULL
            );",
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![THREAT_DB_SCHEMA_VERSION],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Bulk-load signature rows (from the out-of-scope distribution feed).
    pub fn load_signatures(&self, rows: &[KnownHash]) -> ScanResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO known_hashes (hash, verdict, confidence)
                 VALUES (?1, ?2, ?3)",
                params![row.hash, row.verdict.as_str(), row.confidence as f64],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn lookup(&self, hash: &str) -> ScanResult<Option<KnownHash>> {
        let row: Option<(String, f64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT verdict, confidence FROM known_hashes WHERE hash = ?1",
                params![hash],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(verdict, confidence)| KnownHash {
            hash: hash.to_string(),
            verdict: Verdict::parse(&verdict),
            confidence: confidence as f32,
        }))
    }

    pub fn len(&self) -> ScanResult<usize> {
        let n: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM known_hashes", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, ttl_secs: u64) -> LookupEntry {
        LookupEntry::new(key, Verdict::Malicious, 0.95, Duration::from_secs(ttl_secs))
    }

    #[test]
    fn l3_round_trip_in_memory() {
        let cache = DurableCache::open(None).unwrap();
        cache.put(&entry("abc", 60)).unwrap();
        let hit = cache.get("abc").unwrap().unwrap();
        assert_eq!(hit.verdict, Verdict::Malicious);
        assert_eq!(hit.source, SourceLayer::L3);
        assert!(cache.get("missing").unwrap().is_none());
    }

    #[test]
    fn l3_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l3.db");

        let cache = DurableCache::open(Some(path.clone())).unwrap();
        cache.put(&entry("persist-me", 3600)).unwrap();
        drop(cache);

        let reopened = DurableCache::open(Some(path)).unwrap();
        assert!(reopened.get("persist-me").unwrap().is_some());
    }

    #[test]
    fn l3_expired_entry_is_deleted_on_read() {
        let cache = DurableCache::open(None).unwrap();
        let mut e = entry("old", 60);
        e.cached_at = Utc::now() - chrono::Duration::seconds(120);
        cache.put(&e).unwrap();
        assert!(cache.get("old").unwrap().is_none());
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn l3_sweep_removes_expired_rows() {
        let cache = DurableCache::open(None).unwrap();
        cache.put(&entry("live", 3600)).unwrap();
        let mut dead = entry("dead", 1);
        dead.cached_at = Utc::now() - chrono::Duration::seconds(10);
        cache.put(&dead).unwrap();

        assert_eq!(cache.sweep_expired().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn corrupt_l3_file_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l3.db");
        std::fs::write(&path, b"this is not a sqlite database at all").unwrap();

        let cache = DurableCache::open(Some(path)).unwrap();
        assert!(cache.is_empty().unwrap());
        cache.put(&entry("fresh", 60)).unwrap();
        assert!(cache.get("fresh").unwrap().is_some());
    }

    #[test]
    fn threat_db_load_and_lookup() {
        let db = LocalThreatDb::open(None).unwrap();
        db.load_signatures(&[
            KnownHash {
                hash: "bad".into(),
                verdict: Verdict::Malicious,
                confidence: 0.99,
            },
            KnownHash {
                hash: "meh".into(),
                verdict: Verdict::Suspicious,
                confidence: 0.7,
            },
        ])
        .unwrap();

        assert_eq!(db.len().unwrap(), 2);
        let hit = db.lookup("bad").unwrap().unwrap();
        assert_eq!(hit.verdict, Verdict::Malicious);
        assert!(db.lookup("unseen").unwrap().is_none());
    }
}
