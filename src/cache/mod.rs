//! Two-tier relationship cache.
//!
//! An in-process map in front of a SQLite-persisted key-value store. Keys
//! are unordered table pairs plus a combined fingerprint of both schemas,
//! so a hit is only valid while neither table's shape has changed. Values
//! are pair verdicts: the relationships found, or the positive fact that
//! none exist. A cached negative avoids re-deriving it.
//!
//! Entries carry a time-to-live; expired entries read as absent. The
//! store is versioned and auto-clears on a version mismatch.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::model::{PairKey, Relationship};

/// Current cache schema version. Bump this when the cache format changes.
const CACHE_VERSION: i32 = 1;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// The cached outcome for one table pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairVerdict {
    /// Relationships previously detected between the pair, covering both
    /// directions.
    Found(Vec<Relationship>),
    /// The pair was examined and no relationship exists.
    NoRelationship,
}

impl PairVerdict {
    pub fn relationships(&self) -> &[Relationship] {
        match self {
            Self::Found(rels) => rels,
            Self::NoRelationship => &[],
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    fingerprint: String,
    verdict: PairVerdict,
    created_at: i64,
    ttl_secs: u64,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn is_fresh(created_at: i64, ttl_secs: u64, now: i64) -> bool {
    ttl_secs > 0 && created_at.saturating_add(ttl_secs as i64) > now
}

/// Two-tier relationship cache. All operations are safe to call from
/// multiple workers; persisted writes are serialized on the connection.
pub struct RelationshipCache {
    conn: Mutex<Connection>,
    memory: DashMap<String, MemoryEntry>,
    default_ttl_secs: u64,
}

impl RelationshipCache {
    /// Open or create the cache database at the default location
    /// (`~/.relhound/cache.db`).
    pub fn open_default(default_ttl_secs: u64) -> CacheResult<Self> {
        let base = dirs::home_dir().ok_or(CacheError::NoCacheDir)?;
        Self::open(base.join(".relhound").join("cache.db"), default_ttl_secs)
    }

    /// Open or create the cache database at an explicit path.
    pub fn open(path: impl Into<PathBuf>, default_ttl_secs: u64) -> CacheResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        let cache = Self {
            conn: Mutex::new(conn),
            memory: DashMap::new(),
            default_ttl_secs,
        };
        cache.init()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory(default_ttl_secs: u64) -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
            memory: DashMap::new(),
            default_ttl_secs,
        };
        cache.init()?;
        Ok(cache)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize the store schema and check the version.
    fn init(&self) -> CacheResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pair_cache (
                key TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                ttl_secs INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            _ => {
                conn.execute("DELETE FROM pair_cache", [])?;
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION.to_string()],
                )?;
            }
        }

        Ok(())
    }

    /// Get the verdict for a pair if present, fingerprint-valid and
    /// unexpired.
    pub fn get(&self, pair: &PairKey, fingerprint: &str) -> CacheResult<Option<PairVerdict>> {
        let key = pair.storage_key();
        let now = unix_now();

        if let Some(entry) = self.memory.get(&key) {
            if entry.fingerprint == fingerprint && is_fresh(entry.created_at, entry.ttl_secs, now) {
                return Ok(Some(entry.verdict.clone()));
            }
        }

        let row: Option<(String, String, i64, i64)> = self
            .conn()
            .query_row(
                "SELECT fingerprint, value, created_at, ttl_secs FROM pair_cache WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((stored_fp, value, created_at, ttl_secs)) = row else {
            return Ok(None);
        };
        let ttl_secs = ttl_secs.max(0) as u64;
        if stored_fp != fingerprint || !is_fresh(created_at, ttl_secs, now) {
            return Ok(None);
        }

        let verdict: PairVerdict = serde_json::from_str(&value)?;
        self.memory.insert(
            key,
            MemoryEntry {
                fingerprint: fingerprint.to_string(),
                verdict: verdict.clone(),
                created_at,
                ttl_secs,
            },
        );
        Ok(Some(verdict))
    }

    /// Store the verdict for a pair, replacing any previous entry.
    pub fn put(&self, pair: &PairKey, fingerprint: &str, verdict: &PairVerdict) -> CacheResult<()> {
        let key = pair.storage_key();
        let now = unix_now();
        let value = serde_json::to_string(verdict)?;

        self.conn().execute(
            "INSERT OR REPLACE INTO pair_cache (key, fingerprint, value, created_at, ttl_secs)
             VALUES (?, ?, ?, ?, ?)",
            params![key, fingerprint, value, now, self.default_ttl_secs as i64],
        )?;
        self.memory.insert(
            key,
            MemoryEntry {
                fingerprint: fingerprint.to_string(),
                verdict: verdict.clone(),
                created_at: now,
                ttl_secs: self.default_ttl_secs,
            },
        );
        Ok(())
    }

    /// Remove every entry whose pair touches the given table. Returns the
    /// number of persisted entries removed.
    pub fn invalidate_table(&self, table: &str) -> CacheResult<usize> {
        let t = table.to_lowercase();
        self.memory
            .retain(|key, _| !pair_key_touches(key, &t));
        let removed = self.conn().execute(
            "DELETE FROM pair_cache WHERE key LIKE ? OR key LIKE ?",
            params![format!("{t}:%"), format!("%:{t}")],
        )?;
        Ok(removed)
    }

    /// Whether the table has at least one unexpired persisted entry.
    /// Fingerprint validity is still enforced by `get`.
    pub fn has_live_entry_for(&self, table: &str) -> CacheResult<bool> {
        let t = table.to_lowercase();
        let now = unix_now();
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM pair_cache
             WHERE (key LIKE ? OR key LIKE ?) AND ttl_secs > 0 AND created_at + ttl_secs > ?",
            params![format!("{t}:%"), format!("%:{t}"), now],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete expired entries; returns the number removed.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = unix_now();
        self.memory
            .retain(|_, entry| is_fresh(entry.created_at, entry.ttl_secs, now));
        let removed = self.conn().execute(
            "DELETE FROM pair_cache WHERE ttl_secs = 0 OR created_at + ttl_secs <= ?",
            params![now],
        )?;
        Ok(removed)
    }

    /// Clear all cached verdicts.
    pub fn clear_all(&self) -> CacheResult<()> {
        self.memory.clear();
        self.conn().execute("DELETE FROM pair_cache", [])?;
        Ok(())
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.conn();
        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pair_cache", [], |row| row.get(0))?;
        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM pair_cache",
            [],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            entry_count: entry_count as usize,
            memory_entry_count: self.memory.len(),
            total_size_bytes: total_size as usize,
        })
    }
}

fn pair_key_touches(key: &str, table_lower: &str) -> bool {
    match key.split_once(':') {
        Some((first, second)) => first == table_lower || second == table_lower,
        None => false,
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of persisted entries.
    pub entry_count: usize,
    /// Number of entries in the in-process tier.
    pub memory_entry_count: usize,
    /// Total size of persisted values in bytes.
    pub total_size_bytes: usize,
}
