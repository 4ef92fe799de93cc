//! Incremental processing state.
//!
//! Persists a deterministic fingerprint per table, derived from schema
//! shape only (column names, declared types, modes, order; never data
//! content). A table is reprocessed iff its current fingerprint differs
//! from the stored one or no fingerprint is stored.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::model::TableSchema;

/// Current state schema version.
const STATE_VERSION: i32 = 1;

/// Errors that can occur during tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to determine state directory")]
    NoStateDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StateResult<T> = Result<T, StateError>;

/// Deterministic digest of a table's schema shape.
pub fn fingerprint(schema: &TableSchema) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.name.to_lowercase().as_bytes());
    for column in &schema.columns {
        hasher.update(b"\x1f");
        hasher.update(column.name.to_lowercase().as_bytes());
        hasher.update(b"\x1e");
        hasher.update(column.declared_type.to_lowercase().as_bytes());
        hasher.update(b"\x1e");
        hasher.update(format!("{:?}", column.mode).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Combined fingerprint for a table pair, ordered by lowercased table
/// name so it is stable regardless of orientation.
pub fn combined_fingerprint(a: (&str, &str), b: (&str, &str)) -> String {
    let (name_a, fp_a) = a;
    let (name_b, fp_b) = b;
    if name_a.to_lowercase() <= name_b.to_lowercase() {
        format!("{fp_a}|{fp_b}")
    } else {
        format!("{fp_b}|{fp_a}")
    }
}

/// Persisted fingerprint-per-table store deciding which tables need
/// re-detection.
pub struct ChangeTracker {
    conn: Mutex<Connection>,
}

impl ChangeTracker {
    /// Open or create the tracker database at the default location
    /// (`~/.relhound/state.db`).
    pub fn open_default() -> StateResult<Self> {
        let base = dirs::home_dir().ok_or(StateError::NoStateDir)?;
        Self::open(base.join(".relhound").join("state.db"))
    }

    /// Open or create the tracker database at an explicit path.
    pub fn open(path: impl Into<PathBuf>) -> StateResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        let tracker = Self {
            conn: Mutex::new(conn),
        };
        tracker.init()?;
        Ok(tracker)
    }

    /// Open an in-memory tracker (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        let tracker = Self {
            conn: Mutex::new(conn),
        };
        tracker.init()?;
        Ok(tracker)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init(&self) -> StateResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS processing_state (
                table_name TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                last_processed INTEGER NOT NULL
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
            Some(v) if v == STATE_VERSION => {}
            _ => {
                conn.execute("DELETE FROM processing_state", [])?;
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                    params![STATE_VERSION.to_string()],
                )?;
            }
        }

        Ok(())
    }

    /// The stored fingerprint for a table, if any.
    pub fn stored_fingerprint(&self, table: &str) -> StateResult<Option<String>> {
        let fp = self
            .conn()
            .query_row(
                "SELECT fingerprint FROM processing_state WHERE table_name = ?",
                params![table.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fp)
    }

    /// Whether a table is new or its schema shape changed since the last
    /// successful run.
    pub fn is_changed(&self, schema: &TableSchema) -> StateResult<bool> {
        let current = fingerprint(schema);
        Ok(self.stored_fingerprint(&schema.name)? != Some(current))
    }

    /// The subset of tables that need re-detection.
    pub fn tables_to_process<'a>(
        &self,
        all: &'a [TableSchema],
    ) -> StateResult<Vec<&'a TableSchema>> {
        let mut changed = Vec::new();
        for schema in all {
            if self.is_changed(schema)? {
                changed.push(schema);
            }
        }
        Ok(changed)
    }

    /// Record a table as processed with its current fingerprint.
    pub fn mark_processed(&self, schema: &TableSchema) -> StateResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.conn().execute(
            "INSERT OR REPLACE INTO processing_state (table_name, fingerprint, last_processed)
             VALUES (?, ?, ?)",
            params![schema.name.to_lowercase(), fingerprint(schema), now],
        )?;
        Ok(())
    }

    /// Unix time of the table's last successful processing.
    pub fn last_processed(&self, table: &str) -> StateResult<Option<i64>> {
        let ts = self
            .conn()
            .query_row(
                "SELECT last_processed FROM processing_state WHERE table_name = ?",
                params![table.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    /// Clear state for tables whose name contains `pattern`, or all state
    /// when no pattern is given. Returns the number of entries removed.
    pub fn clear(&self, pattern: Option<&str>) -> StateResult<usize> {
        let removed = match pattern {
            Some(p) => self.conn().execute(
                "DELETE FROM processing_state WHERE table_name LIKE ?",
                params![format!("%{}%", p.to_lowercase())],
            )?,
            None => self.conn().execute("DELETE FROM processing_state", [])?,
        };
        Ok(removed)
    }

    /// Number of tracked tables.
    pub fn tracked_count(&self) -> StateResult<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM processing_state", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
