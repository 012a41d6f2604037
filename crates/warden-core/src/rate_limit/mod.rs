//! Sliding-window rate limiting with a durable `SQLite` sink.
//!
//! The limiter counts events per key inside a sliding window. `check` is the
//! read side used during policy evaluation; `record` is the write side the
//! facade calls once an action is admitted. The two are deliberately split:
//! evaluation must stay free of side effects so a dry-run policy pass does
//! not consume quota.
//!
//! # Window Semantics
//!
//! An event is in-window iff `timestamp_ms > now - window_ms` — the boundary
//! itself is expired. `check` lazily prunes expired rows for the queried key
//! before counting, so storage stays bounded without a background task.
//!
//! # Durability
//!
//! The default sink is `SQLite` with WAL journaling, tolerating one writer
//! per session across processes. When the database cannot be opened the
//! limiter degrades to an in-process map with identical semantics; the
//! downgrade is observable through [`RateLimiter::persistent`] and a
//! warning, never through the API. Sink errors on individual calls degrade
//! the same way: the call is treated as unrecorded rather than surfaced.

// SQLite returns i64 for counts and row IDs, but they are never negative
// here. Mutex poisoning indicates a panic in another thread.
#![allow(clippy::cast_sign_loss, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use thiserror::Error;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors from the durable sink. These never escape the limiter API; they
/// are logged and downgraded to the in-memory path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// I/O error creating the database directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    /// `true` while the current count is below the limit.
    pub allowed: bool,
    /// Number of in-window events for the key.
    pub current: u64,
    /// The configured maximum.
    pub limit: u64,
}

enum Sink {
    Sqlite(Mutex<Connection>),
    Memory(Mutex<HashMap<String, Vec<i64>>>),
}

/// Per-key sliding-window event counter.
pub struct RateLimiter {
    sink: Sink,
}

impl RateLimiter {
    /// Opens the durable sink at `path`, falling back to an in-memory map
    /// if the database cannot be initialized.
    #[must_use]
    pub fn open(path: &Path) -> Self {
        match Self::open_sqlite(path) {
            Ok(conn) => Self {
                sink: Sink::Sqlite(Mutex::new(conn)),
            },
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "rate-limit sink unavailable, using in-memory fallback"
                );
                Self::in_memory()
            }
        }
    }

    /// Creates a purely in-memory limiter.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(HashMap::new())),
        }
    }

    fn open_sqlite(path: &Path) -> Result<Connection, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }

    /// Returns `true` when events are backed by the durable sink.
    #[must_use]
    pub const fn persistent(&self) -> bool {
        matches!(self.sink, Sink::Sqlite(_))
    }

    /// Checks the in-window count for a key.
    ///
    /// Prunes expired events for the key as a side effect, then counts what
    /// remains. Does not record anything.
    #[must_use]
    pub fn check(&self, key: &str, max_count: u64, window_ms: i64) -> RateLimitCheck {
        self.check_at(key, max_count, window_ms, now_ms())
    }

    /// [`check`](Self::check) against an explicit clock, for replay and
    /// boundary tests.
    #[must_use]
    pub fn check_at(
        &self,
        key: &str,
        max_count: u64,
        window_ms: i64,
        now_ms: i64,
    ) -> RateLimitCheck {
        let cutoff = now_ms - window_ms;
        let current = match &self.sink {
            Sink::Sqlite(conn) => {
                let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let counted: Result<i64, rusqlite::Error> = (|| {
                    conn.execute(
                        "DELETE FROM rate_events WHERE key = ?1 AND timestamp_ms <= ?2",
                        params![key, cutoff],
                    )?;
                    conn.query_row(
                        "SELECT COUNT(*) FROM rate_events WHERE key = ?1 AND timestamp_ms > ?2",
                        params![key, cutoff],
                        |row| row.get(0),
                    )
                })();
                match counted {
                    Ok(n) => n as u64,
                    Err(error) => {
                        tracing::warn!(key, %error, "rate-limit check failed, treating as empty");
                        0
                    }
                }
            }
            Sink::Memory(map) => {
                let mut map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let events = map.entry(key.to_string()).or_default();
                events.retain(|&ts| ts > cutoff);
                events.len() as u64
            }
        };

        RateLimitCheck {
            allowed: current < max_count,
            current,
            limit: max_count,
        }
    }

    /// Records one event for a key at the current time.
    ///
    /// Unconditional: the caller decides admission with [`check`](Self::check)
    /// first, then records once the action is admitted.
    pub fn record(&self, key: &str) {
        self.record_at(key, now_ms());
    }

    /// [`record`](Self::record) with an explicit timestamp.
    pub fn record_at(&self, key: &str, timestamp_ms: i64) {
        match &self.sink {
            Sink::Sqlite(conn) => {
                let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Err(error) = conn.execute(
                    "INSERT INTO rate_events (key, timestamp_ms) VALUES (?1, ?2)",
                    params![key, timestamp_ms],
                ) {
                    tracing::warn!(key, %error, "rate-limit record failed");
                }
            }
            Sink::Memory(map) => {
                let mut map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                map.entry(key.to_string()).or_default().push(timestamp_ms);
            }
        }
    }

    /// Removes every event older than the window, across all keys.
    ///
    /// Returns the number of events removed.
    pub fn prune(&self, window_ms: i64) -> u64 {
        let cutoff = now_ms() - window_ms;
        match &self.sink {
            Sink::Sqlite(conn) => {
                let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                match conn.execute(
                    "DELETE FROM rate_events WHERE timestamp_ms <= ?1",
                    params![cutoff],
                ) {
                    Ok(removed) => removed as u64,
                    Err(error) => {
                        tracing::warn!(%error, "rate-limit prune failed");
                        0
                    }
                }
            }
            Sink::Memory(map) => {
                let mut map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let mut removed = 0u64;
                map.retain(|_, events| {
                    let before = events.len();
                    events.retain(|&ts| ts > cutoff);
                    removed += (before - events.len()) as u64;
                    !events.is_empty()
                });
                removed
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
