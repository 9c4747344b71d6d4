//! Ledger trait and error types
//!
//! This module defines the trait interface for ledger backends and the
//! retry policy applied at the storage boundary.

use crate::state::CrawlStatus;
use crate::storage::{CrawlRecord, FrontierEntry, SessionRecord, SessionStatus};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Ledger unavailable after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: rusqlite::Error,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Bounded retry with exponential backoff for transient storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,

    /// Delay before the first retry; doubled after each failure
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

/// Trait for crawl ledger implementations
///
/// A ledger handle is scoped to one crawler id. Handles are cheap to open,
/// and the coordinator gives each worker its own, so reads and writes on
/// different identities never share an application-level lock.
pub trait Ledger: Send {
    // ===== Session Management =====

    /// Records the start of a new session and returns its id
    fn begin_session(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records the final status of a session
    fn finish_session(&mut self, session_id: i64, status: SessionStatus) -> StorageResult<()>;

    /// Gets the most recent session of this crawler
    fn latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    // ===== Crawl Records =====

    /// Gets the record of a reference
    fn get(&self, identity: &str) -> StorageResult<Option<CrawlRecord>>;

    /// Inserts or replaces the record of a reference
    fn upsert(&mut self, record: &CrawlRecord) -> StorageResult<()>;

    /// Removes the record of a reference
    ///
    /// Returns true if a record was removed.
    fn delete(&mut self, identity: &str) -> StorageResult<bool>;

    /// Lazily iterates over records in identity order
    ///
    /// The cursor is finite. Restarting means calling `scan` again.
    fn scan(
        &self,
        unprocessed_only: bool,
    ) -> Box<dyn Iterator<Item = StorageResult<CrawlRecord>> + '_>;

    /// Clears `processed_in_current_run` on every record
    ///
    /// Returns the number of records touched.
    fn reset_processed_flags(&mut self) -> StorageResult<u64>;

    /// Counts records per status
    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;

    /// Counts all records
    fn count_records(&self) -> StorageResult<u64>;

    /// Returns every record, ordered by identity
    fn snapshot(&self) -> StorageResult<Vec<CrawlRecord>> {
        self.scan(false).collect()
    }

    // ===== Frontier =====

    /// Persists a frontier entry
    ///
    /// Returns its sequence number, or None if the identity is already queued.
    fn push_frontier(&mut self, entry: &FrontierEntry) -> StorageResult<Option<i64>>;

    /// Loads up to `limit` entries with a sequence number above `after_seq`
    fn load_frontier(&self, after_seq: i64, limit: usize)
        -> StorageResult<Vec<(i64, FrontierEntry)>>;

    /// Removes a processed entry from the frontier
    fn complete_frontier(&mut self, identity: &str) -> StorageResult<()>;

    /// Counts pending frontier entries
    fn frontier_len(&self) -> StorageResult<u64>;

    /// Clears the frontier
    fn clear_frontier(&mut self) -> StorageResult<()>;
}
