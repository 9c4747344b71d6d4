//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait.
//! The database runs in WAL mode with `synchronous = FULL`, so every
//! committed upsert or delete survives a process crash.

use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, RetryPolicy, StorageError, StorageResult};
use crate::storage::{CrawlRecord, FrontierEntry, SessionRecord, SessionStatus};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

const RECORD_COLUMNS: &str = "identity, status, metadata_checksum, document_checksum, depth,
     parent_identity, processed_in_current_run, last_session, last_error";

/// Number of records fetched per page by a scan cursor
const SCAN_PAGE_SIZE: usize = 256;

/// How long SQLite itself waits on a locked database before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite ledger backend, scoped to one crawler id
pub struct SqliteLedger {
    conn: Connection,
    crawler_id: String,
    retry: RetryPolicy,
}

impl SqliteLedger {
    /// Opens (or creates) the ledger database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `crawler_id` - Logical crawl whose records this handle sees
    /// * `retry` - Retry policy for transient failures
    pub fn open(path: &Path, crawler_id: &str, retry: RetryPolicy) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            crawler_id: crawler_id.to_string(),
            retry,
        })
    }

    /// Creates an in-memory ledger (for tests and dry runs)
    pub fn open_in_memory(crawler_id: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            crawler_id: crawler_id.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// The crawler id this handle is scoped to
    pub fn crawler_id(&self) -> &str {
        &self.crawler_id
    }

    /// Runs `op`, retrying transient failures with exponential backoff
    fn with_retry<T>(
        &self,
        mut op: impl FnMut(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let mut attempt = 1;
        loop {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    if attempt >= self.retry.attempts {
                        return Err(StorageError::RetriesExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let backoff = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        "Transient ledger failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.retry.attempts,
                        backoff,
                        e
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
        let status: String = row.get(5)?;
        Ok(SessionRecord {
            id: row.get(0)?,
            crawler_id: row.get(1)?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            config_hash: row.get(4)?,
            status: SessionStatus::from_db_string(&status).unwrap_or(SessionStatus::Failed),
        })
    }

    fn fetch_page(
        &self,
        after_identity: &str,
        unprocessed_only: bool,
        limit: usize,
    ) -> StorageResult<Vec<CrawlRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_records
             WHERE crawler_id = ?1 AND identity > ?2
               AND (?3 = 0 OR processed_in_current_run = 0)
             ORDER BY identity LIMIT ?4",
            RECORD_COLUMNS
        );
        self.with_retry(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![
                    self.crawler_id,
                    after_identity,
                    unprocessed_only,
                    limit as i64
                ],
                record_from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })
    }
}

fn is_transient(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
        ),
        _ => false,
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRecord> {
    let status_str: String = row.get(1)?;
    let status = CrawlStatus::from_db_string(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown crawl status '{}'", status_str).into(),
        )
    })?;

    Ok(CrawlRecord {
        identity: row.get(0)?,
        status,
        metadata_checksum: row.get(2)?,
        document_checksum: row.get(3)?,
        depth: row.get(4)?,
        parent_identity: row.get(5)?,
        processed_in_current_run: row.get(6)?,
        last_session: row.get(7)?,
        last_error: row.get(8)?,
    })
}

impl Ledger for SqliteLedger {
    // ===== Session Management =====

    fn begin_session(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_retry(|conn| {
            conn.execute(
                "INSERT INTO sessions (crawler_id, started_at, config_hash, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    self.crawler_id,
                    now,
                    config_hash,
                    SessionStatus::Running.to_db_string()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn finish_session(&mut self, session_id: i64, status: SessionStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.with_retry(|conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, finished_at = ?2 WHERE id = ?3 AND crawler_id = ?4",
                params![status.to_db_string(), now, session_id, self.crawler_id],
            )
        })?;

        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    fn latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, crawler_id, started_at, finished_at, config_hash, status
                 FROM sessions WHERE crawler_id = ?1 ORDER BY id DESC LIMIT 1",
                params![self.crawler_id],
                Self::session_from_row,
            )
            .optional()
        })
    }

    // ===== Crawl Records =====

    fn get(&self, identity: &str) -> StorageResult<Option<CrawlRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_records WHERE crawler_id = ?1 AND identity = ?2",
            RECORD_COLUMNS
        );
        self.with_retry(|conn| {
            conn.prepare_cached(&sql)?
                .query_row(params![self.crawler_id, identity], record_from_row)
                .optional()
        })
    }

    fn upsert(&mut self, record: &CrawlRecord) -> StorageResult<()> {
        if record.identity.is_empty() {
            return Err(StorageError::InvalidRecord(
                "reference identity cannot be empty".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        self.with_retry(|conn| {
            conn.prepare_cached(
                "INSERT INTO crawl_records
                 (crawler_id, identity, status, metadata_checksum, document_checksum, depth,
                  parent_identity, processed_in_current_run, last_session, last_error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(crawler_id, identity) DO UPDATE SET
                    status = excluded.status,
                    metadata_checksum = excluded.metadata_checksum,
                    document_checksum = excluded.document_checksum,
                    depth = excluded.depth,
                    parent_identity = excluded.parent_identity,
                    processed_in_current_run = excluded.processed_in_current_run,
                    last_session = excluded.last_session,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
            )?
            .execute(params![
                self.crawler_id,
                record.identity,
                record.status.to_db_string(),
                record.metadata_checksum,
                record.document_checksum,
                record.depth,
                record.parent_identity,
                record.processed_in_current_run,
                record.last_session,
                record.last_error,
                now,
            ])
        })?;
        Ok(())
    }

    fn delete(&mut self, identity: &str) -> StorageResult<bool> {
        let removed = self.with_retry(|conn| {
            conn.execute(
                "DELETE FROM crawl_records WHERE crawler_id = ?1 AND identity = ?2",
                params![self.crawler_id, identity],
            )
        })?;
        Ok(removed > 0)
    }

    fn scan(
        &self,
        unprocessed_only: bool,
    ) -> Box<dyn Iterator<Item = StorageResult<CrawlRecord>> + '_> {
        Box::new(RecordCursor::new(self, unprocessed_only))
    }

    fn reset_processed_flags(&mut self) -> StorageResult<u64> {
        let touched = self.with_retry(|conn| {
            conn.execute(
                "UPDATE crawl_records SET processed_in_current_run = 0
                 WHERE crawler_id = ?1 AND processed_in_current_run = 1",
                params![self.crawler_id],
            )
        })?;
        Ok(touched as u64)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let rows: Vec<(String, i64)> = self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM crawl_records WHERE crawler_id = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![self.crawler_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect()
        })?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = CrawlStatus::from_db_string(&status_str) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self.with_retry(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM crawl_records WHERE crawler_id = ?1",
                params![self.crawler_id],
                |row| row.get(0),
            )
        })?;
        Ok(count as u64)
    }

    // ===== Frontier =====

    fn push_frontier(&mut self, entry: &FrontierEntry) -> StorageResult<Option<i64>> {
        self.with_retry(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO frontier (crawler_id, identity, depth, parent_identity, orphan)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    self.crawler_id,
                    entry.identity,
                    entry.depth,
                    entry.parent_identity,
                    entry.orphan
                ],
            )?;
            Ok(if inserted > 0 {
                Some(conn.last_insert_rowid())
            } else {
                None
            })
        })
    }

    fn load_frontier(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> StorageResult<Vec<(i64, FrontierEntry)>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT seq, identity, depth, parent_identity, orphan FROM frontier
                 WHERE crawler_id = ?1 AND seq > ?2 ORDER BY seq LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![self.crawler_id, after_seq, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    FrontierEntry {
                        identity: row.get(1)?,
                        depth: row.get(2)?,
                        parent_identity: row.get(3)?,
                        orphan: row.get(4)?,
                    },
                ))
            })?;
            rows.collect()
        })
    }

    fn complete_frontier(&mut self, identity: &str) -> StorageResult<()> {
        self.with_retry(|conn| {
            conn.execute(
                "DELETE FROM frontier WHERE crawler_id = ?1 AND identity = ?2",
                params![self.crawler_id, identity],
            )
        })?;
        Ok(())
    }

    fn frontier_len(&self) -> StorageResult<u64> {
        let count: i64 = self.with_retry(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM frontier WHERE crawler_id = ?1",
                params![self.crawler_id],
                |row| row.get(0),
            )
        })?;
        Ok(count as u64)
    }

    fn clear_frontier(&mut self) -> StorageResult<()> {
        self.with_retry(|conn| {
            conn.execute(
                "DELETE FROM frontier WHERE crawler_id = ?1",
                params![self.crawler_id],
            )
        })?;
        Ok(())
    }
}

/// Lazy, finite cursor over ledger records
///
/// Records are paged in identity order using the last identity seen as the
/// key, so rows written or deleted behind the cursor do not disturb it.
pub struct RecordCursor<'a> {
    ledger: &'a SqliteLedger,
    unprocessed_only: bool,
    last_identity: String,
    buffer: VecDeque<CrawlRecord>,
    exhausted: bool,
}

impl<'a> RecordCursor<'a> {
    pub fn new(ledger: &'a SqliteLedger, unprocessed_only: bool) -> Self {
        Self {
            ledger,
            unprocessed_only,
            last_identity: String::new(),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = StorageResult<CrawlRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .ledger
                .fetch_page(&self.last_identity, self.unprocessed_only, SCAN_PAGE_SIZE)
            {
                Ok(page) => {
                    if page.len() < SCAN_PAGE_SIZE {
                        self.exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let record = self.buffer.pop_front()?;
        self.last_identity = record.identity.clone();
        Some(Ok(record))
    }
}
