//! Storage module: the crawl reference ledger
//!
//! This module handles all persistent state of the collector, including:
//! - SQLite database initialization and schema management
//! - Crawl record persistence (one record per reference)
//! - Session tracking and resumption support
//! - The persisted frontier of an unfinished session

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{RecordCursor, SqliteLedger};
pub use traits::{Ledger, RetryPolicy, StorageError, StorageResult};

use crate::state::CrawlStatus;

use std::path::{Path, PathBuf};

/// File name of the ledger database inside the work directory
pub const LEDGER_FILE_NAME: &str = "ledger.db";

/// Returns the ledger location for a work directory
///
/// The location is stable per logical crawl so that later processes can
/// pick up the incremental state.
pub fn ledger_path(work_dir: &Path) -> PathBuf {
    work_dir.join(LEDGER_FILE_NAME)
}

/// Last known state of one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecord {
    pub identity: String,
    pub status: CrawlStatus,
    pub metadata_checksum: Option<String>,
    pub document_checksum: Option<String>,
    pub depth: u32,
    pub parent_identity: Option<String>,
    pub processed_in_current_run: bool,
    pub last_session: i64,
    pub last_error: Option<String>,
}

impl CrawlRecord {
    /// Creates a record with no checksums for a reference seen in `session`
    pub fn new(identity: impl Into<String>, status: CrawlStatus, session: i64) -> Self {
        Self {
            identity: identity.into(),
            status,
            metadata_checksum: None,
            document_checksum: None,
            depth: 0,
            parent_identity: None,
            processed_in_current_run: false,
            last_session: session,
            last_error: None,
        }
    }
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub crawler_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
}

/// Persisted status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Finished,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "finished" => Some(Self::Finished),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// A session that did not finish leaves a frontier worth resuming
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Finished)
    }
}

/// A reference waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub identity: String,
    pub depth: u32,
    pub parent_identity: Option<String>,

    /// Re-submitted by the orphan resolver rather than discovered
    pub orphan: bool,
}

impl FrontierEntry {
    /// Creates a depth-0 entry for a start reference
    pub fn seed(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            depth: 0,
            parent_identity: None,
            orphan: false,
        }
    }

    /// Creates an entry for a reference discovered under `parent`
    pub fn child(identity: impl Into<String>, parent: &FrontierEntry) -> Self {
        Self {
            identity: identity.into(),
            depth: parent.depth + 1,
            parent_identity: Some(parent.identity.clone()),
            orphan: false,
        }
    }

    /// Creates an entry that re-submits an orphaned ledger record
    pub fn orphan(record: &CrawlRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            depth: record.depth,
            parent_identity: record.parent_identity.clone(),
            orphan: true,
        }
    }
}
