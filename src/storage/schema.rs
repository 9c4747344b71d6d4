//! Database schema definitions for the crawl ledger
//!
//! This module contains all SQL schema definitions for the ledger database.
//! Every table is scoped by `crawler_id` so several logical crawls may share
//! one file without seeing each other's records.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_crawler ON sessions(crawler_id);

-- Last known crawl record of every reference
CREATE TABLE IF NOT EXISTS crawl_records (
    crawler_id TEXT NOT NULL,
    identity TEXT NOT NULL,
    status TEXT NOT NULL,
    metadata_checksum TEXT,
    document_checksum TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    parent_identity TEXT,
    processed_in_current_run INTEGER NOT NULL DEFAULT 0,
    last_session INTEGER NOT NULL,
    last_error TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (crawler_id, identity)
);

CREATE INDEX IF NOT EXISTS idx_records_processed
    ON crawl_records(crawler_id, processed_in_current_run);
CREATE INDEX IF NOT EXISTS idx_records_status ON crawl_records(crawler_id, status);

-- Pending references of the current session, kept for resumption
CREATE TABLE IF NOT EXISTS frontier (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    crawler_id TEXT NOT NULL,
    identity TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0,
    parent_identity TEXT,
    orphan INTEGER NOT NULL DEFAULT 0,
    UNIQUE(crawler_id, identity)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
