//! Crawl-Collector: the incremental state-tracking core of a crawler
//!
//! This crate decides, for every reference met across repeated crawl
//! sessions, whether its content is new, modified, unchanged, deleted or in
//! error, and persists that verdict in a crash-resilient ledger so that the
//! next session only does incremental work.

pub mod checksum;
pub mod config;
pub mod crawler;
pub mod document;
pub mod events;
pub mod filter;
pub mod output;
pub mod policy;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for collector operations
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: state::SessionState,
        to: state::SessionState,
    },

    #[error("Escalated {kind} error on {reference}: {message}")]
    Escalated {
        reference: String,
        kind: policy::ErrorKind,
        message: String,
    },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid start reference: {0}")]
    InvalidReference(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlSummary, StopHandle};
pub use state::{CrawlStatus, SessionState};
pub use storage::{CrawlRecord, Ledger, SqliteLedger};
