//! Committer collaborator: the sink receiving new and modified documents

use crate::checksum::sha256_hex;
use crate::config::CommitterConfig;
use crate::crawler::importer::ImportedDocument;
use crate::document::Metadata;
use crate::state::CrawlStatus;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a committer
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Persists or removes documents in the final sink
#[async_trait]
pub trait Committer: Send + Sync {
    /// Stores a NEW or MODIFIED document
    async fn commit(&self, document: &ImportedDocument, status: CrawlStatus)
        -> Result<(), CommitError>;

    /// Removes a previously committed document
    async fn remove(&self, identity: &str) -> Result<(), CommitError>;
}

/// Builds the configured committer
pub fn committer_from_config(config: &CommitterConfig) -> Arc<dyn Committer> {
    match config {
        CommitterConfig::Noop => Arc::new(NoopCommitter),
        CommitterConfig::Filesystem { dir } => Arc::new(FileSystemCommitter::new(dir.clone())),
    }
}

/// Discards everything (ledger-only runs)
#[derive(Debug, Clone, Default)]
pub struct NoopCommitter;

#[async_trait]
impl Committer for NoopCommitter {
    async fn commit(
        &self,
        _document: &ImportedDocument,
        _status: CrawlStatus,
    ) -> Result<(), CommitError> {
        Ok(())
    }

    async fn remove(&self, _identity: &str) -> Result<(), CommitError> {
        Ok(())
    }
}

/// Writes one JSON file per reference
///
/// Files are named after the SHA-256 of the reference so that any identity
/// maps to a valid file name.
#[derive(Debug, Clone)]
pub struct FileSystemCommitter {
    dir: PathBuf,
}

#[derive(Serialize)]
struct CommittedDocument<'a> {
    reference: &'a str,
    status: CrawlStatus,
    committed_at: String,
    metadata: &'a Metadata,
    content: String,
}

impl FileSystemCommitter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the file holding `identity`
    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(identity.as_bytes())))
    }
}

#[async_trait]
impl Committer for FileSystemCommitter {
    async fn commit(
        &self,
        document: &ImportedDocument,
        status: CrawlStatus,
    ) -> Result<(), CommitError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let committed = CommittedDocument {
            reference: &document.reference,
            status,
            committed_at: Utc::now().to_rfc3339(),
            metadata: &document.metadata,
            content: String::from_utf8_lossy(&document.content).into_owned(),
        };
        let json = serde_json::to_vec_pretty(&committed)?;

        tokio::fs::write(self.path_for(&document.reference), json).await?;
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<(), CommitError> {
        match tokio::fs::remove_file(self.path_for(identity)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
