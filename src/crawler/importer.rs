//! Importer collaborator: turns a fetched document into what gets committed

use crate::document::{FetchedDocument, Metadata};
use async_trait::async_trait;
use thiserror::Error;

/// Raised when a document cannot be transformed
#[derive(Debug, Error)]
#[error("Import failed for {reference}: {message}")]
pub struct ImportError {
    pub reference: String,
    pub message: String,
}

/// A document ready for the committer
#[derive(Debug, Clone)]
pub struct ImportedDocument {
    pub reference: String,
    pub metadata: Metadata,
    pub content: Vec<u8>,
}

impl From<FetchedDocument> for ImportedDocument {
    fn from(document: FetchedDocument) -> Self {
        Self {
            reference: document.reference,
            metadata: document.metadata,
            content: document.content,
        }
    }
}

/// Transforms fetched documents
#[async_trait]
pub trait Importer: Send + Sync {
    async fn import(&self, document: FetchedDocument) -> Result<ImportedDocument, ImportError>;
}

/// Hands documents to the committer unchanged
#[derive(Debug, Clone, Default)]
pub struct PassthroughImporter;

#[async_trait]
impl Importer for PassthroughImporter {
    async fn import(&self, document: FetchedDocument) -> Result<ImportedDocument, ImportError> {
        Ok(document.into())
    }
}
