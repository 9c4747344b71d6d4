//! Checksum subsystem
//!
//! Checksums let the collector detect change without comparing full
//! content. Two strategies are involved for every reference:
//! - a metadata checksum computed from pre-fetch metadata, cheap enough to
//!   skip the document fetch when nothing changed
//! - a document checksum computed from fetched content
//!
//! Checksums are equivalence classes, not identities: two references may
//! legitimately share one. Absence of data is `Ok(None)`, never an error.

mod document;
mod metadata;

pub use document::Sha256DocumentChecksummer;
pub use metadata::{FieldsMetadataChecksummer, LastModifiedMetadataChecksummer};

use crate::config::{DocumentChecksumConfig, MetadataChecksumConfig};
use crate::document::{FetchedDocument, Metadata};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Raised only when a checksummer is given malformed input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumError {
    #[error("Malformed value in field '{field}': {reason}")]
    MalformedField { field: String, reason: String },
}

/// Creates a checksum from metadata obtained before fetching a document
pub trait MetadataChecksummer: Send + Sync {
    /// Computes the checksum, or `None` when the metadata carries nothing
    /// to compute it from
    fn metadata_checksum(&self, metadata: &Metadata) -> Result<Option<String>, ChecksumError>;

    /// Whether the checksum should be stored back into document metadata
    fn keep(&self) -> bool {
        false
    }
}

/// Creates a checksum from a fetched document
pub trait DocumentChecksummer: Send + Sync {
    /// Computes the checksum, or `None` when the document carries nothing
    /// to compute it from
    fn document_checksum(&self, document: &FetchedDocument)
        -> Result<Option<String>, ChecksumError>;

    /// Whether the checksum should be stored back into document metadata
    fn keep(&self) -> bool {
        false
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of the configured fields present in `metadata`
///
/// Fields are hashed as `name=value` lines in the given order. Returns
/// `None` if none of the fields is present.
pub(crate) fn digest_fields(metadata: &Metadata, fields: &[String]) -> Option<String> {
    let mut hasher = Sha256::new();
    let mut found = false;
    for field in fields {
        if let Some(value) = metadata.get(field) {
            hasher.update(field.to_ascii_lowercase().as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
            found = true;
        }
    }
    found.then(|| hex::encode(hasher.finalize()))
}

/// Builds the configured metadata checksummer, if any
pub fn metadata_checksummer_from_config(
    config: &MetadataChecksumConfig,
) -> Option<Box<dyn MetadataChecksummer>> {
    match config {
        MetadataChecksumConfig::Disabled => None,
        MetadataChecksumConfig::Fields { fields, keep } => Some(Box::new(
            FieldsMetadataChecksummer::new(fields.clone()).keep_checksum(*keep),
        )),
        MetadataChecksumConfig::LastModified { field, keep } => Some(Box::new(
            LastModifiedMetadataChecksummer::new(field.clone()).keep_checksum(*keep),
        )),
    }
}

/// Builds the configured document checksummer, if any
pub fn document_checksummer_from_config(
    config: &DocumentChecksumConfig,
) -> Option<Box<dyn DocumentChecksummer>> {
    match config {
        DocumentChecksumConfig::Disabled => None,
        DocumentChecksumConfig::Sha256 {
            source_fields,
            keep,
        } => Some(Box::new(
            Sha256DocumentChecksummer::new()
                .with_source_fields(source_fields.clone())
                .keep_checksum(*keep),
        )),
    }
}
