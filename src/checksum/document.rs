//! Document checksummers

use super::{digest_fields, sha256_hex, ChecksumError, DocumentChecksummer};
use crate::document::FetchedDocument;

/// SHA-256 over the document content, or over selected metadata fields
///
/// When source fields are configured the content is ignored, which lets
/// equivalent documents with cosmetic differences share a checksum.
#[derive(Debug, Clone, Default)]
pub struct Sha256DocumentChecksummer {
    source_fields: Option<Vec<String>>,
    keep: bool,
}

impl Sha256DocumentChecksummer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.source_fields = fields.filter(|f| !f.is_empty());
        self
    }

    pub fn keep_checksum(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

impl DocumentChecksummer for Sha256DocumentChecksummer {
    fn document_checksum(
        &self,
        document: &FetchedDocument,
    ) -> Result<Option<String>, ChecksumError> {
        if let Some(fields) = &self.source_fields {
            return Ok(digest_fields(&document.metadata, fields));
        }

        if document.content.is_empty() {
            return Ok(None);
        }
        Ok(Some(sha256_hex(&document.content)))
    }

    fn keep(&self) -> bool {
        self.keep
    }
}
