//! Metadata checksummers

use super::{digest_fields, ChecksumError, MetadataChecksummer};
use crate::document::Metadata;
use chrono::{DateTime, Utc};

/// Digest over a configured list of metadata fields
///
/// Typical fields are `last-modified`, `etag` or `content-length` for HTTP,
/// `size` and `modified` for files.
#[derive(Debug, Clone)]
pub struct FieldsMetadataChecksummer {
    fields: Vec<String>,
    keep: bool,
}

impl FieldsMetadataChecksummer {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            keep: false,
        }
    }

    pub fn keep_checksum(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

impl MetadataChecksummer for FieldsMetadataChecksummer {
    fn metadata_checksum(&self, metadata: &Metadata) -> Result<Option<String>, ChecksumError> {
        Ok(digest_fields(metadata, &self.fields))
    }

    fn keep(&self) -> bool {
        self.keep
    }
}

/// Uses a last-modification date as the checksum
///
/// The date is accepted in RFC 2822 (HTTP) or RFC 3339 form and normalised
/// to RFC 3339 UTC, so equal instants written differently compare equal.
#[derive(Debug, Clone)]
pub struct LastModifiedMetadataChecksummer {
    field: String,
    keep: bool,
}

impl LastModifiedMetadataChecksummer {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            keep: false,
        }
    }

    pub fn keep_checksum(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

impl MetadataChecksummer for LastModifiedMetadataChecksummer {
    fn metadata_checksum(&self, metadata: &Metadata) -> Result<Option<String>, ChecksumError> {
        let Some(raw) = metadata.get(&self.field) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let parsed = DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .map_err(|e| ChecksumError::MalformedField {
                field: self.field.clone(),
                reason: format!("'{}' is not a valid date: {}", raw, e),
            })?;

        Ok(Some(parsed.with_timezone(&Utc).to_rfc3339()))
    }

    fn keep(&self) -> bool {
        self.keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_checksum_equal_for_equal_values() {
        let checksummer =
            FieldsMetadataChecksummer::new(vec!["etag".to_string(), "content-length".to_string()]);
        let a = Metadata::new().with("ETag", "\"v1\"").with("Content-Length", "10");
        let b = Metadata::new().with("etag", "\"v1\"").with("content-length", "10");

        assert_eq!(
            checksummer.metadata_checksum(&a).unwrap(),
            checksummer.metadata_checksum(&b).unwrap()
        );
    }

    #[test]
    fn test_fields_checksum_changes_with_values() {
        let checksummer = FieldsMetadataChecksummer::new(vec!["etag".to_string()]);
        let a = Metadata::new().with("etag", "v1");
        let b = Metadata::new().with("etag", "v2");

        assert_ne!(
            checksummer.metadata_checksum(&a).unwrap(),
            checksummer.metadata_checksum(&b).unwrap()
        );
    }

    #[test]
    fn test_fields_checksum_absent_without_fields() {
        let checksummer = FieldsMetadataChecksummer::new(vec!["etag".to_string()]);
        assert_eq!(checksummer.metadata_checksum(&Metadata::new()).unwrap(), None);
    }

    #[test]
    fn test_last_modified_normalises_formats() {
        let checksummer = LastModifiedMetadataChecksummer::new("last-modified");
        let http = Metadata::new().with("Last-Modified", "Tue, 15 Nov 1994 08:12:31 GMT");
        let iso = Metadata::new().with("last-modified", "1994-11-15T08:12:31+00:00");

        let a = checksummer.metadata_checksum(&http).unwrap();
        let b = checksummer.metadata_checksum(&iso).unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_last_modified_absent_is_not_an_error() {
        let checksummer = LastModifiedMetadataChecksummer::new("last-modified");
        assert_eq!(checksummer.metadata_checksum(&Metadata::new()).unwrap(), None);

        let blank = Metadata::new().with("last-modified", "  ");
        assert_eq!(checksummer.metadata_checksum(&blank).unwrap(), None);
    }

    #[test]
    fn test_last_modified_malformed_is_an_error() {
        let checksummer = LastModifiedMetadataChecksummer::new("last-modified");
        let metadata = Metadata::new().with("last-modified", "yesterday-ish");

        let result = checksummer.metadata_checksum(&metadata);
        assert!(matches!(
            result,
            Err(ChecksumError::MalformedField { ref field, .. }) if field == "last-modified"
        ));
    }
}
