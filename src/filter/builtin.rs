//! Built-in filters

use super::matcher::matches_wildcard;
use super::{DocumentFilter, FilterError, MetadataFilter, ReferenceFilter};
use crate::config::OnMatch;
use crate::document::{FetchedDocument, Metadata};

/// Turns "the filter matched" into "the reference is accepted"
fn accepts(on_match: OnMatch, matched: bool) -> bool {
    match on_match {
        OnMatch::Include => matched,
        OnMatch::Exclude => !matched,
    }
}

/// Wildcard pattern against the reference identity
#[derive(Debug, Clone)]
pub struct PatternFilter {
    name: String,
    pattern: String,
    on_match: OnMatch,
}

impl PatternFilter {
    pub fn new(pattern: impl Into<String>, on_match: OnMatch) -> Self {
        let pattern = pattern.into();
        Self {
            name: format!("pattern:{}", pattern),
            pattern,
            on_match,
        }
    }

    fn check(&self, reference: &str) -> bool {
        accepts(self.on_match, matches_wildcard(&self.pattern, reference))
    }
}

impl ReferenceFilter for PatternFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_reference(&self, reference: &str) -> Result<bool, FilterError> {
        Ok(self.check(reference))
    }
}

impl MetadataFilter for PatternFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_metadata(&self, reference: &str, _metadata: &Metadata) -> Result<bool, FilterError> {
        Ok(self.check(reference))
    }
}

impl DocumentFilter for PatternFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_document(&self, document: &FetchedDocument) -> Result<bool, FilterError> {
        Ok(self.check(&document.reference))
    }
}

/// File extension of the reference identity, case-insensitive
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    name: String,
    extensions: Vec<String>,
    on_match: OnMatch,
}

impl ExtensionFilter {
    pub fn new(extensions: &[String], on_match: OnMatch) -> Self {
        let extensions: Vec<String> = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            name: format!("extension:{}", extensions.join(",")),
            extensions,
            on_match,
        }
    }

    fn check(&self, reference: &str) -> bool {
        let matched = extension_of(reference)
            .map(|ext| self.extensions.iter().any(|e| *e == ext))
            .unwrap_or(false);
        accepts(self.on_match, matched)
    }
}

/// Lowercased extension of the last path segment, ignoring query and fragment
fn extension_of(reference: &str) -> Option<String> {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

impl ReferenceFilter for ExtensionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_reference(&self, reference: &str) -> Result<bool, FilterError> {
        Ok(self.check(reference))
    }
}

impl MetadataFilter for ExtensionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_metadata(&self, reference: &str, _metadata: &Metadata) -> Result<bool, FilterError> {
        Ok(self.check(reference))
    }
}

impl DocumentFilter for ExtensionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_document(&self, document: &FetchedDocument) -> Result<bool, FilterError> {
        Ok(self.check(&document.reference))
    }
}

/// Wildcard pattern against one metadata field's value
///
/// A missing field never matches.
#[derive(Debug, Clone)]
pub struct MetadataFieldFilter {
    name: String,
    field: String,
    pattern: String,
    on_match: OnMatch,
}

impl MetadataFieldFilter {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>, on_match: OnMatch) -> Self {
        let field = field.into();
        let pattern = pattern.into();
        Self {
            name: format!("metadata-field:{}={}", field, pattern),
            field,
            pattern,
            on_match,
        }
    }

    fn check(&self, metadata: &Metadata) -> bool {
        let matched = metadata
            .get(&self.field)
            .map(|value| matches_wildcard(&self.pattern, value))
            .unwrap_or(false);
        accepts(self.on_match, matched)
    }
}

impl MetadataFilter for MetadataFieldFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_metadata(&self, _reference: &str, metadata: &Metadata) -> Result<bool, FilterError> {
        Ok(self.check(metadata))
    }
}

impl DocumentFilter for MetadataFieldFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_document(&self, document: &FetchedDocument) -> Result<bool, FilterError> {
        Ok(self.check(&document.metadata))
    }
}

/// Matches content longer than `max_bytes`
#[derive(Debug, Clone)]
pub struct MaxSizeFilter {
    name: String,
    max_bytes: u64,
    on_match: OnMatch,
}

impl MaxSizeFilter {
    pub fn new(max_bytes: u64, on_match: OnMatch) -> Self {
        Self {
            name: format!("max-size:{}", max_bytes),
            max_bytes,
            on_match,
        }
    }
}

impl DocumentFilter for MaxSizeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_document(&self, document: &FetchedDocument) -> Result<bool, FilterError> {
        let matched = document.content.len() as u64 > self.max_bytes;
        Ok(accepts(self.on_match, matched))
    }
}
