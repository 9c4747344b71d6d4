//! Metadata and document values passed between the pipeline stages

use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata field holding the metadata checksum when it is kept
pub const METADATA_CHECKSUM_FIELD: &str = "collector.metadata-checksum";

/// Metadata field holding the document checksum when it is kept
pub const DOCUMENT_CHECKSUM_FIELD: &str = "collector.document-checksum";

/// Pre-fetch properties of a reference (HTTP headers, file attributes, ...)
///
/// Field names are case-insensitive; they are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    fields: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.fields
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder-style variant of `insert`
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every field of `other` into this metadata
    pub fn merge(&mut self, other: &Metadata) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

/// Content returned by a fetcher
#[derive(Debug, Clone, Default)]
pub struct FetchedDocument {
    pub reference: String,
    pub metadata: Metadata,
    pub content: Vec<u8>,

    /// References the fetch layer already knows to be reachable from this one
    /// (for instance directory entries)
    pub children: Vec<String>,
}

impl FetchedDocument {
    pub fn new(reference: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            reference: reference.into(),
            metadata: Metadata::new(),
            content: content.into(),
            children: Vec::new(),
        }
    }
}
