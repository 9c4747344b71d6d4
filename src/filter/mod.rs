//! Filter pipeline
//!
//! Three ordered chains reject references before costly work is done:
//! - reference filters see only the identity, before anything is fetched
//! - metadata filters see the pre-fetch metadata
//! - document filters see the fetched document
//!
//! A chain evaluates its filters in configured order and stops at the first
//! rejection. An empty chain accepts everything.

mod builtin;
mod matcher;

pub use builtin::{ExtensionFilter, MaxSizeFilter, MetadataFieldFilter, PatternFilter};
pub use matcher::matches_wildcard;

use crate::config::{FilterConfig, FiltersConfig};
use crate::document::{FetchedDocument, Metadata};
use crate::ConfigError;
use thiserror::Error;

/// Raised when a filter predicate itself fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Filter '{filter}' failed: {message}")]
pub struct FilterError {
    pub filter: String,
    pub message: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

/// Result of running a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Accept,
    /// Rejected by the named filter
    Reject { filter: String },
}

impl FilterOutcome {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Filter over the reference identity alone
pub trait ReferenceFilter: Send + Sync {
    fn name(&self) -> &str;
    fn accept_reference(&self, reference: &str) -> Result<bool, FilterError>;
}

/// Filter over the pre-fetch metadata
pub trait MetadataFilter: Send + Sync {
    fn name(&self) -> &str;
    fn accept_metadata(&self, reference: &str, metadata: &Metadata) -> Result<bool, FilterError>;
}

/// Filter over a fetched document
pub trait DocumentFilter: Send + Sync {
    fn name(&self) -> &str;
    fn accept_document(&self, document: &FetchedDocument) -> Result<bool, FilterError>;
}

/// Runs filters in order until one rejects
fn run_chain<'a, F: ?Sized + 'a>(
    filters: impl IntoIterator<Item = &'a Box<F>>,
    name: impl Fn(&F) -> &str,
    accept: impl Fn(&F) -> Result<bool, FilterError>,
) -> Result<FilterOutcome, FilterError> {
    for filter in filters {
        let filter: &F = filter.as_ref();
        if !accept(filter)? {
            return Ok(FilterOutcome::Reject {
                filter: name(filter).to_string(),
            });
        }
    }
    Ok(FilterOutcome::Accept)
}

/// The three chains of a session
#[derive(Default)]
pub struct Filters {
    reference: Vec<Box<dyn ReferenceFilter>>,
    metadata: Vec<Box<dyn MetadataFilter>>,
    document: Vec<Box<dyn DocumentFilter>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the chains from configuration
    ///
    /// Filters placed in a chain that cannot evaluate them are a
    /// configuration error.
    pub fn from_config(config: &FiltersConfig) -> Result<Self, ConfigError> {
        let mut filters = Self::new();

        for entry in &config.reference {
            let filter: Box<dyn ReferenceFilter> = match entry {
                FilterConfig::Pattern { pattern, on_match } => {
                    Box::new(PatternFilter::new(pattern.clone(), *on_match))
                }
                FilterConfig::Extension {
                    extensions,
                    on_match,
                } => Box::new(ExtensionFilter::new(extensions, *on_match)),
                other => return Err(misplaced(other, "reference")),
            };
            filters.reference.push(filter);
        }

        for entry in &config.metadata {
            let filter: Box<dyn MetadataFilter> = match entry {
                FilterConfig::Pattern { pattern, on_match } => {
                    Box::new(PatternFilter::new(pattern.clone(), *on_match))
                }
                FilterConfig::Extension {
                    extensions,
                    on_match,
                } => Box::new(ExtensionFilter::new(extensions, *on_match)),
                FilterConfig::MetadataField {
                    field,
                    pattern,
                    on_match,
                } => Box::new(MetadataFieldFilter::new(
                    field.clone(),
                    pattern.clone(),
                    *on_match,
                )),
                other => return Err(misplaced(other, "metadata")),
            };
            filters.metadata.push(filter);
        }

        for entry in &config.document {
            let filter: Box<dyn DocumentFilter> = match entry {
                FilterConfig::Pattern { pattern, on_match } => {
                    Box::new(PatternFilter::new(pattern.clone(), *on_match))
                }
                FilterConfig::Extension {
                    extensions,
                    on_match,
                } => Box::new(ExtensionFilter::new(extensions, *on_match)),
                FilterConfig::MetadataField {
                    field,
                    pattern,
                    on_match,
                } => Box::new(MetadataFieldFilter::new(
                    field.clone(),
                    pattern.clone(),
                    *on_match,
                )),
                FilterConfig::MaxSize {
                    max_bytes,
                    on_match,
                } => Box::new(MaxSizeFilter::new(*max_bytes, *on_match)),
            };
            filters.document.push(filter);
        }

        Ok(filters)
    }

    pub fn with_reference_filter(mut self, filter: impl ReferenceFilter + 'static) -> Self {
        self.reference.push(Box::new(filter));
        self
    }

    pub fn with_metadata_filter(mut self, filter: impl MetadataFilter + 'static) -> Self {
        self.metadata.push(Box::new(filter));
        self
    }

    pub fn with_document_filter(mut self, filter: impl DocumentFilter + 'static) -> Self {
        self.document.push(Box::new(filter));
        self
    }

    pub fn check_reference(&self, reference: &str) -> Result<FilterOutcome, FilterError> {
        run_chain(
            &self.reference,
            |f| f.name(),
            |f| f.accept_reference(reference),
        )
    }

    pub fn check_metadata(
        &self,
        reference: &str,
        metadata: &Metadata,
    ) -> Result<FilterOutcome, FilterError> {
        run_chain(
            &self.metadata,
            |f| f.name(),
            |f| f.accept_metadata(reference, metadata),
        )
    }

    pub fn check_document(&self, document: &FetchedDocument) -> Result<FilterOutcome, FilterError> {
        run_chain(
            &self.document,
            |f| f.name(),
            |f| f.accept_document(document),
        )
    }

    /// Returns the number of filters in each chain
    pub fn len(&self) -> (usize, usize, usize) {
        (self.reference.len(), self.metadata.len(), self.document.len())
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() && self.metadata.is_empty() && self.document.is_empty()
    }
}

fn misplaced(filter: &FilterConfig, chain: &str) -> ConfigError {
    ConfigError::Validation(format!(
        "{:?} cannot be used in the {} filter chain",
        filter, chain
    ))
}
