//! Spoiled reference strategies
//!
//! A reference is spoiled when it had a valid record in a previous run and
//! ends in ERROR or REJECTED in the current one.

use crate::config::SpoiledConfig;
use crate::state::CrawlStatus;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// What to do with a spoiled reference once the run is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpoiledDecision {
    /// Remove the record and the committed document
    Delete,
    /// Keep the record; the reference is retried next run
    Ignore,
    /// Ignore once, delete if it is still spoiled on the following run
    GraceOnce,
}

impl SpoiledDecision {
    /// Resolves `GraceOnce` against the status recorded before this run
    ///
    /// The result is always `Delete` or `Ignore`.
    pub fn resolve(self, prior: CrawlStatus) -> Self {
        match self {
            Self::GraceOnce if prior.is_spoiled() => Self::Delete,
            Self::GraceOnce => Self::Ignore,
            other => other,
        }
    }
}

impl fmt::Display for SpoiledDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => f.write_str("delete"),
            Self::Ignore => f.write_str("ignore"),
            Self::GraceOnce => f.write_str("grace-once"),
        }
    }
}

/// Decides what happens to a spoiled reference
///
/// Implementations must be total: every (prior, current) pair yields a
/// decision.
pub trait SpoiledReferenceStrategizer: Send + Sync {
    fn decide(&self, prior: CrawlStatus, current: CrawlStatus) -> SpoiledDecision;
}

/// Per-status mapping with a fallback
#[derive(Debug, Clone)]
pub struct GenericSpoiledStrategizer {
    mappings: HashMap<CrawlStatus, SpoiledDecision>,
    fallback: SpoiledDecision,
}

impl GenericSpoiledStrategizer {
    pub fn new(fallback: SpoiledDecision) -> Self {
        Self {
            mappings: HashMap::new(),
            fallback,
        }
    }

    pub fn from_config(config: &SpoiledConfig) -> Self {
        Self::new(config.fallback)
            .with_mapping(CrawlStatus::Error, config.error)
            .with_mapping(CrawlStatus::Rejected, config.rejected)
    }

    pub fn with_mapping(mut self, status: CrawlStatus, decision: SpoiledDecision) -> Self {
        self.mappings.insert(status, decision);
        self
    }
}

impl Default for GenericSpoiledStrategizer {
    fn default() -> Self {
        Self::from_config(&SpoiledConfig::default())
    }
}

impl SpoiledReferenceStrategizer for GenericSpoiledStrategizer {
    fn decide(&self, prior: CrawlStatus, current: CrawlStatus) -> SpoiledDecision {
        self.mappings
            .get(&current)
            .copied()
            .unwrap_or(self.fallback)
            .resolve(prior)
    }
}
