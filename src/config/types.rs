use crate::policy::{ErrorKind, OrphansStrategy, SpoiledDecision};
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the collector
///
/// The configuration is immutable for the lifetime of a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub checksum: ChecksumConfig,
    #[serde(default)]
    pub spoiled: SpoiledConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub committer: CommitterConfig,
    #[serde(default)]
    pub start_references: Vec<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Unique identifier of this logical crawl; scopes its ledger records
    pub id: String,

    /// Number of concurrent workers
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Directory holding the ledger database
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Maximum documents processed per session (-1 for unlimited)
    #[serde(default = "unlimited")]
    pub max_documents: i64,

    /// Maximum depth from start references (-1 for unlimited)
    #[serde(default = "unlimited")]
    pub max_depth: i64,

    /// What to do with ledger records not visited during a session
    #[serde(default)]
    pub orphans_strategy: OrphansStrategy,

    /// Error kinds that stop the whole session when raised
    #[serde(default)]
    pub stop_on_exceptions: Vec<ErrorKind>,

    /// Number of frontier entries held in memory
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Skip the document fetch when the metadata checksum did not change
    #[serde(default = "default_true")]
    pub metadata_fast_path: bool,
}

impl CrawlerConfig {
    /// Maximum documents as an option (None when unlimited)
    pub fn max_documents_limit(&self) -> Option<u64> {
        u64::try_from(self.max_documents).ok()
    }

    /// Maximum depth as an option (None when unlimited)
    pub fn max_depth_limit(&self) -> Option<u32> {
        u32::try_from(self.max_depth).ok()
    }
}

/// Ledger storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LedgerConfig {
    /// Total attempts for a storage operation on transient failures
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before the first retry (milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Checksum strategies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChecksumConfig {
    #[serde(default)]
    pub metadata: MetadataChecksumConfig,
    #[serde(default)]
    pub document: DocumentChecksumConfig,
}

/// Metadata checksum strategy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MetadataChecksumConfig {
    #[default]
    Disabled,
    Fields {
        fields: Vec<String>,
        #[serde(default)]
        keep: bool,
    },
    LastModified {
        #[serde(default = "default_last_modified_field")]
        field: String,
        #[serde(default)]
        keep: bool,
    },
}

/// Document checksum strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DocumentChecksumConfig {
    Disabled,
    Sha256 {
        #[serde(default, rename = "source-fields")]
        source_fields: Option<Vec<String>>,
        #[serde(default)]
        keep: bool,
    },
}

impl Default for DocumentChecksumConfig {
    fn default() -> Self {
        Self::Sha256 {
            source_fields: None,
            keep: false,
        }
    }
}

/// Spoiled reference policy, keyed by the status reached in this run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpoiledConfig {
    #[serde(default = "default_error_decision")]
    pub error: SpoiledDecision,
    #[serde(default = "default_rejected_decision")]
    pub rejected: SpoiledDecision,
    #[serde(default = "default_fallback_decision")]
    pub fallback: SpoiledDecision,
}

impl Default for SpoiledConfig {
    fn default() -> Self {
        Self {
            error: default_error_decision(),
            rejected: default_rejected_decision(),
            fallback: default_fallback_decision(),
        }
    }
}

/// The three filter chains, in evaluation order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FiltersConfig {
    #[serde(default)]
    pub reference: Vec<FilterConfig>,
    #[serde(default)]
    pub metadata: Vec<FilterConfig>,
    #[serde(default)]
    pub document: Vec<FilterConfig>,
}

/// Whether matching a filter keeps or rejects a reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMatch {
    /// Only matching references are kept
    #[default]
    Include,
    /// Matching references are rejected
    Exclude,
}

/// One built-in filter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilterConfig {
    /// Wildcard pattern on the reference identity
    Pattern {
        pattern: String,
        #[serde(default, rename = "on-match")]
        on_match: OnMatch,
    },
    /// File extension of the reference identity
    Extension {
        extensions: Vec<String>,
        #[serde(default, rename = "on-match")]
        on_match: OnMatch,
    },
    /// Wildcard pattern on a metadata field value
    MetadataField {
        field: String,
        pattern: String,
        #[serde(default, rename = "on-match")]
        on_match: OnMatch,
    },
    /// Content larger than `max-bytes`
    MaxSize {
        #[serde(rename = "max-bytes")]
        max_bytes: u64,
        #[serde(default = "default_exclude", rename = "on-match")]
        on_match: OnMatch,
    },
}

/// Which fetcher to use
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FetcherConfig {
    /// Local files and directories
    File,
    /// HTTP(S) URLs
    Http {
        #[serde(default = "default_user_agent", rename = "user-agent")]
        user_agent: String,
        #[serde(default = "default_timeout_secs", rename = "timeout-secs")]
        timeout_secs: u64,
    },
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::File
    }
}

/// Which committer to use
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CommitterConfig {
    /// Discard documents (ledger-only runs)
    #[default]
    Noop,
    /// One JSON file per committed reference
    Filesystem { dir: PathBuf },
}

fn default_num_threads() -> usize {
    2
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn unlimited() -> i64 {
    -1
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_last_modified_field() -> String {
    "last-modified".to_string()
}

fn default_error_decision() -> SpoiledDecision {
    SpoiledDecision::Ignore
}

fn default_rejected_decision() -> SpoiledDecision {
    SpoiledDecision::Delete
}

fn default_fallback_decision() -> SpoiledDecision {
    SpoiledDecision::Delete
}

fn default_exclude() -> OnMatch {
    OnMatch::Exclude
}

fn default_user_agent() -> String {
    format!("crawl-collector/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}
