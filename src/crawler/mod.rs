//! Crawler module: the crawl session engine
//!
//! This module contains the core collector logic, including:
//! - The fetcher, importer and committer collaborator contracts
//! - The bounded, persisted frontier
//! - The per-reference processing pipeline
//! - Overall session coordination

mod committer;
mod coordinator;
mod fetcher;
mod frontier;
mod importer;
mod pipeline;

pub use committer::{
    committer_from_config, CommitError, Committer, FileSystemCommitter, NoopCommitter,
};
pub use coordinator::{Coordinator, CrawlSummary, StopHandle, StopReason};
pub use fetcher::{
    build_http_client, fetcher_from_config, FetchError, Fetcher, FileFetcher, HttpFetcher,
};
pub use frontier::Frontier;
pub use importer::{ImportError, ImportedDocument, Importer, PassthroughImporter};
pub use pipeline::{compute_status, metadata_unchanged, ProcessingError, SpoiledReference};

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl session with the configured collaborators
///
/// # Arguments
///
/// * `config` - The collector configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Ignore any interrupted session
///
/// # Example
///
/// ```no_run
/// use crawl_collector::config::load_config_with_hash;
/// use crawl_collector::crawler::crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("collector.toml"))?;
/// let summary = crawl(config, hash, false).await?;
/// println!("{} references processed", summary.processed);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: Config, config_hash: String, fresh: bool) -> Result<CrawlSummary> {
    Coordinator::new(config, config_hash)?
        .fresh(fresh)
        .run()
        .await
}
