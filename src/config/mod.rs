//! Configuration module for the collector
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_collector::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("collector.toml")).unwrap();
//! println!("Crawler {} uses {} workers", config.crawler.id, config.crawler.num_threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChecksumConfig, CommitterConfig, Config, CrawlerConfig, DocumentChecksumConfig,
    FetcherConfig, FilterConfig, FiltersConfig, LedgerConfig, MetadataChecksumConfig, OnMatch,
    SpoiledConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
