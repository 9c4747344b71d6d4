use crate::config::types::{
    CommitterConfig, Config, CrawlerConfig, FetcherConfig, FilterConfig, LedgerConfig,
    MetadataChecksumConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_ledger_config(&config.ledger)?;
    validate_metadata_checksum(&config.checksum.metadata)?;
    validate_filter_chain(FilterChainKind::Reference, &config.filters.reference)?;
    validate_filter_chain(FilterChainKind::Metadata, &config.filters.metadata)?;
    validate_filter_chain(FilterChainKind::Document, &config.filters.document)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_committer_config(&config.committer)?;
    validate_start_references(&config.start_references, &config.fetcher)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler id cannot be empty".to_string(),
        ));
    }

    if config.num_threads < 1 || config.num_threads > 256 {
        return Err(ConfigError::Validation(format!(
            "num-threads must be between 1 and 256, got {}",
            config.num_threads
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "queue-capacity must be >= 1".to_string(),
        ));
    }

    if config.max_documents < -1 {
        return Err(ConfigError::Validation(format!(
            "max-documents must be -1 (unlimited) or >= 0, got {}",
            config.max_documents
        )));
    }

    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max-depth must be -1 (unlimited) or >= 0, got {}",
            config.max_depth
        )));
    }

    Ok(())
}

fn validate_ledger_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.retries < 1 {
        return Err(ConfigError::Validation(
            "ledger retries must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_metadata_checksum(config: &MetadataChecksumConfig) -> Result<(), ConfigError> {
    match config {
        MetadataChecksumConfig::Fields { fields, .. } if fields.is_empty() => Err(
            ConfigError::Validation("metadata checksum fields cannot be empty".to_string()),
        ),
        MetadataChecksumConfig::LastModified { field, .. } if field.trim().is_empty() => Err(
            ConfigError::Validation("metadata checksum field cannot be empty".to_string()),
        ),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy)]
enum FilterChainKind {
    Reference,
    Metadata,
    Document,
}

impl FilterChainKind {
    fn name(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Metadata => "metadata",
            Self::Document => "document",
        }
    }

    /// Reference filters only see the identity; size is only known once
    /// content has been fetched.
    fn accepts(self, filter: &FilterConfig) -> bool {
        match (self, filter) {
            (_, FilterConfig::Pattern { .. } | FilterConfig::Extension { .. }) => true,
            (Self::Reference, _) => false,
            (Self::Metadata, FilterConfig::MetadataField { .. }) => true,
            (Self::Metadata, FilterConfig::MaxSize { .. }) => false,
            (Self::Document, _) => true,
        }
    }
}

/// Validates one filter chain
fn validate_filter_chain(
    chain: FilterChainKind,
    filters: &[FilterConfig],
) -> Result<(), ConfigError> {
    for filter in filters {
        if !chain.accepts(filter) {
            return Err(ConfigError::Validation(format!(
                "'{}' filter is not allowed in the {} chain",
                filter_kind_name(filter),
                chain.name()
            )));
        }

        match filter {
            FilterConfig::Pattern { pattern, .. } | FilterConfig::MetadataField { pattern, .. } => {
                validate_pattern(pattern)?
            }
            FilterConfig::Extension { extensions, .. } => {
                if extensions.is_empty() || extensions.iter().any(|e| e.trim().is_empty()) {
                    return Err(ConfigError::Validation(format!(
                        "extension filter in the {} chain needs non-empty extensions",
                        chain.name()
                    )));
                }
            }
            FilterConfig::MaxSize { .. } => {}
        }

        if let FilterConfig::MetadataField { field, .. } = filter {
            if field.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "metadata-field filter needs a field name".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn filter_kind_name(filter: &FilterConfig) -> &'static str {
    match filter {
        FilterConfig::Pattern { .. } => "pattern",
        FilterConfig::Extension { .. } => "extension",
        FilterConfig::MetadataField { .. } => "metadata-field",
        FilterConfig::MaxSize { .. } => "max-size",
    }
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Filter pattern cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if let FetcherConfig::Http {
        user_agent,
        timeout_secs,
    } = config
    {
        if user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent cannot be empty".to_string(),
            ));
        }
        if *timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout-secs must be >= 1".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_committer_config(config: &CommitterConfig) -> Result<(), ConfigError> {
    if let CommitterConfig::Filesystem { dir } = config {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "committer dir cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates start references against the configured fetcher
fn validate_start_references(
    references: &[String],
    fetcher: &FetcherConfig,
) -> Result<(), ConfigError> {
    for reference in references {
        if reference.trim().is_empty() {
            return Err(ConfigError::InvalidReference(
                "start reference cannot be empty".to_string(),
            ));
        }

        if let FetcherConfig::Http { .. } = fetcher {
            let url = Url::parse(reference).map_err(|e| {
                ConfigError::InvalidReference(format!("Invalid start URL '{}': {}", reference, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::InvalidReference(format!(
                    "Start URL '{}' must use http or https",
                    reference
                )));
            }
        }
    }

    Ok(())
}
