//! Fetchers: obtain metadata and content for a reference
//!
//! This module provides:
//! - the `Fetcher` collaborator contract
//! - `FileFetcher` for local files and directories
//! - `HttpFetcher` for HTTP(S) URLs (HEAD for metadata, GET for content)
//!
//! A fetcher reports a missing reference as `FetchError::NotFound`, which
//! the pipeline records as DELETED. Every other failure is recorded as ERROR.

use crate::config::FetcherConfig;
use crate::document::{FetchedDocument, Metadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {reference}")]
    Status { reference: String, status: u16 },

    #[error("Network error for {reference}: {message}")]
    Network { reference: String, message: String },

    #[error("IO error for {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Obtains pre-fetch metadata and content for references
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the cheap, pre-fetch metadata of a reference
    async fn fetch_metadata(&self, reference: &str) -> Result<Metadata, FetchError>;

    /// Fetches the document itself
    ///
    /// `metadata` is what `fetch_metadata` returned for the same reference.
    async fn fetch_document(
        &self,
        reference: &str,
        metadata: &Metadata,
    ) -> Result<FetchedDocument, FetchError>;
}

/// Builds the configured fetcher
pub fn fetcher_from_config(config: &FetcherConfig) -> Result<Arc<dyn Fetcher>, reqwest::Error> {
    match config {
        FetcherConfig::File => Ok(Arc::new(FileFetcher::new())),
        FetcherConfig::Http {
            user_agent,
            timeout_secs,
        } => Ok(Arc::new(HttpFetcher::new(
            user_agent,
            Duration::from_secs(*timeout_secs),
        )?)),
    }
}

// ===== Files =====

/// Fetches local files and directories
///
/// Metadata fields: `size`, `modified` (RFC 3339) and `type`
/// (`file` or `directory`). A directory's content is the sorted listing of
/// its entries, and its entries are reported as children.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }
}

fn file_path(reference: &str) -> PathBuf {
    PathBuf::from(reference.strip_prefix("file://").unwrap_or(reference))
}

fn io_error(reference: &str, source: std::io::Error) -> FetchError {
    if source.kind() == std::io::ErrorKind::NotFound {
        FetchError::NotFound(reference.to_string())
    } else {
        FetchError::Io {
            reference: reference.to_string(),
            source,
        }
    }
}

async fn list_directory(reference: &str, path: &Path) -> Result<Vec<String>, FetchError> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| io_error(reference, e))?;

    let mut children = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error(reference, e))?
    {
        children.push(entry.path().to_string_lossy().into_owned());
    }
    children.sort();
    Ok(children)
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch_metadata(&self, reference: &str) -> Result<Metadata, FetchError> {
        let path = file_path(reference);
        let attributes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(reference, e))?;

        let mut metadata = Metadata::new()
            .with("size", attributes.len().to_string())
            .with(
                "type",
                if attributes.is_dir() {
                    "directory"
                } else {
                    "file"
                },
            );
        if let Ok(modified) = attributes.modified() {
            metadata.insert("modified", DateTime::<Utc>::from(modified).to_rfc3339());
        }
        Ok(metadata)
    }

    async fn fetch_document(
        &self,
        reference: &str,
        metadata: &Metadata,
    ) -> Result<FetchedDocument, FetchError> {
        let path = file_path(reference);

        let mut document = if metadata.get("type") == Some("directory") {
            let children = list_directory(reference, &path).await?;
            let mut document = FetchedDocument::new(reference, children.join("\n"));
            document.children = children;
            document
        } else {
            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| io_error(reference, e))?;
            FetchedDocument::new(reference, content)
        };

        document.metadata = metadata.clone();
        Ok(document)
    }
}

// ===== HTTP =====

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The User-Agent header sent with every request
/// * `timeout` - Total request timeout
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches HTTP(S) references
///
/// | Response | Result |
/// |----------|--------|
/// | 404, 410 | `NotFound` (DELETED) |
/// | 405 on HEAD | empty metadata (servers without HEAD support) |
/// | other non-2xx | `Status` (ERROR) |
/// | timeout, connection failure | `Network` (ERROR) |
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn network_error(reference: &str, e: reqwest::Error) -> FetchError {
    let message = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    };
    FetchError::Network {
        reference: reference.to_string(),
        message,
    }
}

fn check_status(reference: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(FetchError::NotFound(reference.to_string()));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            reference: reference.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

fn headers_to_metadata(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            metadata.insert(name.as_str(), value);
        }
    }
    metadata
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_metadata(&self, reference: &str) -> Result<Metadata, FetchError> {
        let response = self
            .client
            .head(reference)
            .send()
            .await
            .map_err(|e| network_error(reference, e))?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!("HEAD not supported by {}, metadata left empty", reference);
            return Ok(Metadata::new());
        }
        check_status(reference, response.status())?;

        Ok(headers_to_metadata(response.headers()))
    }

    async fn fetch_document(
        &self,
        reference: &str,
        metadata: &Metadata,
    ) -> Result<FetchedDocument, FetchError> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| network_error(reference, e))?;
        check_status(reference, response.status())?;

        let mut merged = metadata.clone();
        merged.merge(&headers_to_metadata(response.headers()));

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(reference, e))?;

        let mut document = FetchedDocument::new(reference, body.to_vec());
        document.metadata = merged;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client("TestBot/1.0", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_file_path_strips_scheme() {
        assert_eq!(file_path("file:///tmp/a.txt"), PathBuf::from("/tmp/a.txt"));
        assert_eq!(file_path("/tmp/a.txt"), PathBuf::from("/tmp/a.txt"));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("u", StatusCode::OK).is_ok());
        assert!(check_status("u", StatusCode::NOT_FOUND)
            .unwrap_err()
            .is_not_found());
        assert!(check_status("u", StatusCode::GONE).unwrap_err().is_not_found());
        assert!(matches!(
            check_status("u", StatusCode::INTERNAL_SERVER_ERROR),
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let reference = path.to_string_lossy().into_owned();

        let fetcher = FileFetcher::new();
        let metadata = fetcher.fetch_metadata(&reference).await.unwrap();
        assert_eq!(metadata.get("size"), Some("5"));
        assert_eq!(metadata.get("type"), Some("file"));
        assert!(metadata.get("modified").is_some());

        let document = fetcher.fetch_document(&reference, &metadata).await.unwrap();
        assert_eq!(document.content, b"hello");
        assert!(document.children.is_empty());
    }

    #[tokio::test]
    async fn test_file_fetcher_lists_directory_children() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let reference = dir.path().to_string_lossy().into_owned();

        let fetcher = FileFetcher::new();
        let metadata = fetcher.fetch_metadata(&reference).await.unwrap();
        let document = fetcher.fetch_document(&reference, &metadata).await.unwrap();

        assert_eq!(document.children.len(), 2);
        assert!(document.children[0].ends_with("a.txt"));
        assert!(document.children[1].ends_with("b.txt"));
        assert!(!document.content.is_empty());
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let reference = dir.path().join("gone.txt").to_string_lossy().into_owned();

        let err = FileFetcher::new().fetch_metadata(&reference).await.unwrap_err();
        assert!(err.is_not_found());
    }

    // HTTP responses are exercised with wiremock in the integration tests
}
