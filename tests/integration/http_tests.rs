//! HTTP fetcher tests
//!
//! These tests use wiremock to create mock HTTP servers.

use crate::support::{config, open_ledger, status_of, RecordingCommitter};
use crawl_collector::crawler::{FetchError, Fetcher, HttpFetcher};
use crawl_collector::{Coordinator, CrawlStatus, Ledger, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new("TestBot/1.0", Duration::from_secs(5)).expect("Failed to build client")
}

#[tokio::test]
async fn test_head_provides_metadata() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&mock_server)
        .await;

    let reference = format!("{}/doc", mock_server.uri());
    let fetcher = fetcher();

    let metadata = fetcher.fetch_metadata(&reference).await.unwrap();
    assert_eq!(metadata.get("etag"), Some("\"v1\""));

    let document = fetcher.fetch_document(&reference, &metadata).await.unwrap();
    assert_eq!(document.content, b"hello");
    assert_eq!(document.metadata.get("etag"), Some("\"v1\""));
    assert_eq!(document.metadata.get("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_status_mapping() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/no-head"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher();
    let base = mock_server.uri();

    let err = fetcher
        .fetch_metadata(&format!("{}/gone", base))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = fetcher
        .fetch_metadata(&format!("{}/broken", base))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));

    let metadata = fetcher
        .fetch_metadata(&format!("{}/no-head", base))
        .await
        .unwrap();
    assert!(metadata.is_empty());
}

#[tokio::test]
async fn test_http_crawl_uses_metadata_fast_path() {
    let mock_server = MockServer::start().await;
    let work = TempDir::new().unwrap();

    Mock::given(method("HEAD"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"v1\""))
        .mount(&mock_server)
        .await;

    // The second session must not download the document again
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("version one"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reference = format!("{}/doc", mock_server.uri());
    let extra = r#"
[fetcher]
kind = "http"
timeout-secs = 5

[checksum.metadata]
kind = "fields"
fields = ["etag"]
"#;

    let committer = Arc::new(RecordingCommitter::new());
    for expected in [CrawlStatus::New, CrawlStatus::Unchanged] {
        let config = config(work.path(), &[reference.as_str()], "", extra);
        let summary = Coordinator::new(config, "hash")
            .expect("Failed to create coordinator")
            .with_committer(committer.clone())
            .run()
            .await
            .expect("Crawl failed");
        assert_eq!(summary.state, SessionState::Finished);
        assert_eq!(status_of(work.path(), &reference), Some(expected));
    }

    assert_eq!(committer.commits(), vec![(reference.clone(), CrawlStatus::New)]);
    let record = open_ledger(work.path()).get(&reference).unwrap().unwrap();
    assert!(record.metadata_checksum.is_some());
    assert!(record.document_checksum.is_some());
}

#[tokio::test]
async fn test_http_crawl_records_deleted_page() {
    let mock_server = MockServer::start().await;
    let work = TempDir::new().unwrap();
    let reference = format!("{}/page", mock_server.uri());
    let extra = "[fetcher]\nkind = \"http\"\n";

    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("content"))
        .mount(&mock_server)
        .await;

    let start = [reference.as_str()];
    Coordinator::new(config(work.path(), &start, "", extra), "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(status_of(work.path(), &reference), Some(CrawlStatus::New));

    mock_server.reset().await;
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let summary = Coordinator::new(config(work.path(), &start, "", extra), "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.count(CrawlStatus::Deleted), 1);
    assert_eq!(status_of(work.path(), &reference), Some(CrawlStatus::Deleted));
}
