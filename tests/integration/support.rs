//! Test collaborators and helpers shared by the integration tests

use async_trait::async_trait;
use crawl_collector::config::{parse_config, Config};
use crawl_collector::crawler::{
    CommitError, Committer, FetchError, Fetcher, ImportedDocument,
};
use crawl_collector::document::{FetchedDocument, Metadata};
use crawl_collector::events::{CrawlerEvent, CrawlerEventListener, EventKind, ListenerError};
use crawl_collector::storage::{ledger_path, RetryPolicy};
use crawl_collector::{CrawlStatus, Ledger, SqliteLedger};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone)]
enum Source {
    Document { body: String, children: Vec<String> },
    Broken(String),
}

/// Serves documents from memory and records every metadata fetch
#[derive(Default)]
pub struct MemoryFetcher {
    sources: Mutex<HashMap<String, Source>>,
    fetched: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    hooks: Mutex<HashMap<String, Hook>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, reference: &str, body: &str) {
        self.put_with_children(reference, body, &[]);
    }

    pub fn put_with_children(&self, reference: &str, body: &str, children: &[String]) {
        self.sources.lock().unwrap().insert(
            reference.to_string(),
            Source::Document {
                body: body.to_string(),
                children: children.to_vec(),
            },
        );
    }

    /// Makes every fetch of `reference` fail with a network error
    pub fn break_reference(&self, reference: &str, message: &str) {
        self.sources
            .lock()
            .unwrap()
            .insert(reference.to_string(), Source::Broken(message.to_string()));
    }

    /// Delays every metadata fetch of `reference`
    pub fn delay(&self, reference: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(reference.to_string(), delay);
    }

    /// Runs `hook` once, on the next metadata fetch of `reference`
    pub fn on_next_fetch(&self, reference: &str, hook: impl FnOnce() + Send + 'static) {
        self.hooks
            .lock()
            .unwrap()
            .insert(reference.to_string(), Box::new(hook));
    }

    pub fn remove(&self, reference: &str) {
        self.sources.lock().unwrap().remove(reference);
    }

    /// References whose metadata was fetched, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn source(&self, reference: &str) -> Result<(String, Vec<String>), FetchError> {
        match self.sources.lock().unwrap().get(reference) {
            Some(Source::Document { body, children }) => Ok((body.clone(), children.clone())),
            Some(Source::Broken(message)) => Err(FetchError::Network {
                reference: reference.to_string(),
                message: message.clone(),
            }),
            None => Err(FetchError::NotFound(reference.to_string())),
        }
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_metadata(&self, reference: &str) -> Result<Metadata, FetchError> {
        self.fetched.lock().unwrap().push(reference.to_string());
        let delay = self.delays.lock().unwrap().get(reference).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hook = self.hooks.lock().unwrap().remove(reference);
        if let Some(hook) = hook {
            hook();
        }
        let (body, _) = self.source(reference)?;
        Ok(Metadata::new().with("size", body.len().to_string()))
    }

    async fn fetch_document(
        &self,
        reference: &str,
        metadata: &Metadata,
    ) -> Result<FetchedDocument, FetchError> {
        let (body, children) = self.source(reference)?;
        let mut document = FetchedDocument::new(reference, body);
        document.metadata = metadata.clone();
        document.children = children;
        Ok(document)
    }
}

/// Records commits and removals
#[derive(Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<(String, CrawlStatus)>>,
    removals: Mutex<Vec<String>>,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<(String, CrawlStatus)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commits.lock().unwrap().clear();
        self.removals.lock().unwrap().clear();
    }
}

#[async_trait]
impl Committer for RecordingCommitter {
    async fn commit(
        &self,
        document: &ImportedDocument,
        status: CrawlStatus,
    ) -> Result<(), CommitError> {
        self.commits
            .lock()
            .unwrap()
            .push((document.reference.clone(), status));
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<(), CommitError> {
        self.removals.lock().unwrap().push(identity.to_string());
        Ok(())
    }
}

/// Records every event it receives
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(EventKind, Option<String>)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    /// References reported with `kind`
    pub fn references(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .filter_map(|(_, reference)| reference.clone())
            .collect()
    }
}

impl CrawlerEventListener for RecordingListener {
    fn on_event(&self, event: &CrawlerEvent) -> Result<(), ListenerError> {
        self.events
            .lock()
            .unwrap()
            .push((event.kind, event.reference.clone()));
        Ok(())
    }
}

/// Builds a configuration from the start references and extra TOML
///
/// `crawler` lines are appended to the `[crawler]` table; `extra` follows it.
pub fn config(work_dir: &Path, start: &[&str], crawler: &str, extra: &str) -> Config {
    let start: Vec<String> = start.iter().map(|r| format!("'{}'", r)).collect();
    let toml = format!(
        r#"
start-references = [{}]

[crawler]
id = "integration"
work-dir = '{}'
{}

{}
"#,
        start.join(", "),
        work_dir.display(),
        crawler,
        extra
    );
    parse_config(&toml).expect("Invalid test configuration")
}

pub fn open_ledger(work_dir: &Path) -> SqliteLedger {
    SqliteLedger::open(
        &ledger_path(work_dir),
        "integration",
        RetryPolicy::default(),
    )
    .expect("Failed to open ledger")
}

/// Status of every record, ordered by identity
pub fn statuses(work_dir: &Path) -> Vec<(String, CrawlStatus)> {
    open_ledger(work_dir)
        .snapshot()
        .expect("Failed to snapshot ledger")
        .into_iter()
        .map(|r| (r.identity, r.status))
        .collect()
}

pub fn status_of(work_dir: &Path, identity: &str) -> Option<CrawlStatus> {
    open_ledger(work_dir)
        .get(identity)
        .expect("Failed to read ledger")
        .map(|r| r.status)
}
