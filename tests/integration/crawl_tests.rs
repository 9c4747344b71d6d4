//! Session-level tests with in-memory collaborators

use crate::support::{
    config, open_ledger, status_of, statuses, MemoryFetcher, RecordingCommitter,
    RecordingListener,
};
use crawl_collector::config::Config;
use crawl_collector::crawler::{CrawlSummary, StopReason};
use crawl_collector::events::EventKind;
use crawl_collector::policy::ErrorKind;
use crawl_collector::storage::{ledger_path, SessionStatus};
use crawl_collector::{CollectorError, Coordinator, CrawlStatus, Ledger, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    fetcher: Arc<MemoryFetcher>,
    committer: Arc<RecordingCommitter>,
    listener: Arc<RecordingListener>,
}

impl Harness {
    fn new() -> Self {
        Self {
            fetcher: Arc::new(MemoryFetcher::new()),
            committer: Arc::new(RecordingCommitter::new()),
            listener: Arc::new(RecordingListener::new()),
        }
    }

    fn coordinator(&self, config: Config) -> Coordinator {
        Coordinator::new(config, "test-hash")
            .expect("Failed to create coordinator")
            .with_fetcher(self.fetcher.clone())
            .with_committer(self.committer.clone())
            .with_listener(self.listener.clone())
    }

    async fn run(&self, config: Config) -> CrawlSummary {
        self.coordinator(config).run().await.expect("Crawl failed")
    }
}

#[tokio::test]
async fn test_changed_and_missing_references() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.put("mem://b", "bravo");
    harness.fetcher.put("mem://c", "charlie");
    let start = ["mem://a", "mem://b", "mem://c"];

    let summary = harness.run(config(work.path(), &start, "", "")).await;
    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.count(CrawlStatus::New), 3);
    assert_eq!(harness.committer.commits().len(), 3);

    harness.committer.clear();
    harness.fetcher.put("mem://b", "bravo, revised");
    harness.fetcher.remove("mem://c");

    let summary = harness.run(config(work.path(), &start, "", "")).await;
    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.orphans, 0);
    assert_eq!(
        statuses(work.path()),
        vec![
            ("mem://a".to_string(), CrawlStatus::Unchanged),
            ("mem://b".to_string(), CrawlStatus::Modified),
            ("mem://c".to_string(), CrawlStatus::Deleted),
        ]
    );

    // Unchanged documents never reach the committer
    assert_eq!(
        harness.committer.commits(),
        vec![("mem://b".to_string(), CrawlStatus::Modified)]
    );
    assert_eq!(harness.committer.removals(), vec!["mem://c".to_string()]);

    let ledger = open_ledger(work.path());
    let c = ledger.get("mem://c").unwrap().unwrap();
    assert_eq!(c.document_checksum, None);
    assert!(ledger
        .snapshot()
        .unwrap()
        .iter()
        .all(|r| r.processed_in_current_run));
}

#[tokio::test]
async fn test_orphans_delete() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.put("mem://b", "bravo");

    harness
        .run(config(work.path(), &["mem://a", "mem://b"], "", ""))
        .await;

    let summary = harness
        .run(config(
            work.path(),
            &["mem://a"],
            "orphans-strategy = \"delete\"",
            "",
        ))
        .await;

    assert_eq!(summary.orphans, 1);
    assert_eq!(summary.orphans_removed, 1);
    assert_eq!(status_of(work.path(), "mem://b"), None);
    assert_eq!(status_of(work.path(), "mem://a"), Some(CrawlStatus::Unchanged));
    assert_eq!(harness.committer.removals(), vec!["mem://b".to_string()]);
    assert_eq!(
        harness.listener.references(EventKind::ReferenceRemoved),
        vec!["mem://b".to_string()]
    );
}

#[tokio::test]
async fn test_orphans_ignore() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.put("mem://b", "bravo");

    harness
        .run(config(work.path(), &["mem://a", "mem://b"], "", ""))
        .await;
    let before = open_ledger(work.path()).get("mem://b").unwrap().unwrap();

    let summary = harness
        .run(config(
            work.path(),
            &["mem://a"],
            "orphans-strategy = \"ignore\"",
            "",
        ))
        .await;

    assert_eq!(summary.orphans, 0);
    let after = open_ledger(work.path()).get("mem://b").unwrap().unwrap();
    assert_eq!(after.status, CrawlStatus::New);
    assert_eq!(after.document_checksum, before.document_checksum);
    assert!(!after.processed_in_current_run);
    assert!(harness.committer.removals().is_empty());
}

#[tokio::test]
async fn test_orphans_process_reenter_pipeline() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.put("mem://b", "bravo");
    harness.fetcher.put("mem://c", "charlie");

    harness
        .run(config(
            work.path(),
            &["mem://a", "mem://b", "mem://c"],
            "",
            "",
        ))
        .await;

    harness.fetcher.put("mem://b", "bravo, revised");
    harness.fetcher.remove("mem://c");

    let summary = harness
        .run(config(work.path(), &["mem://a"], "", ""))
        .await;

    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.orphans, 2);
    assert_eq!(status_of(work.path(), "mem://b"), Some(CrawlStatus::Modified));

    // An orphan that turns out deleted leaves the ledger
    assert_eq!(status_of(work.path(), "mem://c"), None);

    let mut resubmitted = harness.listener.references(EventKind::OrphanResubmitted);
    resubmitted.sort();
    assert_eq!(resubmitted, vec!["mem://b".to_string(), "mem://c".to_string()]);
}

#[tokio::test]
async fn test_worker_count_does_not_change_outcome() {
    let mut children = Vec::new();
    let harness = Harness::new();
    for i in 0..50 {
        let child = format!("mem://doc/{:02}", i);
        if i % 5 == 0 {
            let leaf = format!("{}/leaf", child);
            harness.fetcher.put(&leaf, &format!("leaf {}", i));
            harness
                .fetcher
                .put_with_children(&child, &format!("doc {}", i), &[leaf]);
        } else {
            harness.fetcher.put(&child, &format!("doc {}", i));
        }
        children.push(child);
    }
    harness
        .fetcher
        .put_with_children("mem://root", "root", &children);

    let mut snapshots = Vec::new();
    for workers in [1, 4, 16] {
        let work = TempDir::new().unwrap();
        let summary = harness
            .run(config(
                work.path(),
                &["mem://root"],
                &format!("num-threads = {}\nqueue-capacity = 8", workers),
                "",
            ))
            .await;
        assert_eq!(summary.state, SessionState::Finished);
        assert_eq!(summary.processed, 61);

        let snapshot: Vec<_> = open_ledger(work.path())
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|r| {
                (
                    r.identity,
                    r.status,
                    r.document_checksum,
                    r.depth,
                    r.parent_identity,
                )
            })
            .collect();
        assert_eq!(snapshot.len(), 61);
        snapshots.push(snapshot);
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[0], snapshots[2]);
}

#[tokio::test]
async fn test_stop_on_escalated_error() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.break_reference("mem://b", "connection reset");
    harness.fetcher.put("mem://c", "charlie");

    let summary = harness
        .run(config(
            work.path(),
            &["mem://a", "mem://b", "mem://c"],
            "num-threads = 1\nstop-on-exceptions = [\"fetch\"]",
            "",
        ))
        .await;

    assert_eq!(summary.state, SessionState::Stopped);
    assert!(matches!(
        &summary.stop_reason,
        Some(StopReason::Escalated {
            reference,
            kind: ErrorKind::Fetch,
            ..
        }) if reference == "mem://b"
    ));

    // Nothing was dequeued after the failing reference
    assert_eq!(
        harness.fetcher.fetched(),
        vec!["mem://a".to_string(), "mem://b".to_string()]
    );

    let ledger = open_ledger(work.path());
    let b = ledger.get("mem://b").unwrap().unwrap();
    assert_eq!(b.status, CrawlStatus::Error);
    assert!(b.last_error.unwrap().starts_with("fetch: "));
    assert!(ledger.get("mem://c").unwrap().is_none());
    assert_eq!(ledger.frontier_len().unwrap(), 1);

    let kinds = harness.listener.kinds();
    assert!(kinds.contains(&EventKind::CrawlerStopping));
    assert_eq!(kinds.last(), Some(&EventKind::CrawlerStopped));

    assert!(matches!(
        summary.into_result(),
        Err(CollectorError::Escalated {
            kind: ErrorKind::Fetch,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unescalated_error_does_not_stop() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");
    harness.fetcher.break_reference("mem://b", "connection reset");
    harness.fetcher.put("mem://c", "charlie");

    let summary = harness
        .run(config(
            work.path(),
            &["mem://a", "mem://b", "mem://c"],
            "num-threads = 1",
            "",
        ))
        .await;

    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.count(CrawlStatus::Error), 1);
    assert_eq!(summary.count(CrawlStatus::New), 2);
    assert_eq!(
        harness.listener.references(EventKind::RejectedError),
        vec!["mem://b".to_string()]
    );
}

#[tokio::test]
async fn test_max_documents_then_resume() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start = ["mem://a", "mem://b", "mem://c", "mem://d"];
    for reference in start {
        harness.fetcher.put(reference, reference);
    }

    let summary = harness
        .run(config(
            work.path(),
            &start,
            "num-threads = 1\nmax-documents = 2",
            "",
        ))
        .await;
    assert_eq!(summary.state, SessionState::Stopped);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxDocuments));
    assert_eq!(summary.processed, 2);
    assert_eq!(open_ledger(work.path()).frontier_len().unwrap(), 2);

    let summary = harness
        .run(config(work.path(), &start, "num-threads = 1", ""))
        .await;
    assert!(summary.resumed);
    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.orphans, 0);
    assert_eq!(
        harness.fetcher.fetched(),
        start.iter().map(|r| r.to_string()).collect::<Vec<_>>()
    );
    assert!(statuses(work.path())
        .iter()
        .all(|(_, status)| *status == CrawlStatus::New));
    assert!(harness.listener.kinds().contains(&EventKind::CrawlerResumed));
}

#[tokio::test]
async fn test_fresh_ignores_interrupted_session() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start = ["mem://a", "mem://b", "mem://c"];
    for reference in start {
        harness.fetcher.put(reference, reference);
    }

    harness
        .run(config(
            work.path(),
            &start,
            "num-threads = 1\nmax-documents = 1",
            "",
        ))
        .await;

    let summary = harness
        .coordinator(config(work.path(), &start, "num-threads = 1", ""))
        .fresh(true)
        .run()
        .await
        .unwrap();

    assert!(!summary.resumed);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.count(CrawlStatus::Unchanged), 1);
    assert_eq!(summary.count(CrawlStatus::New), 2);
}

#[tokio::test]
async fn test_filter_rejection_and_spoiled_references() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start = ["mem://a.txt", "mem://b.pdf", "mem://c.txt"];
    for reference in start {
        harness.fetcher.put(reference, reference);
    }
    harness.run(config(work.path(), &start, "", "")).await;

    harness.fetcher.break_reference("mem://c.txt", "timeout");
    let filters = r#"
[[filters.reference]]
kind = "extension"
extensions = ["pdf"]
on-match = "exclude"
"#;
    let summary = harness
        .run(config(work.path(), &start, "", filters))
        .await;

    assert_eq!(summary.count(CrawlStatus::Rejected), 1);
    assert_eq!(summary.count(CrawlStatus::Error), 1);

    // Rejected after being valid: deleted by default
    assert_eq!(summary.spoiled_deleted, 1);
    assert_eq!(status_of(work.path(), "mem://b.pdf"), None);
    assert_eq!(harness.committer.removals(), vec!["mem://b.pdf".to_string()]);

    // Failed after being valid: kept, with its previous checksum
    assert_eq!(summary.spoiled_ignored, 1);
    let c = open_ledger(work.path()).get("mem://c.txt").unwrap().unwrap();
    assert_eq!(c.status, CrawlStatus::Error);
    assert!(c.document_checksum.is_some());
}

#[tokio::test]
async fn test_children_respect_max_depth() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness
        .fetcher
        .put_with_children("mem://root", "root", &["mem://root/a".to_string()]);
    harness
        .fetcher
        .put_with_children("mem://root/a", "a", &["mem://root/a/b".to_string()]);
    harness.fetcher.put("mem://root/a/b", "b");

    harness
        .run(config(work.path(), &["mem://root"], "max-depth = 1", ""))
        .await;

    let ledger = open_ledger(work.path());
    let a = ledger.get("mem://root/a").unwrap().unwrap();
    assert_eq!(a.depth, 1);
    assert_eq!(a.parent_identity.as_deref(), Some("mem://root"));
    assert!(ledger.get("mem://root/a/b").unwrap().is_none());
}

#[tokio::test]
async fn test_lifecycle_events_bracket_the_session() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.fetcher.put("mem://a", "alpha");

    harness
        .run(config(work.path(), &["mem://a"], "", ""))
        .await;

    let kinds = harness.listener.kinds();
    assert_eq!(
        kinds,
        vec![
            EventKind::CrawlerStarted,
            EventKind::DocumentCommitted,
            EventKind::CrawlerFinished,
        ]
    );
}

#[tokio::test]
async fn test_stop_handle_stops_running_session() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start: Vec<String> = (0..20).map(|i| format!("mem://{}", i)).collect();
    for reference in &start {
        harness.fetcher.put(reference, reference);
    }
    let start: Vec<&str> = start.iter().map(String::as_str).collect();

    let coordinator = harness.coordinator(config(work.path(), &start, "num-threads = 1", ""));
    let handle = coordinator.stop_handle();
    let listener = Arc::new(StopAfterFirstCommit(handle.clone()));
    let summary = coordinator
        .with_listener(listener)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.state, SessionState::Stopped);
    assert_eq!(summary.stop_reason, Some(StopReason::Requested));
    assert_eq!(summary.processed, 1);
    assert!(!handle.stop());
}

/// Requests a stop as soon as the first document is committed
struct StopAfterFirstCommit(crawl_collector::StopHandle);

impl crawl_collector::events::CrawlerEventListener for StopAfterFirstCommit {
    fn on_event(
        &self,
        event: &crawl_collector::events::CrawlerEvent,
    ) -> Result<(), crawl_collector::events::ListenerError> {
        if event.kind == EventKind::DocumentCommitted {
            self.0.stop();
        }
        Ok(())
    }
}

/// Requests a stop when an event about `reference` is delivered
struct StopOnReference {
    handle: crawl_collector::StopHandle,
    reference: &'static str,
}

impl crawl_collector::events::CrawlerEventListener for StopOnReference {
    fn on_event(
        &self,
        event: &crawl_collector::events::CrawlerEvent,
    ) -> Result<(), crawl_collector::events::ListenerError> {
        if event.reference.as_deref() == Some(self.reference) {
            self.handle.stop();
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_children_found_while_stopping_survive_resume() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let children = vec!["mem://root/x".to_string(), "mem://root/y".to_string()];
    harness
        .fetcher
        .put_with_children("mem://root", "root", &children);
    for child in &children {
        harness.fetcher.put(child, child);
    }
    harness.fetcher.put("mem://w", "w");
    let start = ["mem://root", "mem://w"];
    let crawler = "num-threads = 1\norphans-strategy = \"delete\"";

    let summary = harness.run(config(work.path(), &start, crawler, "")).await;
    assert_eq!(summary.count(CrawlStatus::New), 4);

    // The stop lands while root is in flight, before its children are queued
    let coordinator = harness.coordinator(config(work.path(), &start, crawler, ""));
    let listener = Arc::new(StopOnReference {
        handle: coordinator.stop_handle(),
        reference: "mem://root",
    });
    let summary = coordinator.with_listener(listener).run().await.unwrap();
    assert_eq!(summary.state, SessionState::Stopped);
    assert_eq!(summary.processed, 1);
    assert_eq!(open_ledger(work.path()).frontier_len().unwrap(), 3);

    harness.committer.clear();
    let summary = harness.run(config(work.path(), &start, crawler, "")).await;
    assert!(summary.resumed);
    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.orphans, 0);
    assert_eq!(summary.orphans_removed, 0);
    assert!(harness.committer.removals().is_empty());
    assert_eq!(
        statuses(work.path()),
        vec![
            ("mem://root".to_string(), CrawlStatus::Unchanged),
            ("mem://root/x".to_string(), CrawlStatus::Unchanged),
            ("mem://root/y".to_string(), CrawlStatus::Unchanged),
            ("mem://w".to_string(), CrawlStatus::Unchanged),
        ]
    );
}

#[tokio::test]
async fn test_collaborator_panic_is_contained() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start = ["mem://slow", "mem://boom", "mem://c"];
    for reference in start {
        harness.fetcher.put(reference, reference);
    }
    harness
        .fetcher
        .delay("mem://slow", Duration::from_millis(100));
    harness
        .fetcher
        .on_next_fetch("mem://boom", || panic!("fetcher bug"));

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(config(work.path(), &start, "num-threads = 2", "")),
    )
    .await
    .expect("Session did not finish");

    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(summary.processed, 3);
    assert_eq!(status_of(work.path(), "mem://boom"), Some(CrawlStatus::Error));
    assert_eq!(status_of(work.path(), "mem://slow"), Some(CrawlStatus::New));
    assert_eq!(status_of(work.path(), "mem://c"), Some(CrawlStatus::New));

    let record = open_ledger(work.path()).get("mem://boom").unwrap().unwrap();
    assert_eq!(record.last_error.as_deref(), Some("panic: fetcher bug"));
    assert_eq!(open_ledger(work.path()).frontier_len().unwrap(), 0);
}

#[tokio::test]
async fn test_ledger_failure_fails_session_and_keeps_frontier() {
    let work = TempDir::new().unwrap();
    let harness = Harness::new();
    let start = ["mem://a", "mem://b", "mem://c"];
    for reference in start {
        harness.fetcher.put(reference, reference);
    }
    let path = ledger_path(work.path());
    harness.fetcher.on_next_fetch("mem://b", move || {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE crawl_records").unwrap();
    });

    let err = harness
        .coordinator(config(work.path(), &start, "num-threads = 1", ""))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::Storage(_)));
    assert!(harness.listener.kinds().contains(&EventKind::CrawlerStopping));
    assert_eq!(harness.listener.kinds().last(), Some(&EventKind::CrawlerStopped));

    {
        let ledger = open_ledger(work.path());
        let session = ledger.latest_session().unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(ledger.frontier_len().unwrap(), 2);
    }

    let summary = harness
        .run(config(work.path(), &start, "num-threads = 1", ""))
        .await;
    assert!(summary.resumed);
    assert_eq!(summary.state, SessionState::Finished);
    assert_eq!(
        statuses(work.path()),
        start
            .iter()
            .map(|r| (r.to_string(), CrawlStatus::New))
            .collect::<Vec<_>>()
    );
}
