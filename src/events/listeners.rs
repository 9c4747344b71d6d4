//! Built-in event listeners

use super::{CrawlerEvent, CrawlerEventListener, EventKind, ListenerError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Logs every event through `tracing`
#[derive(Debug, Default)]
pub struct LoggingListener;

impl CrawlerEventListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &CrawlerEvent) -> Result<(), ListenerError> {
        let reference = event.reference.as_deref().unwrap_or("-");
        let message = event.message.as_deref().unwrap_or("");

        match event.kind {
            kind if kind.is_lifecycle() => {
                tracing::info!("[{}] {} {}", event.crawler_id, kind, message);
            }
            EventKind::RejectedError => {
                tracing::warn!("[{}] {} {} {}", event.crawler_id, event.kind, reference, message);
            }
            kind => {
                tracing::debug!("[{}] {} {} {}", event.crawler_id, kind, reference, message);
            }
        }
        Ok(())
    }
}

/// Counts reference events for an end-of-run summary
#[derive(Debug, Default)]
pub struct StatsListener {
    committed: AtomicU64,
    unchanged: AtomicU64,
    deleted: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    removed: AtomicU64,
    orphans_resubmitted: AtomicU64,
}

/// Point-in-time copy of the counters of a `StatsListener`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub committed: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub rejected: u64,
    pub errors: u64,
    pub removed: u64,
    pub orphans_resubmitted: u64,
}

impl StatsSnapshot {
    /// References that reached an outcome this run
    pub fn processed(&self) -> u64 {
        self.committed + self.unchanged + self.deleted + self.rejected + self.errors
    }
}

impl StatsListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            orphans_resubmitted: self.orphans_resubmitted.load(Ordering::Relaxed),
        }
    }

    /// Prints the counters to stdout in a formatted manner
    pub fn print_summary(&self) {
        let stats = self.snapshot();
        let processed = stats.processed();

        println!("=== Session Statistics ===\n");
        println!("  Processed: {}", processed);
        for (label, count) in [
            ("Committed", stats.committed),
            ("Unchanged", stats.unchanged),
            ("Deleted", stats.deleted),
            ("Rejected", stats.rejected),
            ("Errors", stats.errors),
        ] {
            let percentage = if processed > 0 {
                (count as f64 / processed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", label, count, percentage);
        }
        println!();
        println!("  References removed: {}", stats.removed);
        println!("  Orphans re-submitted: {}", stats.orphans_resubmitted);
    }
}

impl CrawlerEventListener for StatsListener {
    fn name(&self) -> &str {
        "stats"
    }

    fn on_event(&self, event: &CrawlerEvent) -> Result<(), ListenerError> {
        let counter = match event.kind {
            EventKind::DocumentCommitted => &self.committed,
            EventKind::DocumentUnchanged => &self.unchanged,
            EventKind::DocumentDeleted => &self.deleted,
            EventKind::RejectedByFilter => &self.rejected,
            EventKind::RejectedError => &self.errors,
            EventKind::ReferenceRemoved => &self.removed,
            EventKind::OrphanResubmitted => &self.orphans_resubmitted,
            _ => return Ok(()),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
