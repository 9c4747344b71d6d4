//! Event notification bus
//!
//! Events are delivered synchronously, in registration order, to every
//! listener. A listener that fails or panics is logged and skipped; it never
//! prevents delivery to the next listener nor aborts the session.

mod listeners;

pub use listeners::{LoggingListener, StatsListener, StatsSnapshot};

use crate::state::CrawlStatus;
use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CrawlerStarted,
    CrawlerResumed,
    CrawlerFinished,
    CrawlerStopping,
    CrawlerStopped,
    DocumentCommitted,
    DocumentUnchanged,
    DocumentDeleted,
    RejectedByFilter,
    RejectedError,
    ReferenceRemoved,
    OrphanResubmitted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrawlerStarted => "crawler-started",
            Self::CrawlerResumed => "crawler-resumed",
            Self::CrawlerFinished => "crawler-finished",
            Self::CrawlerStopping => "crawler-stopping",
            Self::CrawlerStopped => "crawler-stopped",
            Self::DocumentCommitted => "document-committed",
            Self::DocumentUnchanged => "document-unchanged",
            Self::DocumentDeleted => "document-deleted",
            Self::RejectedByFilter => "rejected-by-filter",
            Self::RejectedError => "rejected-error",
            Self::ReferenceRemoved => "reference-removed",
            Self::OrphanResubmitted => "orphan-resubmitted",
        }
    }

    /// Returns true for events about the session rather than a reference
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::CrawlerStarted
                | Self::CrawlerResumed
                | Self::CrawlerFinished
                | Self::CrawlerStopping
                | Self::CrawlerStopped
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occurrence delivered to listeners
#[derive(Debug, Clone)]
pub struct CrawlerEvent {
    pub kind: EventKind,
    pub crawler_id: String,
    pub reference: Option<String>,
    pub status: Option<CrawlStatus>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CrawlerEvent {
    /// Creates a session-level event
    pub fn lifecycle(kind: EventKind, crawler_id: impl Into<String>) -> Self {
        Self {
            kind,
            crawler_id: crawler_id.into(),
            reference: None,
            status: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates an event about one reference
    pub fn reference(
        kind: EventKind,
        crawler_id: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::lifecycle(kind, crawler_id)
        }
    }

    pub fn with_status(mut self, status: CrawlStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Error returned by a listener
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Observer of crawler events
pub trait CrawlerEventListener: Send + Sync {
    fn name(&self) -> &str {
        "listener"
    }

    fn on_event(&self, event: &CrawlerEvent) -> Result<(), ListenerError>;
}

/// Ordered list of listeners, fixed once the session starts
#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Vec<Arc<dyn CrawlerEventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn CrawlerEventListener>) {
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn CrawlerEventListener>) -> Self {
        self.register(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener in registration order
    pub fn notify(&self, event: &CrawlerEvent) {
        for listener in &self.listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Listener '{}' failed on {}: {}",
                        listener.name(),
                        event.kind,
                        e
                    );
                }
                Err(_) => {
                    tracing::error!("Listener '{}' panicked on {}", listener.name(), event.kind);
                }
            }
        }
    }
}
