//! Per-reference processing
//!
//! For one reference, strictly in order: reference filters, metadata fetch,
//! metadata checksum, metadata filters, optional fast path, document fetch,
//! document checksum, status computation, document filters, import, commit,
//! ledger write, event.

use crate::checksum::{ChecksumError, DocumentChecksummer, MetadataChecksummer};
use crate::crawler::committer::{CommitError, Committer};
use crate::crawler::fetcher::{FetchError, Fetcher};
use crate::crawler::importer::{ImportError, Importer};
use crate::document::{Metadata, DOCUMENT_CHECKSUM_FIELD, METADATA_CHECKSUM_FIELD};
use crate::events::{CrawlerEvent, EventBus, EventKind};
use crate::filter::{FilterError, FilterOutcome, Filters};
use crate::policy::{ErrorKind, StopPolicy};
use crate::state::CrawlStatus;
use crate::storage::{CrawlRecord, FrontierEntry, Ledger, StorageResult};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Error contained at the per-reference boundary
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("checksum: {0}")]
    Checksum(#[from] ChecksumError),

    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("filter: {0}")]
    Filter(#[from] FilterError),

    #[error("import: {0}")]
    Import(#[from] ImportError),

    #[error("commit: {0}")]
    Commit(#[from] CommitError),

    /// A collaborator panicked while the reference was processed
    #[error("panic: {0}")]
    Panicked(String),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Checksum(_) => ErrorKind::Checksum,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Filter(_) => ErrorKind::Filter,
            Self::Import(_) => ErrorKind::Import,
            Self::Commit(_) => ErrorKind::Commit,
            Self::Panicked(_) => ErrorKind::Any,
        }
    }
}

/// Returns true if the metadata checksum proves the reference unchanged
///
/// Only a previous record in a valid state can vouch for the committed
/// document.
pub fn metadata_unchanged(prior: Option<&CrawlRecord>, metadata_checksum: Option<&str>) -> bool {
    match (prior, metadata_checksum) {
        (Some(prior), Some(checksum)) => {
            prior.status.is_valid() && prior.metadata_checksum.as_deref() == Some(checksum)
        }
        _ => false,
    }
}

/// Status of a successfully fetched reference
pub fn compute_status(prior: Option<&CrawlRecord>, document_checksum: Option<&str>) -> CrawlStatus {
    let Some(prior) = prior else {
        return CrawlStatus::New;
    };
    match document_checksum {
        Some(checksum) if prior.document_checksum.as_deref() == Some(checksum) => {
            CrawlStatus::Unchanged
        }
        _ => CrawlStatus::Modified,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

/// How the evaluation of a reference ended
#[derive(Debug)]
enum Verdict {
    Processed {
        status: CrawlStatus,
        metadata_checksum: Option<String>,
        document_checksum: Option<String>,
        children: Vec<String>,
    },
    Deleted,
    Rejected {
        reason: String,
    },
}

/// A reference that was valid before and failed or was rejected now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoiledReference {
    pub identity: String,
    pub prior: CrawlStatus,
    pub current: CrawlStatus,
}

/// What the coordinator needs to know after processing a reference
#[derive(Debug)]
pub struct ReferenceOutcome {
    pub status: CrawlStatus,
    pub children: Vec<FrontierEntry>,
    pub spoiled: Option<SpoiledReference>,

    /// Set when the error kind is in the stop-on set
    pub escalation: Option<(ErrorKind, String)>,

    /// The record was deleted (failed orphan re-submission)
    pub removed: bool,
}

/// Session-scoped collaborators and settings shared by all workers
pub struct Pipeline {
    pub crawler_id: String,
    pub session_id: i64,
    pub fetcher: Arc<dyn Fetcher>,
    pub importer: Arc<dyn Importer>,
    pub committer: Arc<dyn Committer>,
    pub filters: Arc<Filters>,
    pub metadata_checksummer: Option<Arc<dyn MetadataChecksummer>>,
    pub document_checksummer: Option<Arc<dyn DocumentChecksummer>>,
    pub metadata_fast_path: bool,
    pub max_depth: Option<u32>,
    pub stop_policy: StopPolicy,
    pub events: EventBus,
}

impl Pipeline {
    /// Processes one reference and writes its record
    ///
    /// Per-reference failures are contained in the outcome; only ledger
    /// failures are returned as errors.
    pub async fn process(
        &self,
        ledger: &mut dyn Ledger,
        entry: &FrontierEntry,
    ) -> StorageResult<ReferenceOutcome> {
        let prior = ledger.get(&entry.identity)?;
        let verdict = AssertUnwindSafe(self.evaluate(&entry.identity, prior.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProcessingError::Panicked(panic_message(panic))));
        self.record(ledger, entry, prior, verdict).await
    }

    fn screen(
        &self,
        result: Result<FilterOutcome, FilterError>,
    ) -> Result<Option<Verdict>, ProcessingError> {
        match result {
            Ok(FilterOutcome::Accept) => Ok(None),
            Ok(FilterOutcome::Reject { filter }) => Ok(Some(Verdict::Rejected {
                reason: format!("rejected by filter {}", filter),
            })),
            Err(e) if self.stop_policy.is_fatal(ErrorKind::Filter) => Err(e.into()),
            Err(e) => Ok(Some(Verdict::Rejected {
                reason: e.to_string(),
            })),
        }
    }

    async fn deleted(&self, reference: &str) -> Result<Verdict, ProcessingError> {
        self.committer.remove(reference).await?;
        Ok(Verdict::Deleted)
    }

    async fn evaluate(
        &self,
        reference: &str,
        prior: Option<&CrawlRecord>,
    ) -> Result<Verdict, ProcessingError> {
        if let Some(verdict) = self.screen(self.filters.check_reference(reference))? {
            return Ok(verdict);
        }

        let metadata: Metadata = match self.fetcher.fetch_metadata(reference).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return self.deleted(reference).await,
            Err(e) => return Err(e.into()),
        };

        let metadata_checksum = match &self.metadata_checksummer {
            Some(checksummer) => checksummer.metadata_checksum(&metadata)?,
            None => None,
        };

        if let Some(verdict) = self.screen(self.filters.check_metadata(reference, &metadata))? {
            return Ok(verdict);
        }

        if self.metadata_fast_path && metadata_unchanged(prior, metadata_checksum.as_deref()) {
            tracing::debug!("Metadata unchanged, skipping fetch of {}", reference);
            return Ok(Verdict::Processed {
                status: CrawlStatus::Unchanged,
                metadata_checksum,
                document_checksum: prior.and_then(|p| p.document_checksum.clone()),
                children: Vec::new(),
            });
        }

        let mut document = match self.fetcher.fetch_document(reference, &metadata).await {
            Ok(document) => document,
            Err(e) if e.is_not_found() => return self.deleted(reference).await,
            Err(e) => return Err(e.into()),
        };

        let document_checksum = match &self.document_checksummer {
            Some(checksummer) => checksummer.document_checksum(&document)?,
            None => None,
        };

        let status = compute_status(prior, document_checksum.as_deref());
        let children = std::mem::take(&mut document.children);

        if status == CrawlStatus::Unchanged {
            return Ok(Verdict::Processed {
                status,
                metadata_checksum,
                document_checksum,
                children,
            });
        }

        if let Some(verdict) = self.screen(self.filters.check_document(&document))? {
            return Ok(verdict);
        }

        if let (Some(checksummer), Some(checksum)) =
            (&self.metadata_checksummer, &metadata_checksum)
        {
            if checksummer.keep() {
                document.metadata.insert(METADATA_CHECKSUM_FIELD, checksum.clone());
            }
        }
        if let (Some(checksummer), Some(checksum)) =
            (&self.document_checksummer, &document_checksum)
        {
            if checksummer.keep() {
                document.metadata.insert(DOCUMENT_CHECKSUM_FIELD, checksum.clone());
            }
        }

        let imported = self.importer.import(document).await?;
        self.committer.commit(&imported, status).await?;

        Ok(Verdict::Processed {
            status,
            metadata_checksum,
            document_checksum,
            children,
        })
    }

    async fn record(
        &self,
        ledger: &mut dyn Ledger,
        entry: &FrontierEntry,
        prior: Option<CrawlRecord>,
        verdict: Result<Verdict, ProcessingError>,
    ) -> StorageResult<ReferenceOutcome> {
        let reference = entry.identity.as_str();
        let mut record = CrawlRecord::new(reference, CrawlStatus::Error, self.session_id);
        record.depth = entry.depth;
        record.parent_identity = entry.parent_identity.clone();
        record.processed_in_current_run = true;

        let retain_checksums = |record: &mut CrawlRecord| {
            if let Some(prior) = &prior {
                record.metadata_checksum = prior.metadata_checksum.clone();
                record.document_checksum = prior.document_checksum.clone();
            }
        };

        let mut children = Vec::new();
        let mut escalation = None;

        let event = match verdict {
            Ok(Verdict::Processed {
                status,
                metadata_checksum,
                document_checksum,
                children: found,
            }) => {
                record.status = status;
                record.metadata_checksum = metadata_checksum;
                record.document_checksum = document_checksum;
                children = found;
                let kind = if status.is_new_or_modified() {
                    EventKind::DocumentCommitted
                } else {
                    EventKind::DocumentUnchanged
                };
                CrawlerEvent::reference(kind, &self.crawler_id, reference)
            }
            Ok(Verdict::Deleted) => {
                record.status = CrawlStatus::Deleted;
                CrawlerEvent::reference(EventKind::DocumentDeleted, &self.crawler_id, reference)
            }
            Ok(Verdict::Rejected { reason }) => {
                record.status = CrawlStatus::Rejected;
                retain_checksums(&mut record);
                tracing::debug!("{} {}", reference, reason);
                record.last_error = Some(reason.clone());
                CrawlerEvent::reference(EventKind::RejectedByFilter, &self.crawler_id, reference)
                    .with_message(reason)
            }
            Err(e) => {
                record.status = CrawlStatus::Error;
                retain_checksums(&mut record);
                let message = e.to_string();
                tracing::warn!("Failed to process {}: {}", reference, message);
                if self.stop_policy.is_fatal(e.kind()) {
                    escalation = Some((e.kind(), message.clone()));
                }
                record.last_error = Some(message.clone());
                CrawlerEvent::reference(EventKind::RejectedError, &self.crawler_id, reference)
                    .with_message(message)
            }
        };

        let status = record.status;
        ledger.upsert(&record)?;
        self.events.notify(&event.with_status(status));
        tracing::debug!("{} -> {}", reference, status);

        let mut removed = false;
        let terminal = matches!(
            status,
            CrawlStatus::Error | CrawlStatus::Rejected | CrawlStatus::Deleted
        );
        if entry.orphan && terminal {
            ledger.delete(reference)?;
            if status != CrawlStatus::Deleted {
                if let Err(e) = self.committer.remove(reference).await {
                    tracing::warn!("Committer failed to remove orphan {}: {}", reference, e);
                }
            }
            self.events.notify(
                &CrawlerEvent::reference(EventKind::ReferenceRemoved, &self.crawler_id, reference)
                    .with_status(status)
                    .with_message("orphan no longer processable"),
            );
            removed = true;
        }

        let spoiled = match &prior {
            Some(prior) if !removed && status.is_spoiled() => Some(SpoiledReference {
                identity: reference.to_string(),
                prior: prior.status,
                current: status,
            }),
            _ => None,
        };

        let children = children
            .into_iter()
            .map(|child| FrontierEntry::child(child, entry))
            .filter(|child| self.max_depth.map_or(true, |max| child.depth <= max))
            .collect();

        Ok(ReferenceOutcome {
            status,
            children,
            spoiled,
            escalation,
            removed,
        })
    }
}
