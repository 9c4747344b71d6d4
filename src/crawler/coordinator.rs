//! Crawler coordinator - session orchestration
//!
//! This module drives one crawl session from start to finish:
//! - Opening the ledger and deciding between a fresh run and a resume
//! - Seeding the frontier and running the worker pool
//! - Stopping on request, on escalated errors, on ledger failures, or when
//!   the maximum number of documents was handed out
//! - Resolving orphans once the frontier drained
//! - Applying spoiled reference decisions
//! - Recording the session outcome and emitting lifecycle events

use crate::checksum::{
    document_checksummer_from_config, metadata_checksummer_from_config, DocumentChecksummer,
    MetadataChecksummer,
};
use crate::config::{validate, Config};
use crate::crawler::committer::{committer_from_config, Committer};
use crate::crawler::fetcher::{fetcher_from_config, Fetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::importer::{Importer, PassthroughImporter};
use crate::crawler::pipeline::{Pipeline, ReferenceOutcome, SpoiledReference};
use crate::events::{CrawlerEvent, CrawlerEventListener, EventBus, EventKind};
use crate::filter::Filters;
use crate::policy::{
    plan_orphans, ErrorKind, GenericSpoiledStrategizer, OrphanAction, SpoiledDecision,
    SpoiledReferenceStrategizer, StopPolicy,
};
use crate::state::{CrawlStatus, SessionState};
use crate::storage::{
    ledger_path, FrontierEntry, Ledger, RetryPolicy, SessionStatus, SqliteLedger,
};
use crate::{CollectorError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

/// Why a session left the RUNNING state early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A caller used the `StopHandle`
    Requested,

    /// The maximum number of documents was handed out
    MaxDocuments,

    /// An error kind in the stop-on set was raised
    Escalated {
        reference: String,
        kind: ErrorKind,
        message: String,
    },

    /// The ledger failed or a worker died
    Failure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("stop requested"),
            Self::MaxDocuments => f.write_str("maximum documents reached"),
            Self::Escalated {
                reference,
                kind,
                message,
            } => write!(f, "{} error on {}: {}", kind, reference, message),
            Self::Failure(message) => write!(f, "failure: {}", message),
        }
    }
}

struct ControlState {
    state: SessionState,
    reason: Option<StopReason>,
    frontier: Option<Arc<Frontier>>,
}

/// Session state shared between the coordinator, its workers and stop handles
struct SessionControl {
    crawler_id: String,
    inner: Mutex<ControlState>,

    /// Set once when the session starts
    events: OnceLock<EventBus>,
}

impl SessionControl {
    fn notify(&self, event: &CrawlerEvent) {
        if let Some(events) = self.events.get() {
            events.notify(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn transition(&self, next: SessionState) -> Result<()> {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(next) {
            return Err(CollectorError::InvalidTransition {
                from: inner.state,
                to: next,
            });
        }
        tracing::debug!("Session {} -> {}", inner.state, next);
        inner.state = next;
        Ok(())
    }

    fn attach(&self, frontier: Arc<Frontier>) {
        let mut inner = self.lock();
        if inner.state == SessionState::Stopping {
            frontier.stop();
        }
        inner.frontier = Some(frontier);
    }

    /// Moves a running session to STOPPING
    ///
    /// Only the first request is honored. Returns true if this call
    /// initiated the stop.
    fn request_stop(&self, reason: StopReason) -> bool {
        let frontier = {
            let mut inner = self.lock();
            if inner.state != SessionState::Running {
                return false;
            }
            inner.state = SessionState::Stopping;
            inner.reason = Some(reason.clone());
            inner.frontier.clone()
        };

        tracing::info!("Stopping crawler {}: {}", self.crawler_id, reason);
        self.notify(
            &CrawlerEvent::lifecycle(EventKind::CrawlerStopping, &self.crawler_id)
                .with_message(reason.to_string()),
        );
        if let Some(frontier) = frontier {
            frontier.stop();
        }
        true
    }

    /// Moves the session to its terminal state
    fn finish(&self) -> (SessionState, Option<StopReason>) {
        let mut inner = self.lock();
        inner.state = match inner.state {
            SessionState::Stopping | SessionState::Stopped => SessionState::Stopped,
            _ => SessionState::Finished,
        };
        inner.frontier = None;
        (inner.state, inner.reason.clone())
    }
}

/// Requests a graceful stop of a running session
///
/// In-flight references complete; nothing else is dequeued.
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<SessionControl>,
}

impl StopHandle {
    /// Returns true if this call initiated the stop
    pub fn stop(&self) -> bool {
        self.control.request_stop(StopReason::Requested)
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }
}

/// Outcome of a crawl session
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub crawler_id: String,
    pub session_id: i64,
    pub state: SessionState,
    pub resumed: bool,
    pub stop_reason: Option<StopReason>,

    /// References that reached an outcome this session
    pub processed: u64,
    pub by_status: HashMap<CrawlStatus, u64>,

    /// Orphans re-submitted or removed
    pub orphans: u64,

    /// Orphans deleted from the ledger, by the DELETE strategy or after
    /// failing again once re-submitted
    pub orphans_removed: u64,
    pub spoiled_deleted: u64,
    pub spoiled_ignored: u64,
    pub elapsed: Duration,
}

impl CrawlSummary {
    /// References that ended this session with `status`
    pub fn count(&self, status: CrawlStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Turns an escalated stop into an error
    pub fn into_result(self) -> Result<Self> {
        if let Some(StopReason::Escalated {
            reference,
            kind,
            message,
        }) = &self.stop_reason
        {
            return Err(CollectorError::Escalated {
                reference: reference.clone(),
                kind: *kind,
                message: message.clone(),
            });
        }
        Ok(self)
    }
}

/// What a worker did before exiting
#[derive(Debug, Default)]
struct WorkerReport {
    processed: u64,
    by_status: HashMap<CrawlStatus, u64>,
    spoiled: Vec<SpoiledReference>,

    /// Re-submitted orphans deleted after failing again
    removed: u64,
}

impl WorkerReport {
    fn record(&mut self, outcome: &ReferenceOutcome) {
        self.processed += 1;
        *self.by_status.entry(outcome.status).or_insert(0) += 1;
        if outcome.removed {
            self.removed += 1;
        }
    }

    fn merge(&mut self, other: WorkerReport) {
        self.processed += other.processed;
        self.removed += other.removed;
        for (status, count) in other.by_status {
            *self.by_status.entry(status).or_insert(0) += count;
        }
        self.spoiled.extend(other.spoiled);
    }
}

/// One worker: a dedicated ledger connection pulling from the shared frontier
struct Worker {
    id: usize,
    pipeline: Arc<Pipeline>,
    frontier: Arc<Frontier>,
    control: Arc<SessionControl>,
    ledger: SqliteLedger,
}

impl Worker {
    async fn run(mut self) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();
        if let Err(e) = self.work(&mut report).await {
            tracing::error!("Worker {} failed: {}", self.id, e);
            self.control.request_stop(StopReason::Failure(e.to_string()));
            return Err(e);
        }

        if self.frontier.limit_reached() {
            self.control.request_stop(StopReason::MaxDocuments);
        }
        tracing::debug!("Worker {} done after {} references", self.id, report.processed);
        Ok(report)
    }

    async fn work(&mut self, report: &mut WorkerReport) -> Result<()> {
        // A claim dropped on any early exit releases its reference
        while let Some(claim) = self.frontier.claim().await? {
            let entry = claim.entry();
            let outcome = self.pipeline.process(&mut self.ledger, entry).await?;
            report.record(&outcome);

            if let Some((kind, message)) = &outcome.escalation {
                tracing::error!("Escalating {} error on {}: {}", kind, entry.identity, message);
                self.control.request_stop(StopReason::Escalated {
                    reference: entry.identity.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }

            for child in outcome.children {
                self.frontier.push(child)?;
            }
            if let Some(spoiled) = outcome.spoiled {
                report.spoiled.push(spoiled);
            }

            claim.complete()?;
        }
        Ok(())
    }
}

/// Main crawler coordinator structure
///
/// Collaborators default to what the configuration selects; the `with_*`
/// methods replace them before the session starts.
pub struct Coordinator {
    config: Config,
    config_hash: String,
    fresh: bool,
    fetcher: Arc<dyn Fetcher>,
    importer: Arc<dyn Importer>,
    committer: Arc<dyn Committer>,
    filters: Arc<Filters>,
    metadata_checksummer: Option<Arc<dyn MetadataChecksummer>>,
    document_checksummer: Option<Arc<dyn DocumentChecksummer>>,
    strategizer: Arc<dyn SpoiledReferenceStrategizer>,
    listeners: Vec<Arc<dyn CrawlerEventListener>>,
    control: Arc<SessionControl>,
}

impl Coordinator {
    /// Creates a coordinator for one session
    ///
    /// # Arguments
    ///
    /// * `config` - The collector configuration
    /// * `config_hash` - Hash of the configuration file, stored with the session
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(CollectorError)` - Invalid configuration or HTTP client setup failure
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self> {
        validate(&config)?;

        let fetcher = fetcher_from_config(&config.fetcher)?;
        let committer = committer_from_config(&config.committer);
        let filters = Filters::from_config(&config.filters)?;
        let metadata_checksummer: Option<Arc<dyn MetadataChecksummer>> =
            metadata_checksummer_from_config(&config.checksum.metadata).map(Arc::from);
        let document_checksummer: Option<Arc<dyn DocumentChecksummer>> =
            document_checksummer_from_config(&config.checksum.document).map(Arc::from);
        let strategizer = GenericSpoiledStrategizer::from_config(&config.spoiled);

        let control = Arc::new(SessionControl {
            crawler_id: config.crawler.id.clone(),
            inner: Mutex::new(ControlState {
                state: SessionState::Created,
                reason: None,
                frontier: None,
            }),
            events: OnceLock::new(),
        });

        Ok(Self {
            config,
            config_hash: config_hash.into(),
            fresh: false,
            fetcher,
            importer: Arc::new(PassthroughImporter),
            committer,
            filters: Arc::new(filters),
            metadata_checksummer,
            document_checksummer,
            strategizer: Arc::new(strategizer),
            listeners: Vec::new(),
            control,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_importer(mut self, importer: Arc<dyn Importer>) -> Self {
        self.importer = importer;
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = committer;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn with_strategizer(mut self, strategizer: Arc<dyn SpoiledReferenceStrategizer>) -> Self {
        self.strategizer = strategizer;
        self
    }

    /// Adds a listener; listeners are notified in the order they were added
    pub fn with_listener(mut self, listener: Arc<dyn CrawlerEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Ignores any interrupted session and starts from the start references
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Handle for stopping the session from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: self.control.clone(),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.config.ledger.retries,
            initial_backoff: Duration::from_millis(self.config.ledger.retry_backoff_ms),
        }
    }

    fn open_ledger(&self, path: &Path) -> Result<SqliteLedger> {
        Ok(SqliteLedger::open(
            path,
            &self.config.crawler.id,
            self.retry_policy(),
        )?)
    }

    fn notify(&self, kind: EventKind, message: String) {
        self.control.notify(
            &CrawlerEvent::lifecycle(kind, &self.config.crawler.id).with_message(message),
        );
    }

    /// Runs the session to completion
    ///
    /// Returns the summary for FINISHED and STOPPED sessions alike; an
    /// escalated stop is reported in `stop_reason` (see
    /// `CrawlSummary::into_result`). Ledger failures are returned as errors
    /// after the session was stopped.
    pub async fn run(mut self) -> Result<CrawlSummary> {
        let started = Instant::now();
        self.control.transition(SessionState::Running)?;

        let mut events = EventBus::new();
        for listener in std::mem::take(&mut self.listeners) {
            events.register(listener);
        }
        let events = self.control.events.get_or_init(|| events).clone();

        let work_dir = &self.config.crawler.work_dir;
        std::fs::create_dir_all(work_dir)?;
        let path = ledger_path(work_dir);
        let mut ledger = self.open_ledger(&path)?;

        let resumed = !self.fresh && Self::is_resumable(&ledger)?;
        if !resumed {
            ledger.clear_frontier()?;
            let reset = ledger.reset_processed_flags()?;
            tracing::debug!("Reset processed flag on {} records", reset);
        }
        let session_id = ledger.begin_session(&self.config_hash)?;

        let frontier = Arc::new(Frontier::new(
            Box::new(self.open_ledger(&path)?),
            self.config.crawler.queue_capacity,
            self.config.crawler.max_documents_limit(),
        ));
        self.control.attach(frontier.clone());

        if resumed {
            let pending = frontier.restore()?;
            tracing::info!(
                "Resuming crawler {} with {} pending references",
                self.config.crawler.id,
                pending
            );
            self.notify(EventKind::CrawlerResumed, format!("session {}", session_id));
        } else {
            tracing::info!(
                "Starting crawler {} (session {})",
                self.config.crawler.id,
                session_id
            );
            self.notify(EventKind::CrawlerStarted, format!("session {}", session_id));
        }

        let mut seeded = 0;
        for reference in &self.config.start_references {
            if frontier.push(FrontierEntry::seed(reference.as_str()))? {
                seeded += 1;
            }
        }
        tracing::info!("Queued {} start references", seeded);

        let pipeline = Arc::new(Pipeline {
            crawler_id: self.config.crawler.id.clone(),
            session_id,
            fetcher: self.fetcher.clone(),
            importer: self.importer.clone(),
            committer: self.committer.clone(),
            filters: self.filters.clone(),
            metadata_checksummer: self.metadata_checksummer.clone(),
            document_checksummer: self.document_checksummer.clone(),
            metadata_fast_path: self.config.crawler.metadata_fast_path,
            max_depth: self.config.crawler.max_depth_limit(),
            stop_policy: StopPolicy::new(self.config.crawler.stop_on_exceptions.iter().copied()),
            events,
        });

        let outcome = self.execute(&mut ledger, &path, &pipeline, &frontier).await;

        let (state, stop_reason) = self.control.finish();
        let (report, orphans) = match outcome {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Session {} failed: {}", session_id, e);
                if let Err(finish_err) = ledger.finish_session(session_id, SessionStatus::Failed) {
                    tracing::warn!("Could not record failed session: {}", finish_err);
                }
                self.notify(EventKind::CrawlerStopped, e.to_string());
                return Err(e);
            }
        };

        let (spoiled_deleted, spoiled_ignored) =
            self.apply_spoiled(&mut ledger, &report.spoiled).await?;

        let (status, kind) = match state {
            SessionState::Stopped => (SessionStatus::Stopped, EventKind::CrawlerStopped),
            _ => (SessionStatus::Finished, EventKind::CrawlerFinished),
        };
        ledger.finish_session(session_id, status)?;

        let summary = CrawlSummary {
            crawler_id: self.config.crawler.id.clone(),
            session_id,
            state,
            resumed,
            stop_reason,
            processed: report.processed,
            by_status: report.by_status,
            orphans,
            orphans_removed: report.removed,
            spoiled_deleted,
            spoiled_ignored,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Crawler {} {}: {} references in {:?}",
            summary.crawler_id,
            summary.state,
            summary.processed,
            summary.elapsed
        );
        self.notify(kind, format!("{} references processed", summary.processed));

        Ok(summary)
    }

    fn is_resumable(ledger: &SqliteLedger) -> Result<bool> {
        let Some(session) = ledger.latest_session()? else {
            return Ok(false);
        };
        Ok(session.status.is_resumable() && ledger.frontier_len()? > 0)
    }

    /// Runs the workers until the frontier drains or the session stops,
    /// then resolves orphans if the frontier drained
    async fn execute(
        &self,
        ledger: &mut SqliteLedger,
        path: &Path,
        pipeline: &Arc<Pipeline>,
        frontier: &Arc<Frontier>,
    ) -> Result<(WorkerReport, u64)> {
        let mut report = self.run_workers(path, pipeline, frontier).await?;

        if self.control.state() != SessionState::Running {
            tracing::info!("Session stopped before draining; orphans left for a later run");
            return Ok((report, 0));
        }

        let actions = plan_orphans(&*ledger, self.config.crawler.orphans_strategy)?;
        let orphans = actions.len() as u64;
        let mut resubmitted = 0;

        for action in actions {
            match action {
                OrphanAction::Resubmit(entry) => {
                    let identity = entry.identity.clone();
                    if frontier.push(entry)? {
                        resubmitted += 1;
                        self.control.notify(&CrawlerEvent::reference(
                            EventKind::OrphanResubmitted,
                            &self.config.crawler.id,
                            identity,
                        ));
                    }
                }
                OrphanAction::Remove(identity) => {
                    self.remove_reference(ledger, &identity, "orphan").await?;
                    report.removed += 1;
                }
            }
        }

        if resubmitted > 0 {
            tracing::info!("Re-processing {} orphans", resubmitted);
            report.merge(self.run_workers(path, pipeline, frontier).await?);
        }

        Ok((report, orphans))
    }

    async fn run_workers(
        &self,
        path: &Path,
        pipeline: &Arc<Pipeline>,
        frontier: &Arc<Frontier>,
    ) -> Result<WorkerReport> {
        let mut handles = Vec::with_capacity(self.config.crawler.num_threads);
        for id in 0..self.config.crawler.num_threads {
            let worker = Worker {
                id,
                pipeline: pipeline.clone(),
                frontier: frontier.clone(),
                control: self.control.clone(),
                ledger: self.open_ledger(path)?,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut report = WorkerReport::default();
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(worker_report)) => report.merge(worker_report),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    self.control
                        .request_stop(StopReason::Failure(format!("worker panicked: {}", e)));
                    failure.get_or_insert(CollectorError::Worker(e));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn apply_spoiled(
        &self,
        ledger: &mut SqliteLedger,
        spoiled: &[SpoiledReference],
    ) -> Result<(u64, u64)> {
        let (mut deleted, mut ignored) = (0, 0);
        for reference in spoiled {
            match self.strategizer.decide(reference.prior, reference.current) {
                SpoiledDecision::Delete => {
                    self.remove_reference(ledger, &reference.identity, "spoiled")
                        .await?;
                    deleted += 1;
                }
                decision => {
                    tracing::debug!(
                        "Keeping spoiled {} ({} -> {}, {})",
                        reference.identity,
                        reference.prior,
                        reference.current,
                        decision
                    );
                    ignored += 1;
                }
            }
        }
        Ok((deleted, ignored))
    }

    async fn remove_reference(
        &self,
        ledger: &mut SqliteLedger,
        identity: &str,
        why: &str,
    ) -> Result<()> {
        ledger.delete(identity)?;
        if let Err(e) = self.committer.remove(identity).await {
            tracing::warn!("Committer failed to remove {} {}: {}", why, identity, e);
        }
        tracing::debug!("Removed {} reference {}", why, identity);
        self.control.notify(
            &CrawlerEvent::reference(EventKind::ReferenceRemoved, &self.config.crawler.id, identity)
                .with_message(why),
        );
        Ok(())
    }
}
