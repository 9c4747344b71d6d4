//! Frontier: the queue of references pending processing in a session
//!
//! This module handles:
//! - A bounded in-memory buffer backed by the persisted frontier table
//! - At-most-once admission of an identity per session
//! - Tracking in-flight references so workers know when the queue drained
//! - Stopping: nothing more is handed out, waiting workers are released,
//!   and late references are only persisted for the next session
//! - The maximum-documents limit on dequeues

use crate::storage::{FrontierEntry, Ledger, StorageResult};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

struct FrontierState {
    /// Ledger handle owned by the frontier (persisted queue)
    ledger: Box<dyn Ledger>,

    /// Entries in memory, in sequence order
    buffer: VecDeque<(i64, FrontierEntry)>,

    /// Highest sequence number loaded into the buffer
    high_water: i64,

    /// Persisted entries not yet loaded into the buffer
    spilled: u64,

    /// Every identity admitted during this session
    seen: HashSet<String>,

    in_flight: usize,
    dequeued: u64,
    stopping: bool,
    limit_reached: bool,
}

/// Shared frontier queue
///
/// Entries are persisted before they become visible so an interrupted
/// session can resume them. An entry's row is removed only once its
/// reference has been processed.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    capacity: usize,
    max_dequeues: Option<u64>,
}

impl Frontier {
    /// Creates a frontier
    ///
    /// # Arguments
    ///
    /// * `ledger` - Handle used for the persisted queue
    /// * `capacity` - Number of entries held in memory
    /// * `max_dequeues` - Maximum references handed out (None for unlimited)
    pub fn new(ledger: Box<dyn Ledger>, capacity: usize, max_dequeues: Option<u64>) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                ledger,
                buffer: VecDeque::new(),
                high_water: 0,
                spilled: 0,
                seen: HashSet::new(),
                in_flight: 0,
                dequeued: 0,
                stopping: false,
                limit_reached: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            max_dequeues,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reloads the persisted queue of an interrupted session
    ///
    /// References already processed by that session are marked as seen so
    /// they are not admitted again. A row left behind by a reference that
    /// was written but not completed is removed instead of queued. Returns
    /// the number of pending entries.
    pub fn restore(&self) -> StorageResult<u64> {
        let mut state = self.lock();

        let processed: HashSet<String> = state
            .ledger
            .scan(false)
            .filter_map(|record| match record {
                Ok(record) if record.processed_in_current_run => Some(Ok(record.identity)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<StorageResult<_>>()?;

        let mut pending = 0u64;
        let mut stale = 0u64;
        let mut after = 0i64;
        loop {
            let page = state.ledger.load_frontier(after, self.capacity)?;
            let Some((last_seq, _)) = page.last() else {
                break;
            };
            after = *last_seq;

            for (seq, entry) in page {
                if processed.contains(&entry.identity) {
                    state.ledger.complete_frontier(&entry.identity)?;
                    stale += 1;
                    continue;
                }
                pending += 1;
                state.seen.insert(entry.identity.clone());
                if state.buffer.len() < self.capacity {
                    state.high_water = seq;
                    state.buffer.push_back((seq, entry));
                } else {
                    state.spilled += 1;
                }
            }
        }

        state.seen.extend(processed);

        if stale > 0 {
            tracing::debug!("Dropped {} frontier rows of processed references", stale);
        }
        tracing::info!(
            "Restored {} pending frontier entries ({} in memory)",
            pending,
            state.buffer.len()
        );
        Ok(pending)
    }

    /// Offers a reference to the frontier
    ///
    /// Returns false if the identity was already admitted this session.
    /// While stopping, a new reference is persisted for the next session but
    /// never handed out.
    pub fn push(&self, entry: FrontierEntry) -> StorageResult<bool> {
        let mut state = self.lock();
        if state.seen.contains(&entry.identity) {
            return Ok(false);
        }

        let Some(seq) = state.ledger.push_frontier(&entry)? else {
            state.seen.insert(entry.identity);
            return Ok(false);
        };
        state.seen.insert(entry.identity.clone());

        if state.stopping {
            tracing::debug!("Kept {} for the next session", entry.identity);
            return Ok(true);
        }

        if state.spilled == 0 && state.buffer.len() < self.capacity {
            state.high_water = seq;
            state.buffer.push_back((seq, entry));
        } else {
            state.spilled += 1;
        }
        drop(state);

        self.notify.notify_one();
        Ok(true)
    }

    /// Pages spilled entries back into memory, oldest first
    fn refill(&self, state: &mut FrontierState) -> StorageResult<()> {
        let room = self.capacity - state.buffer.len();
        let page = state.ledger.load_frontier(state.high_water, room)?;
        if page.is_empty() {
            // Rows were removed behind our back; nothing left to page in.
            state.spilled = 0;
            return Ok(());
        }
        for (seq, entry) in page {
            state.high_water = seq;
            state.spilled = state.spilled.saturating_sub(1);
            state.buffer.push_back((seq, entry));
        }
        Ok(())
    }

    /// Takes the next reference
    ///
    /// Waits while the queue is empty but references are still in flight,
    /// since those may discover more. Returns None once the queue is
    /// drained, the frontier is stopping, or the dequeue limit was reached.
    pub async fn next(&self) -> StorageResult<Option<FrontierEntry>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.stopping {
                    return Ok(None);
                }

                if state.buffer.is_empty() && state.spilled > 0 {
                    self.refill(&mut state)?;
                }

                if !state.buffer.is_empty() {
                    if self.max_dequeues.is_some_and(|max| state.dequeued >= max) {
                        state.limit_reached = true;
                        state.stopping = true;
                        drop(state);
                        self.notify.notify_waiters();
                        return Ok(None);
                    }

                    if let Some((_, entry)) = state.buffer.pop_front() {
                        state.in_flight += 1;
                        state.dequeued += 1;
                        return Ok(Some(entry));
                    }
                }

                if state.in_flight == 0 {
                    drop(state);
                    self.notify.notify_waiters();
                    return Ok(None);
                }
            }

            notified.await;
        }
    }

    /// Takes the next reference as a claim that releases it if dropped
    pub async fn claim(&self) -> StorageResult<Option<Claim<'_>>> {
        Ok(self.next().await?.map(|entry| Claim {
            frontier: self,
            entry,
            settled: false,
        }))
    }

    /// Marks a dequeued reference as processed and removes its row
    pub fn complete(&self, identity: &str) -> StorageResult<()> {
        let mut state = self.lock();
        let result = state.ledger.complete_frontier(identity);
        self.finish_one(state);
        result
    }

    /// Gives up on a dequeued reference, keeping its row for a later session
    pub fn release(&self, identity: &str) {
        tracing::debug!("Releasing {} back to the persisted frontier", identity);
        let state = self.lock();
        self.finish_one(state);
    }

    fn finish_one(&self, mut state: MutexGuard<'_, FrontierState>) {
        state.in_flight = state.in_flight.saturating_sub(1);
        let drained = state.in_flight == 0 && state.buffer.is_empty() && state.spilled == 0;
        drop(state);
        if drained {
            self.notify.notify_waiters();
        }
    }

    /// Refuses new references and releases waiting workers
    pub fn stop(&self) {
        self.lock().stopping = true;
        self.notify.notify_waiters();
    }

    pub fn is_stopping(&self) -> bool {
        self.lock().stopping
    }

    /// Returns true if dequeues were halted by the maximum-documents limit
    pub fn limit_reached(&self) -> bool {
        self.lock().limit_reached
    }

    /// Number of references handed out so far
    pub fn dequeued(&self) -> u64 {
        self.lock().dequeued
    }

    /// Pending references, in memory and spilled
    pub fn len(&self) -> u64 {
        let state = self.lock();
        state.buffer.len() as u64 + state.spilled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending rows in the persisted queue
    pub fn persisted_len(&self) -> StorageResult<u64> {
        self.lock().ledger.frontier_len()
    }
}

/// A dequeued reference owned by one worker
///
/// Dropped without `complete`, the reference is released: its row stays
/// persisted and it no longer counts as in flight.
pub struct Claim<'a> {
    frontier: &'a Frontier,
    entry: FrontierEntry,
    settled: bool,
}

impl Claim<'_> {
    pub fn entry(&self) -> &FrontierEntry {
        &self.entry
    }

    pub fn identity(&self) -> &str {
        &self.entry.identity
    }

    pub fn complete(mut self) -> StorageResult<()> {
        self.settled = true;
        self.frontier.complete(&self.entry.identity)
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.frontier.release(&self.entry.identity);
        }
    }
}
