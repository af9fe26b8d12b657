//! Batch committer
//!
//! Drains a record's pending edits into one write, dispatches it, and settles
//! the response against the record's local version.
//!
//! Writes to the same record are serialized through a per-record lane; writes
//! to different records run concurrently.

use crate::config::CoordinatorConfig;
use crate::error::{CommitError, ServiceError};
use crate::notify::{Notification, Notifier};
use crate::rollback::RollbackManager;
use crate::service::DataService;
use crate::stats::CoordinatorStats;
use crate::ticket::{CommitTicket, TicketId, VersionClock};
use dash_record::{Entity, PartialFields, Record, RecordId};
use dash_store::{PendingEditBuffer, RecordStore};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Result of one [`BatchCommitter::commit_one`] call
#[derive(Debug, Clone)]
pub enum CommitOutcome<E: Entity> {
    /// Nothing was pending
    Idle,
    /// The record left the view; pending edits were dropped
    Skipped(RecordId),
    /// Server accepted the write
    Committed {
        /// Dispatched ticket
        ticket: CommitTicket<E>,
        /// `false` if the response was stale and left the store untouched
        applied: bool,
    },
    /// Write failed and was rolled back
    Failed {
        /// Dispatched ticket
        ticket: CommitTicket<E>,
        /// Cause
        error: CommitError,
    },
}

impl<E: Entity> CommitOutcome<E> {
    /// Ticket dispatched, if any
    #[must_use]
    pub fn ticket(&self) -> Option<&CommitTicket<E>> {
        match self {
            Self::Committed { ticket, .. } | Self::Failed { ticket, .. } => Some(ticket),
            Self::Idle | Self::Skipped(_) => None,
        }
    }

    /// True if a write was confirmed
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Collapse into success or the commit error
    ///
    /// # Errors
    ///
    /// Returns the failure cause, or [`CommitError::RecordMissing`] when skipped.
    pub fn into_result(self) -> Result<(), CommitError> {
        match self {
            Self::Idle | Self::Committed { .. } => Ok(()),
            Self::Skipped(id) => Err(CommitError::RecordMissing(id)),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

/// Per-record results of a multi-record action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Records confirmed (or with nothing to send)
    pub succeeded: Vec<RecordId>,
    /// Records rolled back, with their cause
    pub failed: Vec<(RecordId, CommitError)>,
}

impl BulkOutcome {
    /// Partition per-record results
    #[must_use]
    pub fn from_results(results: impl IntoIterator<Item = (RecordId, Result<(), CommitError>)>) -> Self {
        let mut outcome = Self::default();
        for (id, result) in results {
            match result {
                Ok(()) => outcome.succeeded.push(id),
                Err(error) => outcome.failed.push((id, error)),
            }
        }
        outcome
    }

    /// Append failures decided before dispatch
    pub fn extend_failed(&mut self, failed: impl IntoIterator<Item = (RecordId, CommitError)>) {
        self.failed.extend(failed);
    }

    /// Ids that failed
    #[must_use]
    pub fn failed_ids(&self) -> Vec<RecordId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }

    /// True if every record succeeded
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Summary error, if any record failed
    #[must_use]
    pub fn error(&self) -> Option<CommitError> {
        (!self.failed.is_empty()).then(|| CommitError::PartialBulkFailure {
            failed: self.failed_ids(),
            succeeded: self.succeeded.len(),
        })
    }

    /// Succeeded ids, or [`CommitError::PartialBulkFailure`]
    ///
    /// # Errors
    ///
    /// Returns the summary error if any record failed.
    pub fn into_result(self) -> Result<Vec<RecordId>, CommitError> {
        match self.error() {
            Some(error) => Err(error),
            None => Ok(self.succeeded),
        }
    }
}

/// Last settled write of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Settled ticket
    pub ticket: TicketId,
    /// Local version the ticket carried
    pub version: u64,
    /// Outcome
    pub result: Result<(), CommitError>,
}

/// Commit pipeline of one view
pub struct BatchCommitter<E: Entity> {
    service: Arc<dyn DataService<E>>,
    store: Arc<RecordStore<E>>,
    buffer: Arc<PendingEditBuffer<E>>,
    rollback: Arc<RollbackManager<E>>,
    versions: Arc<VersionClock>,
    notifier: Notifier,
    stats: Arc<CoordinatorStats>,
    lanes: DashMap<RecordId, Arc<AsyncMutex<()>>>,
    in_flight: DashMap<RecordId, CommitTicket<E>>,
    settlements: DashMap<RecordId, Settlement>,
    next_ticket: AtomicU64,
    timeout: Option<Duration>,
    refresh_after_failure: bool,
}

impl<E: Entity> BatchCommitter<E> {
    /// Create a committer over shared view state
    #[must_use]
    pub fn new(
        service: Arc<dyn DataService<E>>,
        store: Arc<RecordStore<E>>,
        buffer: Arc<PendingEditBuffer<E>>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            service,
            store,
            buffer,
            rollback: Arc::new(RollbackManager::new()),
            versions: Arc::new(VersionClock::new()),
            notifier: Notifier::new(config.notification_capacity),
            stats: Arc::new(CoordinatorStats::new()),
            lanes: DashMap::new(),
            in_flight: DashMap::new(),
            settlements: DashMap::new(),
            next_ticket: AtomicU64::new(1),
            timeout: config.commit_timeout(),
            refresh_after_failure: config.refresh_after_failure,
        }
    }

    /// Rollback bookkeeping shared with the coordinator
    #[inline]
    #[must_use]
    pub fn rollback(&self) -> &Arc<RollbackManager<E>> {
        &self.rollback
    }

    /// Version clock shared with the coordinator
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &Arc<VersionClock> {
        &self.versions
    }

    /// Notification sender
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Counters
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<CoordinatorStats> {
        &self.stats
    }

    /// True while a write for the record awaits its response
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self, id: RecordId) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Number of writes awaiting a response
    #[inline]
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Payload of the write awaiting a response for a record
    #[must_use]
    pub fn in_flight_payload(&self, id: RecordId) -> Option<PartialFields<E>> {
        self.in_flight.get(&id).map(|ticket| ticket.payload().clone())
    }

    /// Records with a write awaiting a response
    #[must_use]
    pub fn in_flight_ids(&self) -> Vec<RecordId> {
        self.in_flight.iter().map(|entry| *entry.key()).collect()
    }

    /// Records with a live commit lane
    #[inline]
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Last settled write of a record
    #[must_use]
    pub fn last_settlement(&self, id: RecordId) -> Option<Settlement> {
        self.settlements.get(&id).map(|entry| entry.value().clone())
    }

    /// Commit whatever is pending for one record
    ///
    /// Waits for an earlier write of the same record to settle first; the
    /// pending set is drained only once the lane is acquired, so edits made
    /// while waiting ride along.
    pub async fn commit_one(&self, id: RecordId) -> CommitOutcome<E> {
        let lane = self.lane(id);
        let outcome = {
            let _turn = lane.lock().await;
            self.commit_in_lane(id).await
        };
        drop(lane);
        self.release_lane(id);
        outcome
    }

    async fn commit_in_lane(&self, id: RecordId) -> CommitOutcome<E> {
        let Some(payload) = self.buffer.drain(id) else {
            return CommitOutcome::Idle;
        };
        if !self.store.contains(id) {
            self.rollback.forget(id);
            tracing::debug!(record = %id, kind = E::KIND, "record left the view, pending edits dropped");
            return CommitOutcome::Skipped(id);
        }

        let ticket = self.issue(id, payload);
        self.rollback.bind(&ticket);
        self.in_flight.insert(id, ticket.clone());
        self.stats.record_write();
        tracing::debug!(
            record = %id,
            ticket = %ticket.id(),
            version = ticket.version(),
            fields = ticket.payload().len(),
            "dispatching commit"
        );

        let result = self.within(self.service.update(id, ticket.payload())).await;
        self.in_flight.remove(&id);

        match result {
            Ok(server) => {
                let applied = self.settle_success(&ticket, server);
                CommitOutcome::Committed { ticket, applied }
            }
            Err(error) => {
                self.settle_failure(&ticket, &error).await;
                CommitOutcome::Failed { ticket, error }
            }
        }
    }

    /// Commit several records concurrently
    ///
    /// Each record succeeds or fails on its own; one failure never rolls back
    /// another record.
    pub async fn commit_many(&self, ids: &[RecordId]) -> BulkOutcome {
        let ids = dedup(ids);
        let results = join_all(ids.iter().map(|&id| async move {
            (id, self.commit_one(id).await.into_result())
        }))
        .await;
        BulkOutcome::from_results(results)
    }

    /// Delete a record once the server confirms
    ///
    /// Serialized behind any write of the same record.
    ///
    /// # Errors
    ///
    /// Returns the failure cause; the record stays in view.
    pub async fn delete_one(&self, id: RecordId) -> Result<(), CommitError> {
        let lane = self.lane(id);
        let result = {
            let _turn = lane.lock().await;
            self.delete_in_lane(id).await
        };
        drop(lane);
        self.release_lane(id);
        result
    }

    async fn delete_in_lane(&self, id: RecordId) -> Result<(), CommitError> {
        if !self.store.contains(id) {
            return Err(CommitError::RecordMissing(id));
        }
        match self.within(self.service.delete(id)).await {
            Ok(()) => {
                self.store.remove(id);
                self.buffer.discard(id);
                self.forget(id);
                self.stats.record_delete();
                tracing::debug!(record = %id, kind = E::KIND, "record deleted");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(record = %id, error = %error, "delete failed");
                self.notifier.emit(Notification::delete_failed(id, error.clone()));
                Err(error)
            }
        }
    }

    /// Drop version, rollback and settlement state of a record
    pub fn forget(&self, id: RecordId) {
        self.rollback.forget(id);
        self.versions.retire(id);
        self.settlements.remove(&id);
        self.release_lane(id);
    }

    fn lane(&self, id: RecordId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.lanes.entry(id).or_default().value())
    }

    /// Drop the lane once no task holds or awaits it
    fn release_lane(&self, id: RecordId) {
        self.lanes.remove_if(&id, |_, lane| Arc::strong_count(lane) == 1);
    }

    fn issue(&self, id: RecordId, payload: PartialFields<E>) -> CommitTicket<E> {
        let ticket = TicketId::new(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        CommitTicket::new(ticket, id, payload, self.versions.current(id))
    }

    async fn within<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, CommitError> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(CommitError::from),
                Err(_) => Err(CommitError::TransientNetworkFailure {
                    message: format!("no response within {}ms", limit.as_millis()),
                }),
            },
            None => call.await.map_err(CommitError::from),
        }
    }

    fn settle_success(&self, ticket: &CommitTicket<E>, server: Record<E>) -> bool {
        let id = ticket.record_id();
        let still_pending = self.buffer.peek(id);
        self.rollback.confirm(ticket.id(), &server, still_pending.as_ref());
        self.stats.record_confirmed();

        let current = self.versions.current(id);
        let applied = current == ticket.version();
        if applied {
            self.store.replace(id, server);
        } else {
            self.stats.record_stale();
            let stale = CommitError::StaleOverwrite {
                ticket: ticket.id(),
                current,
            };
            tracing::debug!(record = %id, issued = ticket.version(), "{stale}");
        }
        self.settle(ticket, Ok(()));
        applied
    }

    async fn settle_failure(&self, ticket: &CommitTicket<E>, error: &CommitError) {
        let id = ticket.record_id();
        let still_pending = self.buffer.peek(id);
        let restored = self
            .rollback
            .rollback(ticket.id(), &self.store, still_pending.as_ref())
            .map_or(0, |snapshot| snapshot.len());
        self.stats.record_failure();
        tracing::warn!(
            record = %id,
            ticket = %ticket.id(),
            restored,
            error = %error,
            "commit failed, rolled back"
        );
        self.settle(ticket, Err(error.clone()));
        self.notifier.emit(Notification::commit_failed(id, error.clone()));

        if self.refresh_after_failure {
            self.refresh_if_quiet(id, ticket.version()).await;
        }
    }

    fn settle(&self, ticket: &CommitTicket<E>, result: Result<(), CommitError>) {
        self.settlements.insert(
            ticket.record_id(),
            Settlement {
                ticket: ticket.id(),
                version: ticket.version(),
                result,
            },
        );
    }

    /// Re-read a record after a failure, unless the user edited it since
    async fn refresh_if_quiet(&self, id: RecordId, version: u64) {
        match self.service.get(id).await {
            Ok(record) => {
                if self.versions.current(id) == version && !self.buffer.is_dirty(id) {
                    self.store.replace(id, record);
                }
            }
            Err(error) => {
                tracing::debug!(record = %id, error = %error, "refresh after failure skipped");
            }
        }
    }
}

impl<E: Entity> fmt::Debug for BatchCommitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCommitter")
            .field("kind", &E::KIND)
            .field("in_flight", &self.in_flight_count())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) fn dedup(ids: &[RecordId]) -> Vec<RecordId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
