//! Coordinator facade
//!
//! Entry point the view talks to: cell edits, stage moves, bulk actions and
//! deletes, dirty checks and the notification feed.

use crate::committer::{dedup, BatchCommitter, BulkOutcome, CommitOutcome};
use crate::config::CoordinatorConfig;
use crate::debounce::DebounceScheduler;
use crate::error::{CommitError, CoordinatorError};
use crate::notify::Notification;
use crate::service::DataService;
use crate::stats::StatsSnapshot;
use crate::transition::{PointerRelease, Transition, TransitionOutcome};
use dash_record::{parse_field, Entity, ListQuery, PartialFields, Record, RecordId, Staged, Value};
use dash_store::{PendingEditBuffer, RecordStore, StoreChange, SubscriptionId};
use futures::future::join_all;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};

/// What a pointer release led to
#[derive(Debug)]
pub enum GestureOutcome {
    /// Open the record's detail view
    OpenDetail(RecordId),
    /// Stage move started (or a same-column no-op)
    Moved(Transition),
    /// Nothing happened
    Ignored,
}

struct Inner<E: Entity> {
    store: Arc<RecordStore<E>>,
    buffer: Arc<PendingEditBuffer<E>>,
    committer: BatchCommitter<E>,
    debounce: DebounceScheduler,
    service: Arc<dyn DataService<E>>,
    config: CoordinatorConfig,
    runtime: Handle,
}

/// Optimistic mutation coordinator for one view
///
/// Cheap to clone; clones share state.
///
/// # Invariants
/// - Every local edit is visible in the store before the call returns
/// - At most one write per record is in flight
/// - A response never overwrites a newer local edit
/// - A failed write restores the last server-confirmed values of its fields
pub struct Coordinator<E: Entity> {
    inner: Arc<Inner<E>>,
}

impl<E: Entity> Clone for Coordinator<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> Coordinator<E> {
    /// Create a coordinator with an empty view
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Config`] if `config` is out of range.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(
        service: Arc<dyn DataService<E>>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let runtime = Handle::current();
        let store = Arc::new(RecordStore::new());
        let buffer = Arc::new(PendingEditBuffer::new());

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<E>>| {
            let weak = weak.clone();
            let debounce =
                DebounceScheduler::with_handle(runtime.clone(), config.debounce(), move |id| {
                    if let Some(inner) = weak.upgrade() {
                        tokio::spawn(async move {
                            inner.committer.commit_one(id).await;
                        });
                    }
                });
            Inner {
                committer: BatchCommitter::new(
                    Arc::clone(&service),
                    Arc::clone(&store),
                    Arc::clone(&buffer),
                    &config,
                ),
                store,
                buffer,
                debounce,
                service,
                config,
                runtime,
            }
        });

        tracing::info!(kind = E::KIND, debounce_ms = inner.config.debounce_ms, "coordinator ready");
        Ok(Self { inner })
    }

    /// Fetch records from the service and make them the view
    ///
    /// Unconfirmed edits (pending or in flight) stay visible on top of the
    /// loaded data. Pending edits of records absent from the result are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Service`] if listing fails; the view is
    /// left untouched.
    pub async fn load(&self, query: &ListQuery<E>) -> Result<usize, CoordinatorError> {
        let records = self.inner.service.list(query).await?;
        let inner = &self.inner;

        let mut ids = inner.committer.in_flight_ids();
        ids.extend(inner.buffer.dirty_ids());
        let overlays: Vec<(RecordId, PartialFields<E>)> = dedup(&ids)
            .into_iter()
            .filter_map(|id| self.unconfirmed(id).map(|fields| (id, fields)))
            .collect();
        inner.store.load(records);

        for (id, pending) in overlays {
            if inner.store.contains(id) {
                inner.store.apply(id, &pending);
            } else {
                self.remove_record(id);
            }
        }
        let count = inner.store.len();
        tracing::info!(kind = E::KIND, count, "view loaded");
        Ok(count)
    }

    /// Seed the view without a service round trip
    pub fn load_records(&self, records: impl IntoIterator<Item = Record<E>>) {
        self.inner.store.load(records);
    }

    /// Edit one cell
    ///
    /// The value shows immediately; the record commits once edits go quiet
    /// for the debounce period.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RecordNotFound`] if the record is not in view.
    pub fn edit_cell(
        &self,
        id: RecordId,
        field: E::Field,
        value: impl Into<Value>,
    ) -> Result<(), CoordinatorError> {
        let value = value.into();
        tracing::trace!(record = %id, field = %field, "cell edit");
        self.stage(id, &PartialFields::new().with(field, value))?;
        self.inner.committer.stats().record_edit();
        self.inner.debounce.schedule(id);
        Ok(())
    }

    /// Edit one cell addressed by column name
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Record`] for an unknown column, otherwise
    /// as [`edit_cell`](Self::edit_cell).
    pub fn edit_cell_by_name(
        &self,
        id: RecordId,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<(), CoordinatorError> {
        let field = parse_field::<E>(column)?;
        self.edit_cell(id, field, value)
    }

    /// Move a card to another stage column
    ///
    /// Dropping on the current column is a no-op that issues no write. Any
    /// other target applies immediately and commits without waiting for the
    /// debounce period.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RecordNotFound`] if the record is not in view.
    pub fn move_record(
        &self,
        id: RecordId,
        stage: impl Into<Value>,
    ) -> Result<Transition, CoordinatorError>
    where
        E: Staged,
    {
        let stage = stage.into();
        let inner = &self.inner;
        let from = inner
            .store
            .get(id)
            .ok_or(CoordinatorError::RecordNotFound(id))?
            .get(E::STAGE_FIELD)
            .cloned();

        if from.as_ref() == Some(&stage) {
            tracing::debug!(record = %id, stage = %stage, "drop on current column ignored");
            return Ok(Transition::noop(id, stage));
        }

        self.stage(id, &PartialFields::new().with(E::STAGE_FIELD, stage.clone()))?;
        inner.committer.stats().record_move();
        inner.debounce.cancel(id);
        let version = inner.committer.versions().current(id);
        tracing::debug!(record = %id, from = ?from, to = %stage, version, "stage move");

        let (settled, receiver) = oneshot::channel();
        let task = Arc::clone(inner);
        let target = stage.clone();
        inner.runtime.spawn(async move {
            let outcome = task.committer.commit_one(id).await;
            let _ = settled.send(task.resolve_move(id, version, &target, outcome));
        });

        Ok(Transition::committing(id, from, stage, receiver))
    }

    /// Act on a classified pointer release
    ///
    /// # Errors
    ///
    /// As [`move_record`](Self::move_record) for drops.
    pub fn release(&self, release: PointerRelease) -> Result<GestureOutcome, CoordinatorError>
    where
        E: Staged,
    {
        match release {
            PointerRelease::Click(id) => Ok(GestureOutcome::OpenDetail(id)),
            PointerRelease::Drop { record_id, target } => {
                self.move_record(record_id, target).map(GestureOutcome::Moved)
            }
            PointerRelease::Cancelled => Ok(GestureOutcome::Ignored),
        }
    }

    /// Apply the same fields to many records and commit them concurrently
    ///
    /// Records not in view fail with [`CommitError::RecordMissing`]. Failed
    /// records roll back individually.
    pub async fn bulk_update(&self, ids: &[RecordId], fields: &PartialFields<E>) -> BulkOutcome {
        let inner = &self.inner;
        let mut targets = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.stage(id, fields) {
                Ok(()) => {
                    inner.debounce.cancel(id);
                    targets.push(id);
                }
                Err(_) => missing.push((id, CommitError::RecordMissing(id))),
            }
        }

        let mut outcome = inner.committer.commit_many(&targets).await;
        outcome.extend_failed(missing);
        self.report_bulk("bulk update", &outcome);
        outcome
    }

    /// Delete many records, each removed once the server confirms
    pub async fn delete_many(&self, ids: &[RecordId]) -> BulkOutcome {
        let inner = &self.inner;
        let ids = dedup(ids);
        for &id in &ids {
            inner.debounce.cancel(id);
        }
        let results = join_all(
            ids.iter()
                .map(|&id| async move { (id, inner.committer.delete_one(id).await) }),
        )
        .await;
        let outcome = BulkOutcome::from_results(results);

        for id in outcome.failed_ids() {
            if inner.buffer.is_dirty(id) {
                inner.debounce.schedule(id);
            }
        }
        self.report_bulk("bulk delete", &outcome);
        outcome
    }

    /// Delete one record
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Commit`] if the server refused.
    pub async fn delete(&self, id: RecordId) -> Result<(), CoordinatorError> {
        self.inner.debounce.cancel(id);
        let result = self.inner.committer.delete_one(id).await;
        if result.is_err() && self.inner.buffer.is_dirty(id) {
            self.inner.debounce.schedule(id);
        }
        result.map_err(CoordinatorError::from)
    }

    /// Create a record; it joins the view once the server assigns its id
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Service`] if creation fails.
    pub async fn create(&self, fields: &PartialFields<E>) -> Result<Record<E>, CoordinatorError> {
        let record = self.inner.service.create(fields).await?;
        self.inner.store.insert(record.clone());
        tracing::debug!(record = %record.id(), kind = E::KIND, "record created");
        Ok(record)
    }

    /// Re-read one record from the service
    ///
    /// Skipped (returns `false`) while the record has unconfirmed edits.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Service`] if the fetch fails.
    pub async fn refresh(&self, id: RecordId) -> Result<bool, CoordinatorError> {
        if self.is_dirty(id) {
            return Ok(false);
        }
        let version = self.inner.committer.versions().current(id);
        let record = self.inner.service.get(id).await?;
        if self.is_dirty(id) || self.inner.committer.versions().current(id) != version {
            return Ok(false);
        }
        Ok(self.inner.store.replace(id, record))
    }

    /// Commit a record now instead of waiting for its debounce timer
    pub async fn flush(&self, id: RecordId) -> CommitOutcome<E> {
        self.inner.debounce.cancel(id);
        self.inner.committer.commit_one(id).await
    }

    /// Commit every record with pending edits
    pub async fn flush_all(&self) -> BulkOutcome {
        let ids = self.inner.buffer.dirty_ids();
        for &id in &ids {
            self.inner.debounce.cancel(id);
        }
        let outcome = self.inner.committer.commit_many(&ids).await;
        self.report_bulk("flush", &outcome);
        outcome
    }

    /// Drop a record from the view without a write
    ///
    /// Its pending edits are discarded; a late response for it is ignored.
    pub fn remove_record(&self, id: RecordId) -> Option<Record<E>> {
        let inner = &self.inner;
        inner.debounce.cancel(id);
        if let Some(dropped) = inner.buffer.discard(id) {
            tracing::debug!(record = %id, fields = dropped.len(), "pending edits discarded");
        }
        inner.committer.forget(id);
        inner.store.remove(id)
    }

    /// Stop all debounce timers
    ///
    /// Pending edits stay in the buffer; call [`flush_all`](Self::flush_all)
    /// first to send them.
    pub fn close(&self) -> usize {
        let cancelled = self.inner.debounce.cancel_all();
        tracing::info!(kind = E::KIND, cancelled, "coordinator closed");
        cancelled
    }

    /// True while the record has edits the server has not confirmed
    #[must_use]
    pub fn is_dirty(&self, id: RecordId) -> bool {
        self.inner.buffer.is_dirty(id) || self.inner.committer.is_in_flight(id)
    }

    /// True if any record is dirty
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        !self.inner.buffer.is_empty() || self.inner.committer.in_flight_count() > 0
    }

    /// Current copy of a record
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<Record<E>> {
        self.inner.store.get(id)
    }

    /// The view's record store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore<E>> {
        &self.inner.store
    }

    /// Register a store change callback
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreChange<E>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.store.subscribe(callback)
    }

    /// Failure notification feed
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.committer.notifier().subscribe()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.committer.stats().snapshot()
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Snapshot, buffer, version bump, then apply
    fn stage(&self, id: RecordId, fields: &PartialFields<E>) -> Result<(), CoordinatorError> {
        let inner = &self.inner;
        let prior = inner
            .store
            .capture(id, fields.fields())
            .ok_or(CoordinatorError::RecordNotFound(id))?;
        inner.committer.rollback().snapshot(id, &prior);
        inner.buffer.merge_all(id, fields);
        inner.committer.versions().bump(id);
        inner.store.apply(id, fields);
        Ok(())
    }

    /// In-flight payload with newer pending edits merged on top
    fn unconfirmed(&self, id: RecordId) -> Option<PartialFields<E>> {
        let inner = &self.inner;
        match (inner.committer.in_flight_payload(id), inner.buffer.peek(id)) {
            (Some(mut fields), Some(pending)) => {
                fields.merge(&pending);
                Some(fields)
            }
            (fields, pending) => fields.or(pending),
        }
    }

    fn report_bulk(&self, action: &str, outcome: &BulkOutcome) {
        if let Some(error) = outcome.error() {
            tracing::warn!(
                action,
                failed = outcome.failed.len(),
                succeeded = outcome.succeeded.len(),
                "partial failure"
            );
            self.inner
                .committer
                .notifier()
                .emit(Notification::bulk_partial_failure(error));
        }
    }
}

impl<E: Staged> Inner<E> {
    fn resolve_move(
        &self,
        id: RecordId,
        version: u64,
        target: &Value,
        outcome: CommitOutcome<E>,
    ) -> TransitionOutcome {
        match outcome {
            CommitOutcome::Committed { .. } => TransitionOutcome::confirmed(),
            CommitOutcome::Failed { error, .. } => TransitionOutcome::rolled_back(error),
            CommitOutcome::Skipped(id) => TransitionOutcome::rolled_back(CommitError::RecordMissing(id)),
            // An earlier queued write drained the move along with other edits.
            CommitOutcome::Idle => match self.committer.last_settlement(id) {
                Some(settlement) if settlement.version >= version => match settlement.result {
                    Ok(()) => TransitionOutcome::confirmed(),
                    Err(error) => TransitionOutcome::rolled_back(error),
                },
                _ if self.store.value(id, E::STAGE_FIELD).as_ref() == Some(target) => {
                    TransitionOutcome::confirmed()
                }
                _ => TransitionOutcome::rolled_back(CommitError::RecordMissing(id)),
            },
        }
    }
}

impl<E: Entity> fmt::Debug for Coordinator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("kind", &E::KIND)
            .field("store", &self.inner.store)
            .field("pending", &self.inner.buffer.len())
            .field("committer", &self.inner.committer)
            .field("debounce", &self.inner.debounce)
            .finish()
    }
}
