//! Rollback bookkeeping
//!
//! Tracks, per record, the last server-confirmed value of every field that
//! has an unconfirmed local change (the baseline). A failed write restores
//! the baseline, not the intermediate optimistic values the user typed.

use crate::ticket::{CommitTicket, TicketId};
use dash_record::{Entity, FieldSnapshot, PartialFields, Record, RecordId};
use dash_store::RecordStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

struct Bound<E: Entity> {
    record_id: RecordId,
    prior: FieldSnapshot<E>,
}

/// Snapshot manager
///
/// # Invariants
/// - A baseline entry exists for a field iff it has an unconfirmed change
///   (pending or in flight)
/// - The first capture wins; later edits of the same field never overwrite
///   the baseline
/// - Each ticket restores at most once
pub struct RollbackManager<E: Entity> {
    baselines: Mutex<HashMap<RecordId, FieldSnapshot<E>>>,
    tickets: Mutex<HashMap<TicketId, Bound<E>>>,
}

impl<E: Entity> RollbackManager<E> {
    /// Create empty manager
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            baselines: Mutex::new(HashMap::new()),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Record prior values before an optimistic apply
    ///
    /// Fields that already have a baseline keep it. Returns the number of
    /// newly tracked fields.
    pub fn snapshot(&self, id: RecordId, prior: &FieldSnapshot<E>) -> usize {
        let mut guard = self.baselines.lock();
        let baseline = guard.entry(id).or_default();
        let mut tracked = 0;
        for (field, value) in prior.iter() {
            if baseline.record_if_absent(field, value.cloned()) {
                tracked += 1;
            }
        }
        tracked
    }

    /// Attach the baseline of a ticket's payload fields to the ticket
    pub fn bind(&self, ticket: &CommitTicket<E>) -> FieldSnapshot<E> {
        let prior = self
            .baselines
            .lock()
            .get(&ticket.record_id())
            .map(|baseline| baseline.restrict(ticket.payload().fields()))
            .unwrap_or_default();
        self.tickets.lock().insert(
            ticket.id(),
            Bound {
                record_id: ticket.record_id(),
                prior: prior.clone(),
            },
        );
        prior
    }

    /// Restore the confirmed values of a failed ticket's fields
    ///
    /// Fields re-edited since dispatch (`still_pending`) keep their newer
    /// value and their baseline. Returns the restored snapshot, or `None` if
    /// the ticket is unknown (already settled).
    pub fn rollback(
        &self,
        ticket: TicketId,
        store: &RecordStore<E>,
        still_pending: Option<&PartialFields<E>>,
    ) -> Option<FieldSnapshot<E>> {
        let Bound { record_id, mut prior } = self.tickets.lock().remove(&ticket)?;
        if let Some(pending) = still_pending {
            prior.retain(|field| !pending.contains(field));
        }
        self.untrack(record_id, &prior);
        if !prior.is_empty() {
            store.revert(record_id, &prior);
        }
        Some(prior)
    }

    /// Mark a successful ticket's fields confirmed by `server`
    ///
    /// Fields re-edited since dispatch adopt the server value as their new
    /// baseline; the rest stop being tracked.
    pub fn confirm(
        &self,
        ticket: TicketId,
        server: &Record<E>,
        still_pending: Option<&PartialFields<E>>,
    ) {
        let Some(Bound { record_id, prior }) = self.tickets.lock().remove(&ticket) else {
            return;
        };
        let mut guard = self.baselines.lock();
        let Some(baseline) = guard.get_mut(&record_id) else {
            return;
        };
        for field in prior.fields() {
            if still_pending.is_some_and(|pending| pending.contains(field)) {
                baseline.record(field, server.get(field).cloned());
            } else {
                baseline.remove(field);
            }
        }
        if baseline.is_empty() {
            guard.remove(&record_id);
        }
    }

    /// Drop all state of a record (deleted or left the view)
    pub fn forget(&self, id: RecordId) {
        self.baselines.lock().remove(&id);
        self.tickets.lock().retain(|_, bound| bound.record_id != id);
    }

    /// Copy of a record's baseline
    #[must_use]
    pub fn baseline(&self, id: RecordId) -> Option<FieldSnapshot<E>> {
        self.baselines.lock().get(&id).cloned()
    }

    /// True if the record has unconfirmed changes tracked
    #[inline]
    #[must_use]
    pub fn is_tracking(&self, id: RecordId) -> bool {
        self.baselines
            .lock()
            .get(&id)
            .is_some_and(|baseline| !baseline.is_empty())
    }

    /// Tickets awaiting settlement
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.tickets.lock().len()
    }

    fn untrack(&self, id: RecordId, fields: &FieldSnapshot<E>) {
        let mut guard = self.baselines.lock();
        if let Some(baseline) = guard.get_mut(&id) {
            for field in fields.fields() {
                baseline.remove(field);
            }
            if baseline.is_empty() {
                guard.remove(&id);
            }
        }
    }
}

impl<E: Entity> Default for RollbackManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for RollbackManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackManager")
            .field("records", &self.baselines.lock().len())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
