//! Pending edit buffer
//!
//! Accumulates field-level changes per record until they are drained into a
//! commit. At most one pending set exists per record id.

use dash_record::{Entity, PartialFields, RecordId, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Per-record accumulator of unconfirmed field changes
///
/// # Invariants
/// - At most one pending set per record id
/// - A newer value for a pending field overwrites the older one
/// - [`drain`](Self::drain) is atomic: edits merged afterwards start a new set
pub struct PendingEditBuffer<E: Entity> {
    pending: Mutex<HashMap<RecordId, PartialFields<E>>>,
}

impl<E: Entity> PendingEditBuffer<E> {
    /// Create empty buffer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Set or overwrite one pending field
    ///
    /// Returns the complete pending set for the record after the merge.
    pub fn merge(&self, id: RecordId, field: E::Field, value: impl Into<Value>) -> PartialFields<E> {
        let mut guard = self.pending.lock();
        let entry = guard.entry(id).or_default();
        entry.set(field, value);
        entry.clone()
    }

    /// Merge several fields at once (bulk actions)
    pub fn merge_all(&self, id: RecordId, fields: &PartialFields<E>) -> PartialFields<E> {
        let mut guard = self.pending.lock();
        let entry = guard.entry(id).or_default();
        entry.merge(fields);
        entry.clone()
    }

    /// Remove and return the pending set of a record
    pub fn drain(&self, id: RecordId) -> Option<PartialFields<E>> {
        self.pending
            .lock()
            .remove(&id)
            .filter(|fields| !fields.is_empty())
    }

    /// Copy of the pending set without removing it
    #[must_use]
    pub fn peek(&self, id: RecordId) -> Option<PartialFields<E>> {
        self.pending.lock().get(&id).cloned()
    }

    /// Drop pending edits without sending them
    pub fn discard(&self, id: RecordId) -> Option<PartialFields<E>> {
        self.pending.lock().remove(&id)
    }

    /// True if the record has unsent edits
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, id: RecordId) -> bool {
        self.pending
            .lock()
            .get(&id)
            .is_some_and(|fields| !fields.is_empty())
    }

    /// Ids with unsent edits
    #[must_use]
    pub fn dirty_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .pending
            .lock()
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of records with pending sets
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True if nothing is pending
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl<E: Entity> Default for PendingEditBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for PendingEditBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEditBuffer")
            .field("kind", &E::KIND)
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dash_record::{Expense, ExpenseField};

    const ID: RecordId = RecordId::new(7);

    #[test]
    fn merge_returns_complete_pending_set() {
        let buffer = PendingEditBuffer::<Expense>::new();
        buffer.merge(ID, ExpenseField::Amount, "150");
        let pending = buffer.merge(ID, ExpenseField::Vendor, "Acme");

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.get(ExpenseField::Amount), Some(&Value::from("150")));
    }

    #[test]
    fn merge_overwrites_same_field() {
        let buffer = PendingEditBuffer::<Expense>::new();
        buffer.merge(ID, ExpenseField::Amount, "150");
        let pending = buffer.merge(ID, ExpenseField::Amount, "155");

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(ExpenseField::Amount), Some(&Value::from("155")));
    }

    #[test]
    fn drain_starts_a_new_set() {
        let buffer = PendingEditBuffer::<Expense>::new();
        buffer.merge(ID, ExpenseField::Amount, "150");

        let drained = buffer.drain(ID).unwrap();
        assert_eq!(drained.len(), 1);
        assert!(!buffer.is_dirty(ID));
        assert!(buffer.drain(ID).is_none());

        let fresh = buffer.merge(ID, ExpenseField::Notes, "late");
        assert_eq!(fresh.len(), 1);
        assert!(!fresh.contains(ExpenseField::Amount));
    }

    #[test]
    fn dirty_tracking_per_record() {
        let buffer = PendingEditBuffer::<Expense>::new();
        buffer.merge(RecordId::new(2), ExpenseField::Amount, "1");
        buffer.merge(RecordId::new(1), ExpenseField::Amount, "1");

        assert!(buffer.is_dirty(RecordId::new(1)));
        assert!(!buffer.is_dirty(RecordId::new(3)));
        assert_eq!(buffer.dirty_ids(), vec![RecordId::new(1), RecordId::new(2)]);

        buffer.discard(RecordId::new(1));
        assert_eq!(buffer.dirty_ids(), vec![RecordId::new(2)]);
    }
}
