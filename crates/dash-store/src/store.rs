//! Subscribable record store
//!
//! Every mutation goes through [`RecordStore::apply`], [`RecordStore::replace`]
//! or [`RecordStore::revert`] (plus whole-view loads and inserts/removals) and
//! notifies subscribers synchronously, before the call returns.

use dash_record::{Entity, FieldSnapshot, PartialFields, Record, RecordId, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Subscriber handle returned by [`RecordStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange<E: Entity> {
    /// Whole view replaced
    Loaded {
        /// Records now in view
        count: usize,
    },
    /// Record added (or overwritten in place)
    Inserted(RecordId),
    /// Optimistic merge
    Applied {
        /// Target record
        id: RecordId,
        /// Fields merged
        fields: PartialFields<E>,
    },
    /// Authoritative server data installed
    Replaced(RecordId),
    /// Fields restored after a failed write
    Reverted {
        /// Target record
        id: RecordId,
        /// Restored prior values
        fields: FieldSnapshot<E>,
    },
    /// Record left the view
    Removed(RecordId),
}

impl<E: Entity> StoreChange<E> {
    /// Record affected, if the change targets a single record
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Loaded { .. } => None,
            Self::Inserted(id) | Self::Replaced(id) | Self::Removed(id) => Some(*id),
            Self::Applied { id, .. } | Self::Reverted { id, .. } => Some(*id),
        }
    }
}

type Subscriber<E> = Arc<dyn Fn(&StoreChange<E>) + Send + Sync>;

/// Canonical record set of one view
///
/// Records keep server order. Unknown ids are ignored by the mutation methods
/// rather than treated as errors: a late write may target a record the user
/// already navigated away from.
pub struct RecordStore<E: Entity> {
    records: RwLock<IndexMap<RecordId, Record<E>>>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<E>)>>,
    next_subscription: AtomicU64,
    revision: AtomicU64,
}

impl<E: Entity> RecordStore<E> {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            revision: AtomicU64::new(0),
        }
    }

    /// Replace the whole view
    pub fn load(&self, records: impl IntoIterator<Item = Record<E>>) {
        let count = {
            let mut guard = self.records.write();
            guard.clear();
            for record in records {
                guard.insert(record.id(), record);
            }
            guard.len()
        };
        self.notify(&StoreChange::Loaded { count });
    }

    /// Add a record, or overwrite it in place if already present
    pub fn insert(&self, record: Record<E>) {
        let id = record.id();
        self.records.write().insert(id, record);
        self.notify(&StoreChange::Inserted(id));
    }

    /// Remove a record from the view
    pub fn remove(&self, id: RecordId) -> Option<Record<E>> {
        let removed = self.records.write().shift_remove(&id);
        if removed.is_some() {
            self.notify(&StoreChange::Removed(id));
        }
        removed
    }

    /// Merge fields into a record optimistically
    ///
    /// Fields the record does not carry yet are stored verbatim. Returns
    /// `false` (and does nothing) if the record is not in view.
    pub fn apply(&self, id: RecordId, fields: &PartialFields<E>) -> bool {
        {
            let mut guard = self.records.write();
            let Some(record) = guard.get_mut(&id) else {
                tracing::debug!(record = %id, kind = E::KIND, "apply to record not in view dropped");
                return false;
            };
            record.apply(fields);
        }
        self.notify(&StoreChange::Applied {
            id,
            fields: fields.clone(),
        });
        true
    }

    /// Install the server's view of a record
    ///
    /// Wins over any optimistic value. Returns `false` if the record is not in
    /// view or already identical (no notification in either case).
    pub fn replace(&self, id: RecordId, record: Record<E>) -> bool {
        {
            let mut guard = self.records.write();
            let Some(current) = guard.get_mut(&id) else {
                return false;
            };
            if *current == record {
                return false;
            }
            *current = record;
        }
        self.notify(&StoreChange::Replaced(id));
        true
    }

    /// Restore previously captured field values
    ///
    /// Returns `false` if the record is not in view.
    pub fn revert(&self, id: RecordId, snapshot: &FieldSnapshot<E>) -> bool {
        {
            let mut guard = self.records.write();
            let Some(record) = guard.get_mut(&id) else {
                return false;
            };
            record.revert(snapshot);
        }
        self.notify(&StoreChange::Reverted {
            id,
            fields: snapshot.clone(),
        });
        true
    }

    /// Copy of a record
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<Record<E>> {
        self.records.read().get(&id).cloned()
    }

    /// Current value of one field
    #[must_use]
    pub fn value(&self, id: RecordId, field: E::Field) -> Option<Value> {
        self.records
            .read()
            .get(&id)
            .and_then(|record| record.get(field).cloned())
    }

    /// Capture current values of `fields` (for rollback)
    #[must_use]
    pub fn capture(
        &self,
        id: RecordId,
        fields: impl IntoIterator<Item = E::Field>,
    ) -> Option<FieldSnapshot<E>> {
        self.records
            .read()
            .get(&id)
            .map(|record| record.capture(fields))
    }

    /// Check whether a record is in view
    #[inline]
    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.read().contains_key(&id)
    }

    /// All records, in view order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record<E>> {
        self.records.read().values().cloned().collect()
    }

    /// All ids, in view order
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.read().keys().copied().collect()
    }

    /// Number of records in view
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if the view is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of notifications issued so far
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Register a change callback
    ///
    /// Callbacks run on the mutating task, after the store lock is released,
    /// so they may read the store.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreChange<E>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a change callback
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscribers.write();
        let before = guard.len();
        guard.retain(|(sub, _)| *sub != id);
        guard.len() != before
    }

    fn notify(&self, change: &StoreChange<E>) {
        self.revision.fetch_add(1, Ordering::AcqRel);
        let subscribers: Vec<Subscriber<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(change);
        }
    }
}

impl<E: Entity> Default for RecordStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for RecordStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("kind", &E::KIND)
            .field("records", &self.len())
            .field("subscribers", &self.subscribers.read().len())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dash_record::{Expense, ExpenseField};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn expense(id: u64, amount: &str) -> Record<Expense> {
        Record::new(RecordId::new(id)).with(ExpenseField::Amount, amount)
    }

    fn seeded() -> RecordStore<Expense> {
        let store = RecordStore::new();
        store.load([expense(1, "10"), expense(2, "20"), expense(3, "30")]);
        store
    }

    #[test]
    fn apply_unknown_record_is_noop() {
        let store = seeded();
        let revision = store.revision();
        let patch = PartialFields::new().with(ExpenseField::Amount, "99");

        assert!(!store.apply(RecordId::new(404), &patch));
        assert_eq!(store.revision(), revision);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn replace_identical_record_does_not_notify() {
        let store = seeded();
        let revision = store.revision();

        assert!(!store.replace(RecordId::new(1), expense(1, "10")));
        assert_eq!(store.revision(), revision);

        assert!(store.replace(RecordId::new(1), expense(1, "11")));
        assert_eq!(store.revision(), revision + 1);
    }

    #[test]
    fn remove_keeps_view_order() {
        let store = seeded();
        store.remove(RecordId::new(2));
        assert_eq!(store.ids(), vec![RecordId::new(1), RecordId::new(3)]);
    }

    #[test]
    fn subscribers_see_each_apply_synchronously() {
        let store = seeded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |change: &StoreChange<Expense>| {
            sink.lock().push(change.record_id());
        });

        let patch = PartialFields::new().with(ExpenseField::Amount, "15");
        store.apply(RecordId::new(1), &patch);
        assert_eq!(seen.lock().len(), 1);
        store.apply(RecordId::new(1), &patch);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn callbacks_may_read_the_store() {
        let store = Arc::new(seeded());
        let observed = Arc::new(Mutex::new(None));
        let (reader, sink) = (Arc::clone(&store), Arc::clone(&observed));
        store.subscribe(move |change: &StoreChange<Expense>| {
            if let Some(id) = change.record_id() {
                *sink.lock() = reader.value(id, ExpenseField::Amount);
            }
        });

        let patch = PartialFields::new().with(ExpenseField::Amount, "12");
        store.apply(RecordId::new(1), &patch);
        assert_eq!(*observed.lock(), Some(Value::from("12")));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = seeded();
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);
        let sub = store.subscribe(move |_: &StoreChange<Expense>| {
            sink.fetch_add(1, Ordering::Relaxed);
        });

        assert!(store.unsubscribe(sub));
        store.remove(RecordId::new(1));
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
