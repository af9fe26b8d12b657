//! Store and buffer working together the way the coordinator drives them

use dash_record::{Expense, ExpenseField, FieldKey, PartialFields, Record, RecordId, Value};
use dash_store::{PendingEditBuffer, RecordStore, StoreChange};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ID: RecordId = RecordId::new(7);

fn seeded() -> RecordStore<Expense> {
    let store = RecordStore::new();
    store.load([Record::new(ID)
        .with(ExpenseField::Amount, "100")
        .with(ExpenseField::Vendor, "Acme")]);
    store
}

#[test]
fn buffered_edits_and_store_agree() {
    let store = seeded();
    let buffer = PendingEditBuffer::<Expense>::new();

    for value in ["150", "155"] {
        let patch = PartialFields::new().with(ExpenseField::Amount, value);
        buffer.merge_all(ID, &patch);
        store.apply(ID, &patch);
    }

    let pending = buffer.drain(ID).unwrap();
    assert_eq!(pending.get(ExpenseField::Amount), Some(&Value::from("155")));
    assert_eq!(store.value(ID, ExpenseField::Amount), Some(Value::from("155")));
}

#[test]
fn one_notification_per_mutation() {
    let store = seeded();
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    store.subscribe(move |change: &StoreChange<Expense>| {
        assert_eq!(change.record_id(), Some(ID));
        sink.fetch_add(1, Ordering::Relaxed);
    });

    let snapshot = store.capture(ID, [ExpenseField::Amount]).unwrap();
    store.apply(ID, &PartialFields::new().with(ExpenseField::Amount, "150"));
    store.revert(ID, &snapshot);
    store.replace(ID, Record::new(ID).with(ExpenseField::Amount, "100.00"));

    assert_eq!(count.load(Ordering::Relaxed), 3);
}

fn edit() -> impl Strategy<Value = (ExpenseField, String)> {
    (
        prop::sample::select(ExpenseField::ALL.to_vec()),
        "[a-z0-9]{1,6}",
    )
}

proptest! {
    #[test]
    fn revert_of_first_capture_restores_original(edits in prop::collection::vec(edit(), 1..20)) {
        let store = seeded();
        let original = store.get(ID).unwrap();
        let mut baseline = dash_record::FieldSnapshot::<Expense>::new();

        for (field, value) in &edits {
            let prior = store.capture(ID, [*field]).unwrap();
            for (key, old) in prior.iter() {
                baseline.record_if_absent(key, old.cloned());
            }
            store.apply(ID, &PartialFields::new().with(*field, value.as_str()));
        }

        store.revert(ID, &baseline);
        prop_assert_eq!(store.get(ID).unwrap(), original);
    }
}
