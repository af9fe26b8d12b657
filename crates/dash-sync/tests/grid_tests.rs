//! Grid (cell edit) behaviour: debounce, coalescing, stale responses, rollback

use dash_record::{Expense, ExpenseField, ListQuery, PartialFields, RecordId, Value};
use dash_sync::{
    CommitError, CommitOutcome, Coordinator, CoordinatorConfig, CoordinatorError, DataService,
    NotificationKind,
};
use dash_test_utils::{
    expense, init_tracing, normalize_amount, rejected, settle, unavailable, InMemoryService,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const EXPENSE: RecordId = RecordId::new(7);

async fn ledger(
    service: InMemoryService<Expense>,
    config: CoordinatorConfig,
) -> (Arc<InMemoryService<Expense>>, Coordinator<Expense>) {
    init_tracing();
    let service = Arc::new(service.with_records([
        expense(7, "Acme", "100"),
        expense(8, "Globex", "80"),
    ]));
    let dyn_service: Arc<dyn DataService<Expense>> = service.clone();
    let coordinator = Coordinator::new(dyn_service, config).unwrap();
    coordinator.load(&ListQuery::new()).await.unwrap();
    (service, coordinator)
}

fn amount(coordinator: &Coordinator<Expense>, id: RecordId) -> Option<Value> {
    coordinator.store().value(id, ExpenseField::Amount)
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_sends_one_write_with_last_value() {
    let service = InMemoryService::new().with_normalizer(normalize_amount);
    let (service, coordinator) = ledger(service, CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));

    sleep(ms(100)).await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "155").unwrap();
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("155")));

    sleep(ms(499)).await;
    assert_eq!(service.update_count(), 0);
    assert!(coordinator.is_dirty(EXPENSE));

    sleep(ms(2)).await;
    let updates = service.updates_for(EXPENSE);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 1);
    assert_eq!(updates[0].get(ExpenseField::Amount), Some(&Value::from("155")));

    // server normalization wins
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("155.00")));
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn edits_to_different_fields_merge_into_one_payload() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(200)).await;
    coordinator.edit_cell_by_name(EXPENSE, "vendor", "Initech").unwrap();
    sleep(ms(600)).await;

    let updates = service.updates_for(EXPENSE);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].get(ExpenseField::Amount), Some(&Value::from("150")));
    assert_eq!(updates[0].get(ExpenseField::Vendor), Some(&Value::from("Initech")));
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_send_separate_writes() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(700)).await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "175").unwrap();
    sleep(ms(700)).await;

    let updates = service.updates_for(EXPENSE);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].get(ExpenseField::Amount), Some(&Value::from("175")));
}

#[tokio::test(start_paused = true)]
async fn records_debounce_independently() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(300)).await;
    coordinator.edit_cell(RecordId::new(8), ExpenseField::Amount, "90").unwrap();

    sleep(ms(250)).await;
    assert_eq!(service.updates_for(EXPENSE).len(), 1);
    assert!(service.updates_for(RecordId::new(8)).is_empty());

    sleep(ms(300)).await;
    assert_eq!(service.updates_for(RecordId::new(8)).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_write_restores_confirmed_value_and_notifies() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    let mut notifications = coordinator.notifications();
    service.fail_next_update(rejected("amount exceeds policy limit"));

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(100)).await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "155").unwrap();
    sleep(ms(600)).await;

    // back to the last server-confirmed value, not the intermediate "150"
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("100")));
    assert!(!coordinator.is_dirty(EXPENSE));

    let notification = notifications.try_recv().unwrap();
    assert_eq!(notification.kind, NotificationKind::CommitFailed);
    assert_eq!(notification.record_id, Some(EXPENSE));
    assert_eq!(
        notification.error,
        CommitError::ValidationRejected {
            message: "amount exceeds policy limit".into()
        }
    );
    assert_eq!(coordinator.stats().writes_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_write_triggers_refresh() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    service.fail_next_update(unavailable());

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(600)).await;

    assert_eq!(service.get_count(), 1);
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("100")));
}

#[tokio::test(start_paused = true)]
async fn refresh_after_failure_can_be_disabled() {
    let config = CoordinatorConfig::default().with_refresh_after_failure(false);
    let (service, coordinator) = ledger(InMemoryService::new(), config).await;
    service.fail_next_update(unavailable());

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    sleep(ms(600)).await;

    assert_eq!(service.get_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn response_for_superseded_edit_is_discarded() {
    let (service, coordinator) = ledger(
        InMemoryService::new().with_latency(ms(200)),
        CoordinatorConfig::default(),
    )
    .await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let flushing = coordinator.clone();
    let first = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;
    assert_eq!(service.update_count(), 1);

    // newer edit while the first write is in flight
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "155").unwrap();

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { applied: false, .. }));
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("155")));
    assert_eq!(coordinator.stats().stale_responses, 1);
    assert!(coordinator.is_dirty(EXPENSE));

    sleep(ms(1000)).await;
    assert_eq!(service.update_count(), 2);
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("155")));
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn response_for_removed_then_reloaded_record_is_discarded() {
    let (_service, coordinator) = ledger(
        InMemoryService::new().with_latency(ms(200)),
        CoordinatorConfig::default(),
    )
    .await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let flushing = coordinator.clone();
    let first = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;

    coordinator.remove_record(EXPENSE);
    coordinator.load_records([expense(7, "Acme", "100")]);
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "999").unwrap();

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { applied: false, .. }));
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("999")));
    assert!(coordinator.is_dirty(EXPENSE));
    assert_eq!(coordinator.stats().stale_responses, 1);
}

#[tokio::test(start_paused = true)]
async fn rollback_after_stale_success_restores_accepted_value() {
    let (service, coordinator) = ledger(
        InMemoryService::new().with_latency(ms(200)),
        CoordinatorConfig::default(),
    )
    .await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let flushing = coordinator.clone();
    let first = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "155").unwrap();
    first.await.unwrap();

    service.fail_next_update(rejected("locked by finance"));
    sleep(ms(1000)).await;

    // "150" was accepted by the server, "155" was refused
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_fields_re_edited_during_flight() {
    let (service, coordinator) = ledger(
        InMemoryService::new().with_latency(ms(200)),
        CoordinatorConfig::default(),
    )
    .await;
    service.fail_next_update(unavailable());

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    coordinator.edit_cell(EXPENSE, ExpenseField::Vendor, "Initech").unwrap();
    let flushing = coordinator.clone();
    let first = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Vendor, "Umbrella").unwrap();

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Failed { .. }));
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("100")));
    assert_eq!(
        coordinator.store().value(EXPENSE, ExpenseField::Vendor),
        Some(Value::from("Umbrella"))
    );
    assert!(coordinator.is_dirty(EXPENSE));

    sleep(ms(1000)).await;
    let last = service.updates_for(EXPENSE).pop().unwrap();
    assert_eq!(last.get(ExpenseField::Vendor), Some(&Value::from("Umbrella")));
    assert!(!last.contains(ExpenseField::Amount));
}

#[tokio::test(start_paused = true)]
async fn writes_to_one_record_never_overlap() {
    let (service, coordinator) = ledger(
        InMemoryService::new().with_latency(ms(300)),
        CoordinatorConfig::default(),
    )
    .await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let flushing = coordinator.clone();
    let first = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "155").unwrap();
    let flushing = coordinator.clone();
    let second = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;

    // second write waits for the first response
    sleep(ms(100)).await;
    assert_eq!(service.update_count(), 1);
    assert!(coordinator.is_dirty(EXPENSE));

    let outcome = second.await.unwrap();
    assert!(outcome.is_committed());
    assert_eq!(service.update_count(), 2);
    assert!(first.await.unwrap().is_committed());
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("155")));
}

#[tokio::test(start_paused = true)]
async fn commit_timeout_rolls_back() {
    let config = CoordinatorConfig::default()
        .with_commit_timeout(Duration::from_secs(1))
        .with_refresh_after_failure(false);
    let (_service, coordinator) =
        ledger(InMemoryService::new().with_latency(Duration::from_secs(5)), config).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let outcome = coordinator.flush(EXPENSE).await;

    match outcome {
        CommitOutcome::Failed { error, .. } => assert!(error.is_retryable()),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("100")));
}

#[tokio::test(start_paused = true)]
async fn flush_with_nothing_pending_is_idle() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    assert!(matches!(coordinator.flush(EXPENSE).await, CommitOutcome::Idle));
    assert_eq!(service.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn removed_record_never_commits() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    coordinator.remove_record(EXPENSE);
    sleep(ms(1000)).await;

    assert_eq!(service.update_count(), 0);
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn close_stops_timers_but_keeps_edits() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    assert_eq!(coordinator.close(), 1);
    sleep(ms(1000)).await;
    assert_eq!(service.update_count(), 0);
    assert!(coordinator.is_dirty(EXPENSE));

    let outcome = coordinator.flush_all().await;
    assert_eq!(outcome.succeeded, vec![EXPENSE]);
    assert_eq!(service.update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_record_and_column_are_rejected() {
    let (_service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    let err = coordinator
        .edit_cell(RecordId::new(404), ExpenseField::Amount, "1")
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::RecordNotFound(id) if id == RecordId::new(404)));

    let err = coordinator.edit_cell_by_name(EXPENSE, "colour", "red").unwrap_err();
    assert!(matches!(err, CoordinatorError::Record(_)));
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn refresh_skips_dirty_records() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    service.put(expense(8, "Globex", "85"));

    assert!(coordinator.refresh(RecordId::new(8)).await.unwrap());
    assert_eq!(amount(&coordinator, RecordId::new(8)), Some(Value::from("85")));

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    service.put(expense(7, "Acme", "120"));
    assert!(!coordinator.refresh(EXPENSE).await.unwrap());
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));
}

#[tokio::test(start_paused = true)]
async fn reload_keeps_pending_edits_visible() {
    let (_service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    coordinator.load(&ListQuery::new()).await.unwrap();

    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));
    assert!(coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn reload_during_write_keeps_in_flight_values_visible() {
    let service = InMemoryService::new();
    service.set_record_latency(EXPENSE, ms(300));
    let (service, coordinator) = ledger(service, CoordinatorConfig::default()).await;

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    let flushing = coordinator.clone();
    let write = tokio::spawn(async move { flushing.flush(EXPENSE).await });
    settle().await;
    coordinator.edit_cell(EXPENSE, ExpenseField::Vendor, "Initech").unwrap();

    coordinator.load(&ListQuery::new()).await.unwrap();
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));
    assert_eq!(
        coordinator.store().value(EXPENSE, ExpenseField::Vendor),
        Some(Value::from("Initech"))
    );
    assert!(coordinator.is_dirty(EXPENSE));

    assert!(write.await.unwrap().is_committed());
    sleep(ms(1000)).await;
    assert_eq!(service.update_count(), 2);
    assert_eq!(amount(&coordinator, EXPENSE), Some(Value::from("150")));
    assert_eq!(
        coordinator.store().value(EXPENSE, ExpenseField::Vendor),
        Some(Value::from("Initech"))
    );
    assert!(!coordinator.is_dirty(EXPENSE));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_optimistic_value_before_write() {
    let (service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (sink, store) = (Arc::clone(&seen), Arc::clone(coordinator.store()));
    coordinator.subscribe(move |change| {
        if let Some(id) = change.record_id() {
            sink.lock().push(store.value(id, ExpenseField::Amount));
        }
    });

    coordinator.edit_cell(EXPENSE, ExpenseField::Amount, "150").unwrap();
    assert_eq!(*seen.lock(), vec![Some(Value::from("150"))]);
    assert_eq!(service.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn create_adds_server_record_to_view() {
    let (_service, coordinator) = ledger(InMemoryService::new(), CoordinatorConfig::default()).await;
    let fields: PartialFields<Expense> = [(ExpenseField::Vendor, "Hooli"), (ExpenseField::Amount, "42")]
        .into_iter()
        .collect();

    let created = coordinator.create(&fields).await.unwrap();
    assert!(coordinator.store().contains(created.id()));
    assert_eq!(coordinator.store().len(), 3);
}
