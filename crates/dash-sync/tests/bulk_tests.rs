//! Multi-record actions: bulk update isolation and deletes

use dash_record::{
    ListQuery, Opportunity, OpportunityField, PartialFields, PipelineStage, RecordId, Value,
};
use dash_sync::{CommitError, Coordinator, CoordinatorConfig, DataService, NotificationKind};
use dash_test_utils::{init_tracing, pipeline, rejected, settle, InMemoryService};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

async fn board(
    service: InMemoryService<Opportunity>,
) -> (Arc<InMemoryService<Opportunity>>, Coordinator<Opportunity>) {
    init_tracing();
    let service = Arc::new(service.with_records(pipeline(3)));
    let dyn_service: Arc<dyn DataService<Opportunity>> = service.clone();
    let coordinator = Coordinator::new(dyn_service, CoordinatorConfig::default()).unwrap();
    coordinator.load(&ListQuery::new()).await.unwrap();
    (service, coordinator)
}

fn ids(raw: &[u64]) -> Vec<RecordId> {
    raw.iter().copied().map(RecordId::new).collect()
}

fn close_won() -> PartialFields<Opportunity> {
    PartialFields::new().with(OpportunityField::Stage, PipelineStage::ClosedWon)
}

#[tokio::test(start_paused = true)]
async fn one_failure_does_not_roll_back_the_others() {
    let (service, coordinator) = board(InMemoryService::new()).await;
    let mut notifications = coordinator.notifications();
    let before = coordinator.store().value(RecordId::new(2), OpportunityField::Stage);
    service.fail_updates_for(RecordId::new(2), rejected("stage locked"));

    let outcome = coordinator.bulk_update(&ids(&[1, 2, 3]), &close_won()).await;

    assert_eq!(outcome.succeeded, ids(&[1, 3]));
    assert_eq!(outcome.failed_ids(), ids(&[2]));

    let won = Some(Value::from("closed_won"));
    assert_eq!(coordinator.store().value(RecordId::new(1), OpportunityField::Stage), won);
    assert_eq!(coordinator.store().value(RecordId::new(3), OpportunityField::Stage), won);
    assert_eq!(coordinator.store().value(RecordId::new(2), OpportunityField::Stage), before);

    let kinds: Vec<NotificationKind> = std::iter::from_fn(|| notifications.try_recv().ok())
        .map(|notification| notification.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::CommitFailed, NotificationKind::BulkPartialFailure]
    );

    assert_eq!(
        outcome.into_result().unwrap_err(),
        CommitError::PartialBulkFailure {
            failed: ids(&[2]),
            succeeded: 2,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn bulk_writes_run_concurrently() {
    let (service, coordinator) =
        board(InMemoryService::new().with_latency(Duration::from_millis(200))).await;

    let started = Instant::now();
    let outcome = coordinator.bulk_update(&ids(&[1, 2, 3]), &close_won()).await;

    assert!(outcome.is_complete());
    assert_eq!(service.update_count(), 3);
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn bulk_applies_optimistically_before_responses() {
    let (_service, coordinator) =
        board(InMemoryService::new().with_latency(Duration::from_millis(200))).await;

    let running = coordinator.clone();
    let bulk = tokio::spawn(async move { running.bulk_update(&ids(&[1, 2]), &close_won()).await });
    settle().await;

    for id in ids(&[1, 2]) {
        assert_eq!(
            coordinator.store().value(id, OpportunityField::Stage),
            Some(Value::from("closed_won"))
        );
        assert!(coordinator.is_dirty(id));
    }
    assert!(bulk.await.unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn bulk_reports_records_not_in_view() {
    let (service, coordinator) = board(InMemoryService::new()).await;

    let outcome = coordinator.bulk_update(&ids(&[1, 99]), &close_won()).await;

    assert_eq!(outcome.succeeded, ids(&[1]));
    assert_eq!(
        outcome.failed,
        vec![(RecordId::new(99), CommitError::RecordMissing(RecordId::new(99)))]
    );
    assert_eq!(service.update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_removes_only_confirmed_records() {
    let (service, coordinator) = board(InMemoryService::new()).await;
    let mut notifications = coordinator.notifications();
    service.fail_deletes_for(RecordId::new(2), rejected("has open quotes"));

    let outcome = coordinator.delete_many(&ids(&[1, 2, 3])).await;

    assert_eq!(outcome.succeeded, ids(&[1, 3]));
    assert_eq!(coordinator.store().ids(), ids(&[2]));
    assert_eq!(coordinator.stats().deletes, 2);

    let first = notifications.try_recv().unwrap();
    assert_eq!(first.kind, NotificationKind::DeleteFailed);
    assert_eq!(first.record_id, Some(RecordId::new(2)));
}

#[tokio::test(start_paused = true)]
async fn delete_drops_pending_edits() {
    let (service, coordinator) = board(InMemoryService::new()).await;
    let id = RecordId::new(1);

    coordinator.edit_cell(id, OpportunityField::Owner, "sam").unwrap();
    coordinator.delete(id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(service.update_count(), 0);
    assert_eq!(service.deletes(), vec![id]);
    assert!(!coordinator.store().contains(id));
    assert!(!coordinator.is_dirty(id));
}

#[tokio::test(start_paused = true)]
async fn failed_delete_keeps_pending_edits_scheduled() {
    let (service, coordinator) = board(InMemoryService::new()).await;
    let id = RecordId::new(1);
    service.fail_deletes_for(id, rejected("has open quotes"));

    coordinator.edit_cell(id, OpportunityField::Owner, "sam").unwrap();
    assert!(coordinator.delete(id).await.is_err());
    assert!(coordinator.store().contains(id));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(service.update_count(), 1);
    assert!(!coordinator.is_dirty(id));
}

#[tokio::test(start_paused = true)]
async fn delete_many_ignores_repeated_ids() {
    let (service, coordinator) = board(InMemoryService::new()).await;
    let mut notifications = coordinator.notifications();

    let outcome = coordinator.delete_many(&ids(&[1, 1])).await;

    assert_eq!(outcome.succeeded, ids(&[1]));
    assert!(outcome.is_complete());
    assert_eq!(service.deletes(), ids(&[1]));
    assert!(notifications.try_recv().is_err());
}
