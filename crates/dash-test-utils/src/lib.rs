//! Testing utilities for the dashboard workspace
//!
//! In-memory data service with scriptable failures and latency, record
//! fixtures, and tracing setup.

#![allow(missing_docs)]

use async_trait::async_trait;
use dash_record::{
    Entity, Expense, ExpenseField, ExpenseStatus, ListQuery, Opportunity, OpportunityField,
    PartialFields, PipelineStage, Record, RecordId,
};
use dash_sync::{DataService, ServiceError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

type Normalizer<E> = Box<dyn Fn(&mut Record<E>) + Send + Sync>;

/// Server double backed by an ordered map
///
/// `update` merges the payload, runs the optional normalizer, and returns the
/// stored record. Failures can be scripted per call or per record.
pub struct InMemoryService<E: Entity> {
    records: Mutex<IndexMap<RecordId, Record<E>>>,
    updates: Mutex<Vec<(RecordId, PartialFields<E>)>>,
    deletes: Mutex<Vec<RecordId>>,
    next_failures: Mutex<VecDeque<ServiceError>>,
    failing_records: Mutex<HashMap<RecordId, ServiceError>>,
    failing_deletes: Mutex<HashMap<RecordId, ServiceError>>,
    latency: Mutex<Duration>,
    record_latency: Mutex<HashMap<RecordId, Duration>>,
    normalizer: Option<Normalizer<E>>,
    gets: AtomicU64,
    next_id: AtomicU64,
}

impl<E: Entity> InMemoryService<E> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(IndexMap::new()),
            updates: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            next_failures: Mutex::new(VecDeque::new()),
            failing_records: Mutex::new(HashMap::new()),
            failing_deletes: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            record_latency: Mutex::new(HashMap::new()),
            normalizer: None,
            gets: AtomicU64::new(0),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn with_records(self, records: impl IntoIterator<Item = Record<E>>) -> Self {
        {
            let mut guard = self.records.lock();
            for record in records {
                guard.insert(record.id(), record);
            }
        }
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Server-side rewrite applied after every update
    pub fn with_normalizer(mut self, normalizer: impl Fn(&mut Record<E>) + Send + Sync + 'static) -> Self {
        self.normalizer = Some(Box::new(normalizer));
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_record_latency(&self, id: RecordId, latency: Duration) {
        self.record_latency.lock().insert(id, latency);
    }

    /// Fail the next update call, whatever record it targets
    pub fn fail_next_update(&self, error: ServiceError) {
        self.next_failures.lock().push_back(error);
    }

    /// Fail every update of `id` until cleared
    pub fn fail_updates_for(&self, id: RecordId, error: ServiceError) {
        self.failing_records.lock().insert(id, error);
    }

    pub fn clear_failures(&self) {
        self.next_failures.lock().clear();
        self.failing_records.lock().clear();
        self.failing_deletes.lock().clear();
    }

    pub fn fail_deletes_for(&self, id: RecordId, error: ServiceError) {
        self.failing_deletes.lock().insert(id, error);
    }

    /// Every update call received, in arrival order
    pub fn updates(&self) -> Vec<(RecordId, PartialFields<E>)> {
        self.updates.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn updates_for(&self, id: RecordId) -> Vec<PartialFields<E>> {
        self.updates
            .lock()
            .iter()
            .filter(|(target, _)| *target == id)
            .map(|(_, fields)| fields.clone())
            .collect()
    }

    pub fn deletes(&self) -> Vec<RecordId> {
        self.deletes.lock().clone()
    }

    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Server-side copy of a record
    pub fn stored(&self, id: RecordId) -> Option<Record<E>> {
        self.records.lock().get(&id).cloned()
    }

    /// Change a record behind the client's back
    pub fn put(&self, record: Record<E>) {
        self.records.lock().insert(record.id(), record);
    }

    async fn delay(&self, id: Option<RecordId>) {
        let latency = id
            .and_then(|id| self.record_latency.lock().get(&id).copied())
            .unwrap_or_else(|| *self.latency.lock());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl<E: Entity> Default for InMemoryService<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> DataService<E> for InMemoryService<E> {
    async fn get(&self, id: RecordId) -> Result<Record<E>, ServiceError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.delay(Some(id)).await;
        self.stored(id).ok_or(ServiceError::NotFound(id))
    }

    async fn list(&self, query: &ListQuery<E>) -> Result<Vec<Record<E>>, ServiceError> {
        self.delay(None).await;
        let records = self.records.lock();
        let matching = records.values().filter(|record| query.matches(record)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn update(
        &self,
        id: RecordId,
        fields: &PartialFields<E>,
    ) -> Result<Record<E>, ServiceError> {
        self.updates.lock().push((id, fields.clone()));
        let scripted = self.next_failures.lock().pop_front();
        let failure = scripted.or_else(|| self.failing_records.lock().get(&id).cloned());
        self.delay(Some(id)).await;
        if let Some(error) = failure {
            return Err(error);
        }

        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
        record.apply(fields);
        if let Some(normalize) = &self.normalizer {
            normalize(record);
        }
        Ok(record.clone())
    }

    async fn create(&self, fields: &PartialFields<E>) -> Result<Record<E>, ServiceError> {
        self.delay(None).await;
        let id = RecordId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut record = Record::from_fields(id, fields.clone());
        if let Some(normalize) = &self.normalizer {
            normalize(&mut record);
        }
        self.records.lock().insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> Result<(), ServiceError> {
        self.deletes.lock().push(id);
        let failure = self.failing_deletes.lock().get(&id).cloned();
        self.delay(Some(id)).await;
        if let Some(error) = failure {
            return Err(error);
        }
        self.records
            .lock()
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(ServiceError::NotFound(id))
    }
}

pub fn opportunity(id: u64, name: &str, stage: PipelineStage, amount: u64) -> Record<Opportunity> {
    Record::new(RecordId::new(id))
        .with(OpportunityField::Name, name)
        .with(OpportunityField::Stage, stage)
        .with(OpportunityField::Amount, amount)
        .with(OpportunityField::Owner, "dana")
}

pub fn expense(id: u64, vendor: &str, amount: &str) -> Record<Expense> {
    Record::new(RecordId::new(id))
        .with(ExpenseField::Date, "2024-03-01")
        .with(ExpenseField::Vendor, vendor)
        .with(ExpenseField::Category, "travel")
        .with(ExpenseField::Amount, amount)
        .with(ExpenseField::Status, ExpenseStatus::Pending)
}

/// Opportunities spread round-robin over the open stages
pub fn pipeline(count: u64) -> Vec<Record<Opportunity>> {
    let open: Vec<PipelineStage> = PipelineStage::ALL
        .iter()
        .copied()
        .filter(|stage| !stage.is_closed())
        .collect();
    (1..=count)
        .map(|id| {
            let stage = open[usize::try_from(id).unwrap_or(0) % open.len()];
            opportunity(id, &format!("Deal {id}"), stage, id * 1000)
        })
        .collect()
}

pub fn ledger(count: u64) -> Vec<Record<Expense>> {
    (1..=count)
        .map(|id| expense(id, &format!("Vendor {id}"), &format!("{}", id * 10)))
        .collect()
}

/// Formats amounts with two decimals, like the ledger backend does
pub fn normalize_amount(record: &mut Record<Expense>) {
    let formatted = record
        .get(ExpenseField::Amount)
        .and_then(|value| value.as_str().and_then(|s| s.parse::<f64>().ok()))
        .map(|amount| format!("{amount:.2}"));
    if let Some(formatted) = formatted {
        record.set(ExpenseField::Amount, formatted);
    }
}

pub fn rejected(message: &str) -> ServiceError {
    ServiceError::Rejected(message.to_string())
}

pub fn unavailable() -> ServiceError {
    ServiceError::Unavailable("503 service unavailable".to_string())
}

/// Route tracing output through the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run without advancing paused time
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
