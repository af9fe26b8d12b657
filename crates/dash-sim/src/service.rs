//! Simulated backend with latency and random failures

use async_trait::async_trait;
use dash_record::{Entity, ListQuery, PartialFields, Record, RecordId};
use dash_sync::{DataService, ServiceError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Backend whose writes fail at a configurable rate
pub struct FlakyService<E: Entity> {
    records: Mutex<IndexMap<RecordId, Record<E>>>,
    rng: Mutex<StdRng>,
    failure_rate: f64,
    latency: Duration,
    jitter: Duration,
}

impl<E: Entity> FlakyService<E> {
    /// Create a backend seeded with `records`
    #[must_use]
    pub fn new(
        records: impl IntoIterator<Item = Record<E>>,
        seed: u64,
        failure_rate: f64,
        latency: Duration,
    ) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|record| (record.id(), record)).collect()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency,
            jitter: latency / 2,
        }
    }

    /// Server copy of every record
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record<E>> {
        self.records.lock().values().cloned().collect()
    }

    fn roll(&self) -> (Duration, Option<ServiceError>) {
        let mut rng = self.rng.lock();
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(0);
        let delay = self.latency + Duration::from_millis(rng.random_range(0..=jitter_ms));
        let failure = rng.random_bool(self.failure_rate).then(|| {
            if rng.random_bool(0.5) {
                ServiceError::Rejected("simulated validation failure".into())
            } else {
                ServiceError::Unavailable("simulated outage".into())
            }
        });
        (delay, failure)
    }
}

#[async_trait]
impl<E: Entity> DataService<E> for FlakyService<E> {
    async fn get(&self, id: RecordId) -> Result<Record<E>, ServiceError> {
        tokio::time::sleep(self.latency).await;
        self.records.lock().get(&id).cloned().ok_or(ServiceError::NotFound(id))
    }

    async fn list(&self, query: &ListQuery<E>) -> Result<Vec<Record<E>>, ServiceError> {
        tokio::time::sleep(self.latency).await;
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
        let (delay, failure) = self.roll();
        tokio::time::sleep(delay).await;
        if let Some(error) = failure {
            return Err(error);
        }
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
        record.apply(fields);
        Ok(record.clone())
    }

    async fn create(&self, fields: &PartialFields<E>) -> Result<Record<E>, ServiceError> {
        tokio::time::sleep(self.latency).await;
        let mut records = self.records.lock();
        let next = records.keys().map(|id| id.get()).max().unwrap_or(0) + 1;
        let record = Record::from_fields(RecordId::new(next), fields.clone());
        records.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> Result<(), ServiceError> {
        let (delay, failure) = self.roll();
        tokio::time::sleep(delay).await;
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
