//! Data service boundary
//!
//! The coordinator's only view of the backend. Implementations translate
//! these calls into whatever transport the dashboard uses.

use crate::error::ServiceError;
use async_trait::async_trait;
use dash_record::{Entity, ListQuery, PartialFields, Record, RecordId};

/// CRUD surface of one entity kind
///
/// `update` carries only the changed fields and returns the full
/// authoritative record, which may differ from what was sent (server-side
/// normalization).
#[async_trait]
pub trait DataService<E: Entity>: Send + Sync {
    /// Fetch one record
    async fn get(&self, id: RecordId) -> Result<Record<E>, ServiceError>;

    /// Fetch the records matching `query`
    async fn list(&self, query: &ListQuery<E>) -> Result<Vec<Record<E>>, ServiceError>;

    /// Partial update
    async fn update(
        &self,
        id: RecordId,
        fields: &PartialFields<E>,
    ) -> Result<Record<E>, ServiceError>;

    /// Create a record; the server assigns the id
    async fn create(&self, fields: &PartialFields<E>) -> Result<Record<E>, ServiceError>;

    /// Delete a record
    async fn delete(&self, id: RecordId) -> Result<(), ServiceError>;
}
