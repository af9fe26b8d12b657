//! List filters

use crate::entity::Entity;
use crate::fields::PartialFields;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side list filter
///
/// Field equality constraints plus an optional row limit. The data service
/// may interpret it however its backend allows; [`ListQuery::matches`] gives
/// the reference semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ListQuery<E: Entity> {
    /// Required field values
    pub equals: PartialFields<E>,
    /// Maximum rows to return
    pub limit: Option<usize>,
}

impl<E: Entity> ListQuery<E> {
    /// Unfiltered query
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            equals: PartialFields::new(),
            limit: None,
        }
    }

    /// Require `field == value`
    #[inline]
    #[must_use]
    pub fn where_eq(mut self, field: E::Field, value: impl Into<Value>) -> Self {
        self.equals.set(field, value);
        self
    }

    /// Cap the number of rows
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a record against the equality constraints
    #[inline]
    #[must_use]
    pub fn matches(&self, record: &Record<E>) -> bool {
        record.matches(&self.equals)
    }
}

impl<E: Entity> Default for ListQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}
