//! Identity-bearing records

use crate::entity::Entity;
use crate::fields::{FieldSnapshot, PartialFields};
use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A record as shown in a dashboard view
///
/// An id plus a flat bag of field values. Field semantics are opaque to the
/// coordinator.
///
/// # Invariants
/// - `id` never changes for the life of the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Record<E: Entity> {
    id: RecordId,
    fields: BTreeMap<E::Field, Value>,
}

impl<E: Entity> Record<E> {
    /// Create record without fields
    #[inline]
    #[must_use]
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Create record from a full field set
    #[must_use]
    pub fn from_fields(id: RecordId, fields: PartialFields<E>) -> Self {
        Self {
            id,
            fields: fields.into_iter().collect(),
        }
    }

    /// Builder-style field set
    #[inline]
    #[must_use]
    pub fn with(mut self, field: E::Field, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Record id
    #[inline]
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Field value
    #[inline]
    #[must_use]
    pub fn get(&self, field: E::Field) -> Option<&Value> {
        self.fields.get(&field)
    }

    /// Set a single field
    #[inline]
    pub fn set(&mut self, field: E::Field, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field, value.into())
    }

    /// Field/value pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (E::Field, &Value)> + '_ {
        self.fields.iter().map(|(field, value)| (*field, value))
    }

    /// Number of populated fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field is populated
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge a partial update into the record
    ///
    /// Fields not yet present are stored verbatim. Returns `true` if any value
    /// changed.
    pub fn apply(&mut self, patch: &PartialFields<E>) -> bool {
        let mut changed = false;
        for (field, value) in patch.iter() {
            if self.fields.get(&field) != Some(value) {
                self.fields.insert(field, value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Restore prior values captured in a snapshot
    ///
    /// A prior value of `None` removes the field. Returns `true` if any value
    /// changed.
    pub fn revert(&mut self, snapshot: &FieldSnapshot<E>) -> bool {
        let mut changed = false;
        for (field, prior) in snapshot.iter() {
            let current = self.fields.get(&field);
            if current == prior {
                continue;
            }
            match prior {
                Some(value) => {
                    self.fields.insert(field, value.clone());
                }
                None => {
                    self.fields.remove(&field);
                }
            }
            changed = true;
        }
        changed
    }

    /// Capture the current values of `fields`
    #[must_use]
    pub fn capture(&self, fields: impl IntoIterator<Item = E::Field>) -> FieldSnapshot<E> {
        let mut snapshot = FieldSnapshot::new();
        for field in fields {
            snapshot.record(field, self.fields.get(&field).cloned());
        }
        snapshot
    }

    /// True if every field of `patch` already holds the patched value
    #[must_use]
    pub fn matches(&self, patch: &PartialFields<E>) -> bool {
        patch
            .iter()
            .all(|(field, value)| self.fields.get(&field) == Some(value))
    }

    /// All fields as a partial map
    #[must_use]
    pub fn to_partial(&self) -> PartialFields<E> {
        self.fields
            .iter()
            .map(|(field, value)| (*field, value.clone()))
            .collect()
    }
}

/// Record model errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Column name not part of the entity's key set
    #[error("unknown {kind} field: {name}")]
    UnknownField {
        /// Entity kind
        kind: &'static str,
        /// Rejected name
        name: String,
    },

    /// Stage/status value not recognised
    #[error("unknown stage: {0}")]
    UnknownStage(String),
}
