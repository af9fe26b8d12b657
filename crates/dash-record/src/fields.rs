//! Typed partial-update maps
//!
//! [`PartialFields`] carries new values (pending edits, commit payloads,
//! server patches). [`FieldSnapshot`] carries prior values, where an absent
//! field is recorded as `None` so that reverting removes it again.

use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Partial mapping of field key to new value
///
/// Setting a field that is already present overwrites it (last write wins).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct PartialFields<E: Entity> {
    values: BTreeMap<E::Field, Value>,
}

impl<E: Entity> PartialFields<E> {
    /// Create empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Builder-style set
    #[inline]
    #[must_use]
    pub fn with(mut self, field: E::Field, value: impl Into<Value>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    /// Set a field, returning the value it replaced
    #[inline]
    pub fn set(&mut self, field: E::Field, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(field, value.into())
    }

    /// Value for a field
    #[inline]
    #[must_use]
    pub fn get(&self, field: E::Field) -> Option<&Value> {
        self.values.get(&field)
    }

    /// Remove a field
    #[inline]
    pub fn remove(&mut self, field: E::Field) -> Option<Value> {
        self.values.remove(&field)
    }

    /// Check whether a field is present
    #[inline]
    #[must_use]
    pub fn contains(&self, field: E::Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Overwrite with every field of `other`
    pub fn merge(&mut self, other: &Self) {
        for (field, value) in &other.values {
            self.values.insert(*field, value.clone());
        }
    }

    /// Keys present, in key order
    pub fn fields(&self) -> impl Iterator<Item = E::Field> + '_ {
        self.values.keys().copied()
    }

    /// Key/value pairs, in key order
    pub fn iter(&self) -> impl Iterator<Item = (E::Field, &Value)> + '_ {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no field is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<E: Entity> Default for PartialFields<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for PartialFields<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<E: Entity, V: Into<Value>> FromIterator<(E::Field, V)> for PartialFields<E> {
    fn from_iter<I: IntoIterator<Item = (E::Field, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(field, value)| (field, value.into()))
                .collect(),
        }
    }
}

impl<E: Entity> IntoIterator for PartialFields<E> {
    type Item = (E::Field, Value);
    type IntoIter = std::collections::btree_map::IntoIter<E::Field, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Prior values of a set of fields
///
/// `None` records that the field was absent before the change.
#[derive(Clone, PartialEq)]
pub struct FieldSnapshot<E: Entity> {
    values: BTreeMap<E::Field, Option<Value>>,
}

impl<E: Entity> FieldSnapshot<E> {
    /// Create empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Record (or overwrite) the prior value of a field
    #[inline]
    pub fn record(&mut self, field: E::Field, prior: Option<Value>) {
        self.values.insert(field, prior);
    }

    /// Record the prior value only if the field is not tracked yet
    ///
    /// Returns `true` if the value was recorded.
    pub fn record_if_absent(&mut self, field: E::Field, prior: Option<Value>) -> bool {
        if self.values.contains_key(&field) {
            return false;
        }
        self.values.insert(field, prior);
        true
    }

    /// Prior value of a field (`Some(None)` = field was absent)
    #[inline]
    #[must_use]
    pub fn get(&self, field: E::Field) -> Option<&Option<Value>> {
        self.values.get(&field)
    }

    /// Check whether a field is tracked
    #[inline]
    #[must_use]
    pub fn contains(&self, field: E::Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Stop tracking a field
    #[inline]
    pub fn remove(&mut self, field: E::Field) -> Option<Option<Value>> {
        self.values.remove(&field)
    }

    /// Copy of the tracked subset of `fields`
    #[must_use]
    pub fn restrict(&self, fields: impl IntoIterator<Item = E::Field>) -> Self {
        let values = fields
            .into_iter()
            .filter_map(|field| self.values.get(&field).map(|prior| (field, prior.clone())))
            .collect();
        Self { values }
    }

    /// Drop every field for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(E::Field) -> bool) {
        self.values.retain(|field, _| keep(*field));
    }

    /// Tracked keys
    pub fn fields(&self) -> impl Iterator<Item = E::Field> + '_ {
        self.values.keys().copied()
    }

    /// Tracked key/prior-value pairs
    pub fn iter(&self) -> impl Iterator<Item = (E::Field, Option<&Value>)> + '_ {
        self.values
            .iter()
            .map(|(field, prior)| (*field, prior.as_ref()))
    }

    /// Number of tracked fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<E: Entity> Default for FieldSnapshot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for FieldSnapshot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expense, ExpenseField};
    use proptest::prelude::*;

    #[test]
    fn set_overwrites_previous_value() {
        let mut fields = PartialFields::<Expense>::new();
        assert!(fields.set(ExpenseField::Amount, "100").is_none());
        assert_eq!(fields.set(ExpenseField::Amount, "150"), Some(Value::from("100")));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(ExpenseField::Amount), Some(&Value::from("150")));
    }

    #[test]
    fn merge_keeps_union_with_newer_values() {
        let mut base = PartialFields::<Expense>::new()
            .with(ExpenseField::Amount, "100")
            .with(ExpenseField::Vendor, "Acme");
        let newer = PartialFields::<Expense>::new()
            .with(ExpenseField::Amount, "155")
            .with(ExpenseField::Notes, "taxi");

        base.merge(&newer);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get(ExpenseField::Amount), Some(&Value::from("155")));
        assert_eq!(base.get(ExpenseField::Vendor), Some(&Value::from("Acme")));
    }

    #[test]
    fn snapshot_record_if_absent_keeps_first_value() {
        let mut snapshot = FieldSnapshot::<Expense>::new();
        assert!(snapshot.record_if_absent(ExpenseField::Amount, Some(Value::from("100"))));
        assert!(!snapshot.record_if_absent(ExpenseField::Amount, Some(Value::from("150"))));
        assert_eq!(
            snapshot.get(ExpenseField::Amount),
            Some(&Some(Value::from("100")))
        );
    }

    #[test]
    fn snapshot_restrict_ignores_untracked_fields() {
        let mut snapshot = FieldSnapshot::<Expense>::new();
        snapshot.record(ExpenseField::Amount, Some(Value::from("100")));
        snapshot.record(ExpenseField::Notes, None);

        let subset = snapshot.restrict([ExpenseField::Notes, ExpenseField::Vendor]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.get(ExpenseField::Notes), Some(&None));
    }

    fn expense_field() -> impl Strategy<Value = ExpenseField> {
        proptest::sample::select(<ExpenseField as crate::FieldKey>::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_merge_is_last_write_wins(
            edits in proptest::collection::vec((expense_field(), 0u32..1000), 1..40)
        ) {
            let mut fields = PartialFields::<Expense>::new();
            for (field, value) in &edits {
                fields.set(*field, *value);
            }

            for field in fields.fields() {
                let expected = edits
                    .iter()
                    .rev()
                    .find(|(f, _)| *f == field)
                    .map(|(_, v)| Value::from(*v));
                prop_assert_eq!(fields.get(field), expected.as_ref());
            }
            let distinct: std::collections::BTreeSet<_> = edits.iter().map(|(f, _)| *f).collect();
            prop_assert_eq!(fields.len(), distinct.len());
        }
    }
}
