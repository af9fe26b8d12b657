//! Entity and field key traits
//!
//! Every entity kind shown on the dashboard declares a closed set of field
//! keys. Records stay a flat bag of key/value pairs, but the keys are checked
//! at compile time.

use crate::record::RecordError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Sealed trait to prevent external implementations
pub(crate) mod private {
    pub trait Sealed {}
}

/// Field key enumeration for one entity kind
///
/// # Contract
/// - `ALL` lists every key exactly once
/// - `name()` is the wire name and matches the serde representation
pub trait FieldKey:
    Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Every key of the entity
    const ALL: &'static [Self];

    /// Wire name of the key
    fn name(self) -> &'static str;

    /// Resolve a wire name
    #[must_use]
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }
}

/// Entity kind marker
///
/// Implemented by zero-sized markers such as [`crate::Opportunity`]. The trait
/// is sealed so only approved kinds exist.
pub trait Entity: Debug + Clone + PartialEq + Send + Sync + 'static + private::Sealed {
    /// Field keys of this entity
    type Field: FieldKey;

    /// Unique kind identifier (logs, wire formats)
    const KIND: &'static str;
}

/// Entity whose records sit in exactly one stage column at a time
///
/// Drag-and-drop re-staging moves a record between values of `STAGE_FIELD`.
pub trait Staged: Entity {
    /// The field holding the record's current stage
    const STAGE_FIELD: Self::Field;
}

/// Resolve a column name into a typed field key
///
/// # Errors
/// Returns [`RecordError::UnknownField`] if the entity has no such field
pub fn parse_field<E: Entity>(name: &str) -> Result<E::Field, RecordError> {
    E::Field::parse(name).ok_or_else(|| RecordError::UnknownField {
        kind: E::KIND,
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expense, ExpenseField, Opportunity, OpportunityField};

    #[test]
    fn field_names_round_trip_through_parse() {
        for field in OpportunityField::ALL {
            assert_eq!(OpportunityField::parse(field.name()), Some(*field));
        }
    }

    #[test]
    fn parse_field_rejects_unknown_columns() {
        assert_eq!(parse_field::<Expense>("amount").unwrap(), ExpenseField::Amount);

        let err = parse_field::<Opportunity>("colour").unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn staged_field_is_stage() {
        assert_eq!(<Opportunity as Staged>::STAGE_FIELD, OpportunityField::Stage);
    }
}
