//! Dashboard record model
//!
//! Identity-bearing records whose fields are addressed by a closed,
//! per-entity set of keys.
//!
//! # Core Concepts
//!
//! - [`RecordId`]: Stable identity, unchanged across reloads
//! - [`Entity`]: Marker trait naming an entity kind and its field keys
//! - [`FieldKey`]: Compile-time enumeration of an entity's fields
//! - [`Record<E>`]: Full record as returned by the data service
//! - [`PartialFields<E>`]: Typed partial-update map (pending edits, payloads)
//! - [`FieldSnapshot<E>`]: Prior field values captured for rollback
//!
//! # Example
//!
//! ```rust,ignore
//! use dash_record::{Opportunity, OpportunityField, PartialFields, PipelineStage, Record, RecordId};
//!
//! let mut record = Record::<Opportunity>::new(RecordId::new(42))
//!     .with(OpportunityField::Stage, PipelineStage::Qualification);
//!
//! let patch = PartialFields::<Opportunity>::new()
//!     .with(OpportunityField::Stage, PipelineStage::Proposal);
//! record.apply(&patch);
//! ```

#![warn(unreachable_pub)]

mod entities;
mod entity;
mod fields;
mod id;
mod query;
mod record;

pub use entities::{
    Contact, ContactField, Expense, ExpenseField, ExpenseStatus, Opportunity, OpportunityField,
    PipelineStage, Submission, SubmissionField, SubmissionStatus,
};
pub use entity::{parse_field, Entity, FieldKey, Staged};
pub use fields::{FieldSnapshot, PartialFields};
pub use id::RecordId;
pub use query::ListQuery;
pub use record::{Record, RecordError};

/// Field values are untyped JSON values; the coordinator never interprets them.
pub use serde_json::Value;

/// Sealed trait support - for implementing custom entity types.
/// **Note:** This is only for internal/testing use and may change.
#[doc(hidden)]
pub mod __private {
    pub use super::entity::private::Sealed;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
