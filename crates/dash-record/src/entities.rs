//! Dashboard entity kinds
//!
//! Pipeline opportunities, quote submissions, ledger expenses and directory
//! contacts, each with its closed field key set.

use crate::entity::{private, Entity, FieldKey, Staged};
use crate::record::RecordError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declare an entity marker and its field key enumeration
macro_rules! entity {
    (
        $(#[$meta:meta])*
        $entity:ident: $kind:literal => $field:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $name:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $entity;

        impl private::Sealed for $entity {}

        impl Entity for $entity {
            type Field = $field;
            const KIND: &'static str = $kind;
        }

        #[doc = concat!("Field keys of [`", stringify!($entity), "`]")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $field {
            $(
                $(#[$vmeta])*
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl FieldKey for $field {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $field {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

entity! {
    /// Sales pipeline opportunity (kanban card)
    Opportunity: "opportunity" => OpportunityField {
        /// Deal name
        Name = "name",
        /// Customer account
        Account = "account",
        /// Pipeline column
        Stage = "stage",
        /// Deal value
        Amount = "amount",
        /// Assigned salesperson
        Owner = "owner",
        /// Expected close date
        CloseDate = "close_date",
        /// Win probability in percent
        Probability = "probability",
    }
}

entity! {
    /// Quote / submission row
    Submission: "submission" => SubmissionField {
        /// Submission title
        Title = "title",
        /// Client name
        Client = "client",
        /// Workflow status column
        Status = "status",
        /// Quoted total
        Total = "total",
        /// Response due date
        DueDate = "due_date",
    }
}

entity! {
    /// Expense ledger row (grid)
    Expense: "expense" => ExpenseField {
        /// Transaction date
        Date = "date",
        /// Paying vendor
        Vendor = "vendor",
        /// Ledger category
        Category = "category",
        /// Amount as entered
        Amount = "amount",
        /// Approval status
        Status = "status",
        /// Free-form notes
        Notes = "notes",
    }
}

entity! {
    /// Directory contact
    Contact: "contact" => ContactField {
        /// Full name
        Name = "name",
        /// Email address
        Email = "email",
        /// Phone number
        Phone = "phone",
        /// Employer
        Company = "company",
    }
}

impl Staged for Opportunity {
    const STAGE_FIELD: OpportunityField = OpportunityField::Stage;
}

impl Staged for Submission {
    const STAGE_FIELD: SubmissionField = SubmissionField::Status;
}

/// Declare a stage-like value enumeration stored as a snake_case string
macro_rules! stage_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every value, in board order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire representation
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = RecordError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| value.as_str() == s)
                    .ok_or_else(|| RecordError::UnknownStage(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::from(value.as_str())
            }
        }
    };
}

stage_enum! {
    /// Pipeline board columns
    PipelineStage {
        /// Initial outreach
        Prospecting = "prospecting",
        /// Fit confirmed
        Qualification = "qualification",
        /// Proposal sent
        Proposal = "proposal",
        /// Terms under discussion
        Negotiation = "negotiation",
        /// Deal won
        ClosedWon = "closed_won",
        /// Deal lost
        ClosedLost = "closed_lost",
    }
}

stage_enum! {
    /// Submission workflow columns
    SubmissionStatus {
        /// Being prepared
        Draft = "draft",
        /// Sent to market
        Submitted = "submitted",
        /// Quote received
        Quoted = "quoted",
        /// Accepted
        Bound = "bound",
        /// Turned down
        Declined = "declined",
    }
}

stage_enum! {
    /// Expense approval states
    ExpenseStatus {
        /// Awaiting approval
        Pending = "pending",
        /// Approved for payment
        Approved = "approved",
        /// Paid back
        Reimbursed = "reimbursed",
        /// Refused
        Rejected = "rejected",
    }
}

impl PipelineStage {
    /// True for terminal columns
    #[inline]
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_parses_from_wire_name() {
        assert_eq!("closed_won".parse::<PipelineStage>().unwrap(), PipelineStage::ClosedWon);
        assert!("won".parse::<PipelineStage>().is_err());
    }

    #[test]
    fn stage_converts_to_string_value() {
        assert_eq!(Value::from(PipelineStage::Proposal), Value::from("proposal"));
    }

    #[test]
    fn field_serde_matches_name() {
        let json = serde_json::to_string(&OpportunityField::CloseDate).unwrap();
        assert_eq!(json, "\"close_date\"");
        assert_eq!(OpportunityField::CloseDate.name(), "close_date");
    }

    #[test]
    fn closed_stages() {
        assert!(PipelineStage::ClosedLost.is_closed());
        assert!(!PipelineStage::Negotiation.is_closed());
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            Opportunity::KIND,
            Submission::KIND,
            Expense::KIND,
            Contact::KIND,
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
