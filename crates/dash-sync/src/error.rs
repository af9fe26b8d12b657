//! Error types for the mutation coordinator
//!
//! Provides error handling for:
//! - Data service call failures
//! - Commit failures (rejected, transient, stale, partial bulk)
//! - Coordinator entry points
//! - Drag gesture state machine violations

use crate::config::ConfigError;
use crate::ticket::TicketId;
use crate::transition::TransitionState;
use dash_record::{RecordError, RecordId};

/// Errors reported by a [`crate::DataService`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Payload shape or business rule refused
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Request did not complete (connectivity, 5xx)
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Transport-level timeout
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed time before giving up
        after_ms: u64,
    },

    /// Record does not exist server-side
    #[error("record not found: {0}")]
    NotFound(RecordId),
}

/// Commit failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    /// Server refused the write; message is shown to the user verbatim
    #[error("{message}")]
    ValidationRejected {
        /// Server message
        message: String,
    },

    /// Write did not complete; the change did not persist
    #[error("change was not saved: {message}")]
    TransientNetworkFailure {
        /// Failure detail
        message: String,
    },

    /// Response arrived after a newer local edit superseded it
    #[error("response for ticket {ticket} superseded by local version {current}")]
    StaleOverwrite {
        /// Ticket whose response was discarded
        ticket: TicketId,
        /// Record version at arrival
        current: u64,
    },

    /// Some records of a bulk action failed
    #[error("{} of {} records failed", .failed.len(), .failed.len() + .succeeded)]
    PartialBulkFailure {
        /// Records rolled back
        failed: Vec<RecordId>,
        /// Number of records confirmed
        succeeded: usize,
    },

    /// Record left the view before its write could be sent
    #[error("record {0} is no longer in view")]
    RecordMissing(RecordId),
}

impl CommitError {
    /// Check if the error should reach the notification channel
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::StaleOverwrite { .. })
    }

    /// Check if re-triggering the same edit could succeed
    ///
    /// The coordinator never retries on its own; this only informs the view.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetworkFailure { .. })
    }
}

impl From<ServiceError> for CommitError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Rejected(message) => Self::ValidationRejected { message },
            ServiceError::NotFound(id) => Self::ValidationRejected {
                message: format!("record {id} no longer exists"),
            },
            ServiceError::Unavailable(message) => Self::TransientNetworkFailure { message },
            timeout @ ServiceError::Timeout { .. } => Self::TransientNetworkFailure {
                message: timeout.to_string(),
            },
        }
    }
}

/// Errors returned by [`crate::Coordinator`] entry points
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Record is not in the view
    #[error("record not in view: {0}")]
    RecordNotFound(RecordId),

    /// Data service call failed (load, refresh, create)
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Commit failed
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),

    /// Column name or stage value not recognised
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Drag gesture state machine violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Edge not part of the gesture state machine
    #[error("illegal transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: TransitionState,
        /// Requested state
        to: TransitionState,
    },
}
