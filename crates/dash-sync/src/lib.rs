//! Optimistic mutation coordinator
//!
//! Makes edits on dashboard records feel instantaneous while keeping the
//! view consistent with the data service.
//!
//! # Core Concepts
//!
//! - [`Coordinator`]: facade the view calls (`edit_cell`, `move_record`,
//!   `bulk_update`, `is_dirty`, notifications)
//! - [`DebounceScheduler`]: per-record quiet-period timers coalescing bursts
//!   of cell edits into one write
//! - [`BatchCommitter`]: drains pending edits into tickets, dispatches them,
//!   and settles responses against the record's local version
//! - [`RollbackManager`]: last server-confirmed values of unconfirmed fields
//! - [`DragTracker`] / [`Transition`]: click versus drag classification and
//!   the lifecycle of one stage move
//! - [`DataService`]: the backend boundary
//!
//! # Example
//!
//! ```rust,ignore
//! use dash_sync::{Coordinator, CoordinatorConfig};
//! use dash_record::{ExpenseField, RecordId};
//!
//! let coordinator = Coordinator::new(service, CoordinatorConfig::default())?;
//! coordinator.load(&Default::default()).await?;
//!
//! coordinator.edit_cell(RecordId::new(7), ExpenseField::Amount, "150")?;
//! coordinator.edit_cell(RecordId::new(7), ExpenseField::Amount, "155")?;
//! assert!(coordinator.is_dirty(RecordId::new(7)));
//! // one write carrying amount = "155" goes out after the quiet period
//! ```

#![warn(unreachable_pub)]

mod committer;
mod config;
mod coordinator;
mod debounce;
mod error;
mod notify;
mod rollback;
mod service;
mod stats;
mod ticket;
mod transition;

pub use committer::{BatchCommitter, BulkOutcome, CommitOutcome, Settlement};
pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{Coordinator, GestureOutcome};
pub use debounce::DebounceScheduler;
pub use error::{CommitError, CoordinatorError, ServiceError, TransitionError};
pub use notify::{Notification, NotificationKind, Notifier};
pub use rollback::RollbackManager;
pub use service::DataService;
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use ticket::{CommitTicket, TicketId, VersionClock};
pub use transition::{
    validate_transition, DragTracker, Point, PointerRelease, Transition, TransitionOutcome,
    TransitionState,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
