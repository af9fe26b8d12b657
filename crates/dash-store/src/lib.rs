//! Dashboard view state
//!
//! - [`RecordStore`]: canonical in-memory record set of one view, the single
//!   source of truth the view renders
//! - [`PendingEditBuffer`]: per-record deltas not yet confirmed by the server
//!
//! Neither type performs I/O. Both are safe to share across tasks; no lock is
//! held while subscriber callbacks run.

#![warn(unreachable_pub)]

mod buffer;
mod store;

pub use buffer::PendingEditBuffer;
pub use store::{RecordStore, StoreChange, SubscriptionId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
