//! Coordinator counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the coordinator and its committer
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    edits: AtomicU64,
    moves: AtomicU64,
    writes_issued: AtomicU64,
    writes_confirmed: AtomicU64,
    writes_failed: AtomicU64,
    stale_responses: AtomicU64,
    deletes: AtomicU64,
}

macro_rules! counter {
    ($($(#[$meta:meta])* $method:ident => $field:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )+
    };
}

impl CoordinatorStats {
    /// Create zeroed counters
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        /// Count a cell edit
        record_edit => edits,
        /// Count a stage move (no-ops excluded)
        record_move => moves,
        /// Count a dispatched write
        record_write => writes_issued,
        /// Count a confirmed write
        record_confirmed => writes_confirmed,
        /// Count a failed write
        record_failure => writes_failed,
        /// Count a discarded out-of-date response
        record_stale => stale_responses,
        /// Count a confirmed delete
        record_delete => deletes,
    }

    /// Point-in-time copy
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            edits: self.edits.load(Ordering::Relaxed),
            moves: self.moves.load(Ordering::Relaxed),
            writes_issued: self.writes_issued.load(Ordering::Relaxed),
            writes_confirmed: self.writes_confirmed.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Cell edits accepted
    pub edits: u64,
    /// Stage moves accepted
    pub moves: u64,
    /// Writes dispatched
    pub writes_issued: u64,
    /// Writes confirmed
    pub writes_confirmed: u64,
    /// Writes failed and rolled back
    pub writes_failed: u64,
    /// Responses discarded as stale
    pub stale_responses: u64,
    /// Records deleted
    pub deletes: u64,
}

impl StatsSnapshot {
    /// Local mutations per dispatched write
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coalescing_ratio(&self) -> f64 {
        if self.writes_issued == 0 {
            return 0.0;
        }
        (self.edits + self.moves) as f64 / self.writes_issued as f64
    }
}
