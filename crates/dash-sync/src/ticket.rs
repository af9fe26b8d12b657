//! Commit tickets and per-record version clock

use chrono::{DateTime, Utc};
use dash_record::{Entity, PartialFields, RecordId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one dispatched write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(u64);

impl TicketId {
    /// Wrap a raw ticket number
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw ticket number
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// One write in flight
///
/// `version` is the record's local version when the payload was drained;
/// the response is only allowed to touch the store if no local edit bumped
/// the version since.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitTicket<E: Entity> {
    id: TicketId,
    record_id: RecordId,
    payload: PartialFields<E>,
    version: u64,
    issued_at: DateTime<Utc>,
}

impl<E: Entity> CommitTicket<E> {
    /// Create a ticket stamped now
    #[must_use]
    pub fn new(id: TicketId, record_id: RecordId, payload: PartialFields<E>, version: u64) -> Self {
        Self {
            id,
            record_id,
            payload,
            version,
            issued_at: Utc::now(),
        }
    }

    /// Ticket id
    #[inline]
    #[must_use]
    pub fn id(&self) -> TicketId {
        self.id
    }

    /// Target record
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Fields sent
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &PartialFields<E> {
        &self.payload
    }

    /// Local version at dispatch
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Dispatch time
    #[inline]
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Monotonic per-record version counter
///
/// Bumped on every local mutation. Unknown records are at version 0.
#[derive(Debug, Default)]
pub struct VersionClock {
    versions: DashMap<RecordId, u64>,
}

impl VersionClock {
    /// Create empty clock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance a record's version, returning the new value
    pub fn bump(&self, id: RecordId) -> u64 {
        let mut version = self.versions.entry(id).or_insert(0);
        *version += 1;
        *version
    }

    /// Current version of a record
    #[inline]
    #[must_use]
    pub fn current(&self, id: RecordId) -> u64 {
        self.versions.get(&id).map_or(0, |version| *version)
    }

    /// Invalidate every ticket issued for a record so far
    ///
    /// The counter is advanced rather than dropped, so a record that leaves
    /// the view and comes back never reuses a version an old ticket carries.
    pub fn retire(&self, id: RecordId) -> u64 {
        self.bump(id)
    }
}
