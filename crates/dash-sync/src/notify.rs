//! User-facing notifications
//!
//! Failures the view should surface (toasts) are broadcast; late subscribers
//! only see what is emitted after they subscribe.

use crate::error::CommitError;
use chrono::{DateTime, Utc};
use dash_record::RecordId;
use tokio::sync::broadcast;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A debounced or flushed write failed and was rolled back
    CommitFailed,
    /// Some records of a bulk action failed
    BulkPartialFailure,
    /// A delete was refused; the record stays in view
    DeleteFailed,
}

/// One notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Category
    pub kind: NotificationKind,
    /// Record concerned; `None` for bulk summaries
    pub record_id: Option<RecordId>,
    /// Underlying error
    pub error: CommitError,
    /// Emission time
    pub at: DateTime<Utc>,
}

impl Notification {
    /// Write failure on one record
    #[must_use]
    pub fn commit_failed(id: RecordId, error: CommitError) -> Self {
        Self::new(NotificationKind::CommitFailed, Some(id), error)
    }

    /// Bulk summary
    #[must_use]
    pub fn bulk_partial_failure(error: CommitError) -> Self {
        Self::new(NotificationKind::BulkPartialFailure, None, error)
    }

    /// Delete failure on one record
    #[must_use]
    pub fn delete_failed(id: RecordId, error: CommitError) -> Self {
        Self::new(NotificationKind::DeleteFailed, Some(id), error)
    }

    fn new(kind: NotificationKind, record_id: Option<RecordId>, error: CommitError) -> Self {
        Self {
            kind,
            record_id,
            error,
            at: Utc::now(),
        }
    }

    /// Text to show the user
    #[must_use]
    pub fn message(&self) -> String {
        match self.record_id {
            Some(id) => format!("{id}: {}", self.error),
            None => self.error.to_string(),
        }
    }
}

/// Broadcast sender wrapper
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create with the given channel capacity (must be non-zero)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast a notification
    ///
    /// Internal errors ([`CommitError::is_user_facing`] false) are dropped.
    /// Having no subscriber is not an error.
    pub fn emit(&self, notification: Notification) {
        if !notification.error.is_user_facing() {
            return;
        }
        tracing::debug!(
            kind = ?notification.kind,
            record = ?notification.record_id,
            error = %notification.error,
            "notification"
        );
        let _ = self.sender.send(notification);
    }

    /// New receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}
