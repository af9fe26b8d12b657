//! Drag-to-move gesture and stage transitions
//!
//! A card press becomes a drag once the pointer travels past the drag
//! threshold. A short stationary press is a click (open detail). Dropping on
//! a column yields a stage move; the resulting [`Transition`] resolves once
//! the write settles.

use crate::config::CoordinatorConfig;
use crate::error::{CommitError, TransitionError};
use dash_record::{RecordId, Value};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Gesture / move lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionState {
    /// No gesture, or a move that changed nothing
    Idle,
    /// Pointer travelled past the threshold
    Dragging,
    /// Released over a column
    Dropped,
    /// Optimistic move applied, write in flight
    Committing,
    /// Server accepted the move
    Confirmed,
    /// Write failed; card back in its prior column
    RolledBack,
}

impl TransitionState {
    /// States reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [TransitionState] {
        use TransitionState::{Committing, Confirmed, Dragging, Dropped, Idle, RolledBack};
        match self {
            Idle => &[Dragging],
            Dragging => &[Dropped, Idle],
            Dropped => &[Committing, Idle],
            Committing => &[Confirmed, RolledBack],
            Confirmed | RolledBack => &[],
        }
    }

    /// True once no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Check that `from -> to` is an edge of the gesture state machine
///
/// # Errors
///
/// Returns [`TransitionError::IllegalTransition`] otherwise.
pub fn validate_transition(from: TransitionState, to: TransitionState) -> Result<(), TransitionError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::IllegalTransition { from, to })
    }
}

/// Pointer position in view pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal position
    pub x: f64,
    /// Vertical position
    pub y: f64,
}

impl Point {
    /// Create a point
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    #[inline]
    #[must_use]
    pub fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// How a press ended
#[derive(Debug, Clone, PartialEq)]
pub enum PointerRelease {
    /// Short stationary press: open the detail view
    Click(RecordId),
    /// Drag released over a column
    Drop {
        /// Dragged card
        record_id: RecordId,
        /// Column value under the pointer
        target: Value,
    },
    /// Nothing to do (drag released off-board, long press, stray release)
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    record_id: RecordId,
    origin: Point,
    pressed_at: Instant,
}

/// Pointer gesture classifier for one board
#[derive(Debug, Clone)]
pub struct DragTracker {
    threshold_px: f64,
    click_max: Duration,
    state: TransitionState,
    press: Option<Press>,
}

impl DragTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(threshold_px: f64, click_max: Duration) -> Self {
        Self {
            threshold_px,
            click_max,
            state: TransitionState::Idle,
            press: None,
        }
    }

    /// Create a tracker from coordinator settings
    #[must_use]
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.drag_threshold_px, config.click_max())
    }

    /// Current gesture state
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Card under the active press
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        self.press.map(|press| press.record_id)
    }

    /// Start a press on a card
    ///
    /// A press still active (missed release) is abandoned.
    pub fn pointer_down(&mut self, record_id: RecordId, at: Point, now: Instant) {
        if self.press.is_some() {
            tracing::debug!(record = %record_id, "previous press abandoned");
        }
        self.state = TransitionState::Idle;
        self.press = Some(Press {
            record_id,
            origin: at,
            pressed_at: now,
        });
    }

    /// Track pointer movement
    pub fn pointer_move(&mut self, to: Point) -> TransitionState {
        if let Some(press) = self.press {
            if self.state == TransitionState::Idle
                && press.origin.distance_to(to) > self.threshold_px
                && self.advance(TransitionState::Dragging).is_ok()
            {
                tracing::trace!(record = %press.record_id, "drag started");
            }
        }
        self.state
    }

    /// End the press
    ///
    /// `target` is the column under the pointer, if any.
    pub fn pointer_up(&mut self, at: Point, now: Instant, target: Option<Value>) -> PointerRelease {
        self.pointer_move(at);
        let Some(press) = self.press.take() else {
            return PointerRelease::Cancelled;
        };

        match (self.state, target) {
            (TransitionState::Dragging, Some(target)) => {
                let _ = self.advance(TransitionState::Dropped);
                PointerRelease::Drop {
                    record_id: press.record_id,
                    target,
                }
            }
            (TransitionState::Dragging, None) => {
                let _ = self.advance(TransitionState::Idle);
                PointerRelease::Cancelled
            }
            _ => {
                self.state = TransitionState::Idle;
                if now.saturating_duration_since(press.pressed_at) <= self.click_max {
                    PointerRelease::Click(press.record_id)
                } else {
                    PointerRelease::Cancelled
                }
            }
        }
    }

    /// Abort the gesture (escape key, pointer left the window)
    pub fn cancel(&mut self) {
        self.press = None;
        self.state = TransitionState::Idle;
    }

    fn advance(&mut self, to: TransitionState) -> Result<(), TransitionError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

/// Final state of a move
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// `Idle`, `Confirmed` or `RolledBack`
    pub state: TransitionState,
    /// Failure cause when rolled back
    pub error: Option<CommitError>,
}

impl TransitionOutcome {
    pub(crate) fn confirmed() -> Self {
        Self {
            state: TransitionState::Confirmed,
            error: None,
        }
    }

    pub(crate) fn rolled_back(error: CommitError) -> Self {
        Self {
            state: TransitionState::RolledBack,
            error: Some(error),
        }
    }
}

/// A stage move in progress
#[derive(Debug)]
pub struct Transition {
    record_id: RecordId,
    from: Option<Value>,
    to: Value,
    state: TransitionState,
    settled: Option<oneshot::Receiver<TransitionOutcome>>,
}

impl Transition {
    pub(crate) fn noop(record_id: RecordId, stage: Value) -> Self {
        Self {
            record_id,
            from: Some(stage.clone()),
            to: stage,
            state: TransitionState::Idle,
            settled: None,
        }
    }

    pub(crate) fn committing(
        record_id: RecordId,
        from: Option<Value>,
        to: Value,
        settled: oneshot::Receiver<TransitionOutcome>,
    ) -> Self {
        Self {
            record_id,
            from,
            to,
            state: TransitionState::Committing,
            settled: Some(settled),
        }
    }

    /// Moved card
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Stage before the move
    #[inline]
    #[must_use]
    pub fn from(&self) -> Option<&Value> {
        self.from.as_ref()
    }

    /// Requested stage
    #[inline]
    #[must_use]
    pub fn to(&self) -> &Value {
        &self.to
    }

    /// `Idle` for a same-column drop, `Committing` otherwise
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// True if the drop changed nothing and issued no write
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.state == TransitionState::Idle
    }

    /// Wait for the write to settle
    ///
    /// Resolves immediately for a no-op. If the coordinator shut down before
    /// the write settled, the outcome stays `Committing`.
    pub async fn settled(self) -> TransitionOutcome {
        let Some(receiver) = self.settled else {
            return TransitionOutcome {
                state: self.state,
                error: None,
            };
        };
        receiver.await.unwrap_or(TransitionOutcome {
            state: TransitionState::Committing,
            error: None,
        })
    }
}
