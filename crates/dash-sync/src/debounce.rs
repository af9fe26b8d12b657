//! Per-record debounce timers
//!
//! Each record owns at most one timer. Re-scheduling restarts the quiet
//! period; only the last timer of a burst fires.

use dash_record::RecordId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type ExpiryCallback = Arc<dyn Fn(RecordId) + Send + Sync>;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Debounce scheduler
///
/// Timers run as tasks on the runtime captured at construction. The expiry
/// callback runs on the timer task, so it may spawn further work.
///
/// # Invariants
/// - At most one live timer per record
/// - A superseded or cancelled timer never invokes the callback, even if it
///   already woke up
pub struct DebounceScheduler {
    delay: Duration,
    timers: Arc<Mutex<HashMap<RecordId, Timer>>>,
    next_generation: AtomicU64,
    on_expire: ExpiryCallback,
    runtime: Handle,
}

impl DebounceScheduler {
    /// Create a scheduler on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, on_expire: impl Fn(RecordId) + Send + Sync + 'static) -> Self {
        Self::with_handle(Handle::current(), delay, on_expire)
    }

    /// Create a scheduler on an explicit runtime
    #[must_use]
    pub fn with_handle(
        runtime: Handle,
        delay: Duration,
        on_expire: impl Fn(RecordId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            delay,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            on_expire: Arc::new(on_expire),
            runtime,
        }
    }

    /// Start or restart the quiet period of a record
    pub fn schedule(&self, id: RecordId) {
        self.schedule_after(id, self.delay);
    }

    /// Start or restart a timer with a custom delay
    pub fn schedule_after(&self, id: RecordId, delay: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        let timers = Arc::clone(&self.timers);
        let on_expire = Arc::clone(&self.on_expire);

        let mut guard = self.timers.lock();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let current = {
                let mut guard = timers.lock();
                match guard.get(&id) {
                    Some(timer) if timer.generation == generation => {
                        guard.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                tracing::trace!(record = %id, "debounce expired");
                on_expire(id);
            }
        });

        if let Some(previous) = guard.insert(id, Timer { generation, handle }) {
            previous.handle.abort();
            tracing::trace!(record = %id, "debounce restarted");
        }
    }

    /// Cancel a record's timer
    ///
    /// Returns `true` if a timer was pending.
    pub fn cancel(&self, id: RecordId) -> bool {
        match self.timers.lock().remove(&id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer, returning how many were pending
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Timer> = self.timers.lock().drain().map(|(_, timer)| timer).collect();
        for timer in &drained {
            timer.handle.abort();
        }
        drained.len()
    }

    /// True if the record has a live timer
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: RecordId) -> bool {
        self.timers.lock().contains_key(&id)
    }

    /// Number of live timers
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Default quiet period
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("delay", &self.delay)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
