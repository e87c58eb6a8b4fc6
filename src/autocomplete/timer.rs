//! Cancellable delayed callbacks.
//!
//! The controller never sleeps itself; it asks a [`Scheduler`] to call back
//! later. Production code uses [`TokioScheduler`]; tests drive a
//! [`ManualScheduler`] by hand so debounce timing is exact.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled callback.
///
/// Cancelling is idempotent. A cancelled callback never runs; one that has
/// already run is unaffected.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Source of delayed, cancellable callbacks.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// [`Scheduler`] backed by `tokio::time`.
///
/// Must be used from inside a Tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::default();
        let token = handle.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        callback();
                    }
                }
            }
        });

        handle
    }
}

struct PendingTimer {
    deadline: Duration,
    order: u64,
    handle: TimerHandle,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_order: u64,
    timers: Vec<PendingTimer>,
}

/// [`Scheduler`] on a virtual clock that only moves when told to.
///
/// Clones share the same clock, so a test can keep one and hand another to
/// the controller.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timers
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .count()
    }

    /// Move the clock forward and run every live callback that came due,
    /// earliest deadline first. Returns how many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            clock.now += by;
            let now = clock.now;

            let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut clock.timers)
                .into_iter()
                .filter(|timer| !timer.handle.is_cancelled())
                .partition(|timer| timer.deadline <= now);
            clock.timers = waiting;

            due.sort_by_key(|timer| (timer.deadline, timer.order));
            due
        };

        // Callbacks run outside the lock so they may schedule again
        let mut fired = 0;
        for timer in due {
            if !timer.handle.is_cancelled() {
                (timer.callback)();
                fired += 1;
            }
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::default();
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let order = clock.next_order;
        clock.next_order += 1;
        let deadline = clock.now + delay;
        clock.timers.push(PendingTimer {
            deadline,
            order,
            handle: handle.clone(),
            callback,
        });
        handle
    }
}
