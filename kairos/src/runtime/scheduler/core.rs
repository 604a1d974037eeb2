use super::timer::{TimerEntry, TimerQueue};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Lifecycle of the timer thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Accepting and delivering timers.
    Running,

    /// Shutdown requested: keep delivering until the queue is empty.
    Draining,

    /// Shutdown requested: drop whatever is still queued.
    Discarding,

    /// The timer thread has exited. New timers are refused.
    Closed,
}

/// State guarded by the scheduler mutex.
pub(crate) struct Inner {
    pub(crate) timers: TimerQueue,
    pub(crate) lifecycle: Lifecycle,

    /// Entries whose waker has been woken.
    pub(crate) delivered: u64,

    /// Entries dropped by a discarding shutdown.
    pub(crate) dropped: usize,

    /// Timers cancelled since the queue was last pruned.
    pub(crate) cancelled: usize,
}

/// State shared between the scheduler thread and every handle.
pub(crate) struct Shared {
    pub(crate) inner: Mutex<Inner>,

    /// Signalled when a timer is added or shutdown is requested.
    pub(crate) condvar: Condvar,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                timers: TimerQueue::new(),
                lifecycle: Lifecycle::Running,
                delivered: 0,
                dropped: 0,
                cancelled: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Records that a queued timer was cancelled and lets the thread prune it.
    pub(crate) fn timer_cancelled(&self) {
        {
            let mut inner = self.inner.lock();

            if inner.lifecycle == Lifecycle::Closed {
                return;
            }

            inner.cancelled += 1;
        }

        self.condvar.notify_one();
    }

    /// Main loop of the scheduler thread.
    ///
    /// The loop performs the following steps:
    /// 1. Prune entries whose sleep was dropped
    /// 2. Deliver every entry whose deadline has passed, one at a time,
    ///    with the lock released while the waker runs
    /// 3. Handle a pending shutdown request
    /// 4. Sleep until the earliest deadline, or until notified
    pub(crate) fn run(&self) {
        debug!("scheduler thread started");

        let mut inner = self.inner.lock();

        loop {
            if inner.cancelled > 0 {
                inner.cancelled = 0;
                let removed = inner.timers.remove_cancelled();

                if !removed.is_empty() {
                    trace!(removed = removed.len(), "cancelled timers pruned");

                    // Releases the wakers, and with them abandoned frames.
                    MutexGuard::unlocked(&mut inner, || drop(removed));
                    continue;
                }
            }

            if inner.lifecycle != Lifecycle::Discarding {
                if let Some(entry) = inner.timers.pop_expired(Instant::now()) {
                    if entry.is_cancelled() {
                        MutexGuard::unlocked(&mut inner, || drop(entry));
                        continue;
                    }

                    inner.delivered += 1;

                    // The resumed frame may schedule again on this scheduler.
                    MutexGuard::unlocked(&mut inner, || deliver(entry));
                    continue;
                }
            }

            match inner.lifecycle {
                Lifecycle::Discarding => {
                    let entries = inner.timers.take_all();
                    let live = entries.iter().filter(|entry| !entry.is_cancelled()).count();

                    inner.dropped += live;
                    inner.lifecycle = Lifecycle::Closed;

                    if live > 0 {
                        warn!(
                            dropped = live,
                            "scheduler shut down with pending timers; their frames will not be resumed"
                        );
                    }

                    // Dropping a waker may release a whole frame.
                    MutexGuard::unlocked(&mut inner, || drop(entries));
                    break;
                }
                Lifecycle::Draining if inner.timers.is_empty() => {
                    inner.lifecycle = Lifecycle::Closed;
                    break;
                }
                Lifecycle::Closed => break,
                Lifecycle::Running | Lifecycle::Draining => {}
            }

            match inner.timers.peek_deadline() {
                Some(deadline) => {
                    self.condvar.wait_until(&mut inner, deadline);
                }
                None => self.condvar.wait(&mut inner),
            }
        }

        debug!(
            delivered = inner.delivered,
            dropped = inner.dropped,
            "scheduler thread stopped"
        );
    }
}

/// Wakes the resumable handle of an expired entry.
///
/// Frame wakers catch panics of their own body. Any other waker that panics
/// is logged and does not take the scheduler thread down.
fn deliver(entry: TimerEntry) {
    let lateness = entry.deadline.elapsed();
    trace!(seq = entry.seq, lateness = ?lateness, "timer expired");

    let waker = entry.waker;

    if panic::catch_unwind(AssertUnwindSafe(move || waker.wake())).is_err() {
        error!(seq = entry.seq, "waker panicked while being resumed by the scheduler");
    }
}
