//! Timer scheduler.
//!
//! A single background thread owns a min-heap of `(wake time, waker)` entries
//! and wakes each waker once its deadline has passed. Waking a task frame
//! resumes it inline, so task bodies continue on the scheduler thread after a
//! sleep.
//!
//! The scheduler is an explicit value: [`Scheduler`] owns the thread and
//! [`Handle`] is the cheap, cloneable reference that sleeps and task bodies
//! hold. There is no process-wide instance.

mod core;
mod timer;

use self::core::{Lifecycle, Shared};
use crate::error::SchedulerError;
use crate::runtime::builder::SchedulerBuilder;
use crate::time::Sleep;

use tracing::{debug, error, trace};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::task::Waker;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What happens to queued timers when the scheduler shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Keep delivering until the queue is empty, including timers scheduled
    /// by frames resumed during the drain.
    #[default]
    Drain,

    /// Drop every pending timer immediately. The frames waiting on them are
    /// never resumed; the number of dropped entries is reported and logged.
    Discard,
}

/// Outcome of a scheduler shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Timers delivered over the whole lifetime of the scheduler.
    pub delivered: u64,

    /// Timers dropped without being delivered.
    pub dropped: usize,
}

/// A running timer scheduler.
///
/// Owns the background thread. Dropping the scheduler shuts it down with its
/// configured [`ShutdownPolicy`] and waits for the thread to exit.
///
/// # Examples
///
/// ```rust
/// use kairos::{Scheduler, Task};
/// use std::time::Duration;
///
/// let scheduler = Scheduler::start().unwrap();
/// let handle = scheduler.handle();
///
/// let mut task = Task::new(async move {
///     handle.sleep_for(Duration::from_millis(5)).await;
///     Ok("awake")
/// });
///
/// assert_eq!(task.get_result().unwrap(), "awake");
///
/// let report = scheduler.shutdown();
/// assert_eq!(report.delivered, 1);
/// ```
pub struct Scheduler {
    handle: Handle,
    policy: ShutdownPolicy,
    thread: Option<JoinHandle<()>>,
}

/// A cloneable reference to a [`Scheduler`].
///
/// Handles stay valid after the scheduler shut down; scheduling through them
/// then fails with [`SchedulerError::ShutDown`].
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Starts a scheduler with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the thread cannot be created.
    pub fn start() -> Result<Self, SchedulerError> {
        SchedulerBuilder::new().build()
    }

    /// Returns a builder to configure a scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn spawn(thread_name: String, policy: ShutdownPolicy) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared::new());
        let worker = shared.clone();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker.run())?;

        debug!(thread = %thread_name, policy = ?policy, "scheduler started");

        Ok(Self {
            handle: Handle { shared },
            policy,
            thread: Some(thread),
        })
    }

    /// Returns a handle to this scheduler.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Returns the policy applied on shutdown.
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// Shuts the scheduler down and waits for its thread to exit.
    ///
    /// With [`ShutdownPolicy::Drain`] this returns once every queued timer,
    /// including those scheduled during the drain, has been delivered.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.stop()
    }

    fn stop(&mut self) -> ShutdownReport {
        let shared = &self.handle.shared;

        {
            let mut inner = shared.inner.lock();

            if inner.lifecycle == Lifecycle::Running {
                inner.lifecycle = match self.policy {
                    ShutdownPolicy::Drain => Lifecycle::Draining,
                    ShutdownPolicy::Discard => Lifecycle::Discarding,
                };

                debug!(pending = inner.timers.len(), policy = ?self.policy, "scheduler shutdown requested");
            }
        }

        shared.condvar.notify_all();

        if let Some(thread) = self.thread.take() {
            // Dropped from a frame resumed by the scheduler itself: the thread
            // exits on its own once the current delivery returns.
            if thread.thread().id() == thread::current().id() {
                trace!("scheduler dropped on its own thread, not joining");
            } else if thread.join().is_err() {
                error!("scheduler thread panicked");
            }
        }

        let inner = shared.inner.lock();

        ShutdownReport {
            delivered: inner.delivered,
            dropped: inner.dropped,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Handle {
    /// Queues `waker` to be woken once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutDown`] if the scheduler thread has exited.
    pub fn schedule_after(&self, waker: Waker, delay: Duration) -> Result<(), SchedulerError> {
        self.schedule_at(waker, Instant::now() + delay)
    }

    /// Queues `waker` to be woken at `deadline`.
    ///
    /// A deadline in the past is delivered as soon as the scheduler thread
    /// gets to it. Entries with equal deadlines are delivered in the order
    /// they were scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutDown`] if the scheduler thread has exited.
    pub fn schedule_at(&self, waker: Waker, deadline: Instant) -> Result<(), SchedulerError> {
        self.register(waker, deadline, Arc::new(AtomicBool::new(false)))
    }

    /// Queues a timer that is skipped if `cancelled` is set before it fires.
    ///
    /// The owner of the flag calls [`cancel`](Self::cancel) after setting it.
    pub(crate) fn register(
        &self,
        waker: Waker,
        deadline: Instant,
        cancelled: Arc<AtomicBool>,
    ) -> Result<(), SchedulerError> {
        {
            let mut inner = self.shared.inner.lock();

            if inner.lifecycle == Lifecycle::Closed {
                return Err(SchedulerError::ShutDown);
            }

            inner.timers.push(deadline, waker, cancelled);
            trace!(pending = inner.timers.len(), "timer scheduled");
        }

        self.shared.condvar.notify_one();
        Ok(())
    }

    /// Tells the scheduler thread that a registered timer was cancelled.
    pub(crate) fn cancel(&self) {
        self.shared.timer_cancelled();
    }

    /// Returns a future that completes once `duration` has elapsed.
    ///
    /// See [`Sleep`] for the exact semantics.
    pub fn sleep_for(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), duration)
    }

    /// Returns the number of timers waiting to be delivered.
    ///
    /// Cancelled timers count until the scheduler thread has pruned them.
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().timers.len()
    }

    /// Returns `true` once the scheduler thread has exited.
    pub fn is_shut_down(&self) -> bool {
        self.shared.inner.lock().lifecycle == Lifecycle::Closed
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();

        f.debug_struct("Handle")
            .field("lifecycle", &inner.lifecycle)
            .field("pending", &inner.timers.len())
            .finish()
    }
}
