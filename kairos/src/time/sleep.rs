use crate::runtime::scheduler::Handle;
use crate::task::{IntoTask, Task};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after `duration` on `scheduler`.
///
/// Equivalent to [`Handle::sleep_for`].
///
/// # Examples
///
/// ```rust
/// use kairos::{Scheduler, Task};
/// use kairos::time::sleep_for;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::start().unwrap();
/// let handle = scheduler.handle();
///
/// let mut task = Task::new(async move {
///     sleep_for(&handle, Duration::from_millis(10)).await;
///     Ok(())
/// });
///
/// task.get_result().unwrap();
/// ```
pub fn sleep_for(scheduler: &Handle, duration: Duration) -> Sleep {
    scheduler.sleep_for(duration)
}

/// Returns a task that sleeps for `ms` milliseconds.
pub fn sleep_ms(scheduler: &Handle, ms: u64) -> Task<()> {
    scheduler.sleep_for(Duration::from_millis(ms)).into_task()
}

/// Returns a task that sleeps for `secs` seconds.
pub fn sleep(scheduler: &Handle, secs: u64) -> Task<()> {
    scheduler.sleep_for(Duration::from_secs(secs)).into_task()
}

/// A future that completes once a duration has elapsed.
///
/// The deadline is fixed when the future is first polled, as `now +
/// duration`, and the waker of that poll is registered once with the
/// scheduler. The scheduler thread wakes it at the deadline, so the awaiting
/// frame continues on the scheduler thread.
///
/// A zero duration completes on the first poll and never touches the
/// scheduler. Dropping a pending `Sleep` cancels its timer: the scheduler
/// discards the entry without waking it, and does not wait for it on
/// shutdown.
///
/// # Panics
///
/// Polling a `Sleep` whose scheduler has already shut down panics: the
/// awaiting frame could never be resumed. Inside a task body the panic is
/// captured and surfaces as [`TaskError::Panicked`](crate::TaskError::Panicked).
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    scheduler: Handle,
    duration: Duration,

    /// Set on first poll.
    deadline: Option<Instant>,

    /// Cancellation flag shared with the queued timer, while there is one.
    timer: Option<Arc<AtomicBool>>,
}

impl Sleep {
    pub(crate) fn new(scheduler: Handle, duration: Duration) -> Self {
        Self {
            scheduler,
            duration,
            deadline: None,
            timer: None,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.duration.is_zero() {
            return Poll::Ready(());
        }

        let deadline = *this
            .deadline
            .get_or_insert_with(|| Instant::now() + this.duration);

        if Instant::now() >= deadline {
            this.timer = None;
            return Poll::Ready(());
        }

        // Registered once; an early poll comes from someone else and keeps waiting.
        if this.timer.is_none() {
            let cancelled = Arc::new(AtomicBool::new(false));

            if let Err(err) = this
                .scheduler
                .register(cx.waker().clone(), deadline, cancelled.clone())
            {
                panic!("sleep could not be registered: {err}");
            }

            this.timer = Some(cancelled);
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    /// Cancels the timer if the sleep is dropped before completion.
    fn drop(&mut self) {
        if let Some(cancelled) = self.timer.take() {
            cancelled.store(true, Ordering::Release);
            self.scheduler.cancel();
        }
    }
}

impl IntoTask for Sleep {
    type Output = ();

    fn into_task(self) -> Task<()> {
        Task::new(async move {
            self.await;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Sleep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sleep")
            .field("duration", &self.duration)
            .field("deadline", &self.deadline)
            .field("queued", &self.timer.is_some())
            .finish()
    }
}
