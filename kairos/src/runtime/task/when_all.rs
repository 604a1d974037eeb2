use crate::error::TaskError;
use crate::runtime::task::core::Frame;
use crate::runtime::task::{IntoTask, Task};

use parking_lot::Mutex;
use tracing::{debug, trace};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll, Wake, Waker};

/// No child has failed yet.
const NO_FAILURE: usize = usize::MAX;

/// Waits for every child task and collects their values in argument order.
///
/// The children are started in one burst the first time the returned future
/// is polled: each is queued on the polling thread and runs until its first
/// suspension point as soon as the awaiting frame suspends.
/// The awaiting frame is resumed exactly once, after the last child has
/// completed, on the thread that completed it.
///
/// Results are ordered by the position of the child in `children`, not by
/// completion order. With no children the future is ready immediately.
///
/// # Errors
///
/// A failing child does not stop the others: every child is waited for.
/// Once all of them are accounted for, the combinator fails with the error
/// of the first child that failed (in completion order). Errors of later
/// failing children are dropped.
///
/// # Examples
///
/// ```rust
/// use kairos::Scheduler;
/// use kairos::Task;
/// use kairos::task::when_all;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::start().unwrap();
/// let handle = scheduler.handle();
///
/// let mut task = Task::new(async move {
///     let slow = handle.sleep_for(Duration::from_millis(30));
///     let fast = handle.sleep_for(Duration::from_millis(10));
///
///     when_all([
///         Task::new(async move { slow.await; Ok(1) }),
///         Task::new(async move { fast.await; Ok(2) }),
///     ])
///     .await
/// });
///
/// assert_eq!(task.get_result().unwrap(), vec![1, 2]);
/// ```
pub fn when_all<I>(children: I) -> WhenAll<<I::Item as IntoTask>::Output>
where
    I: IntoIterator,
    I::Item: IntoTask,
    <I::Item as IntoTask>::Output: Send + 'static,
{
    WhenAll {
        children: children.into_iter().map(IntoTask::into_task).collect(),
        shared: None,
    }
}

/// Void form of [`when_all`]: waits for every child and produces nothing.
///
/// Sleeps and tasks can be mixed by converting them with
/// [`IntoTask::into_task`].
pub fn when_all_void<I>(children: I) -> WhenAllVoid
where
    I: IntoIterator,
    I::Item: IntoTask<Output = ()>,
{
    WhenAllVoid {
        inner: when_all(children),
    }
}

/// Future returned by [`when_all`].
#[must_use = "futures do nothing unless awaited"]
pub struct WhenAll<T> {
    /// Owned children. Dropping the combinator abandons the unfinished ones.
    children: Vec<Task<T>>,

    /// Allocated on first poll, shared with every completion waker.
    shared: Option<Arc<Shared<T>>>,
}

/// Future returned by [`when_all_void`].
#[must_use = "futures do nothing unless awaited"]
pub struct WhenAllVoid {
    inner: WhenAll<()>,
}

/// Countdown state shared by the combinator and the completion wakers.
struct Shared<T> {
    /// Children that have not completed yet.
    remaining: AtomicUsize,

    /// Index of the first child that failed, or [`NO_FAILURE`].
    first_failure: AtomicUsize,

    /// Waker of the awaiting frame.
    parent: Mutex<Option<Waker>>,

    /// One slot per child. Each completion writes only its own slot.
    results: Vec<Mutex<Option<Result<T, TaskError>>>>,
}

/// Continuation attached to one child.
struct Completion<T> {
    shared: Arc<Shared<T>>,
    frame: Arc<Frame<T>>,
    index: usize,
    fired: AtomicBool,
}

impl<T> Shared<T> {
    fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            first_failure: AtomicUsize::new(NO_FAILURE),
            parent: Mutex::new(None),
            results: (0..count).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Stores the outcome of child `index` and counts it down.
    ///
    /// The call that brings the countdown to zero resumes the parent.
    fn record(&self, index: usize, result: Result<T, TaskError>) {
        if result.is_err() {
            let _ = self.first_failure.compare_exchange(
                NO_FAILURE,
                index,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        *self.results[index].lock() = Some(result);

        let remaining = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
        trace!(index, remaining, "when_all child completed");

        if remaining == 0 {
            let parent = self.parent.lock().take();

            if let Some(parent) = parent {
                parent.wake();
            }
        }
    }

    /// Assembles the final outcome once the countdown is zero.
    fn collect(&self) -> anyhow::Result<Vec<T>> {
        let failed = self.first_failure.load(Ordering::Acquire);

        let mut values = Vec::with_capacity(self.results.len());
        let mut failure = None;

        for (index, slot) in self.results.iter().enumerate() {
            let result = slot.lock().take();

            match result {
                Some(Ok(value)) => values.push(value),
                Some(Err(err)) if index == failed => failure = Some(err),
                Some(Err(err)) => {
                    debug!(index, error = %err, "when_all dropped the error of a later failing child");
                }
                None => {
                    failure.get_or_insert(TaskError::Consumed);
                }
            }
        }

        match failure {
            Some(err) => Err(err.into_anyhow()),
            None => Ok(values),
        }
    }
}

impl<T: Send + 'static> Wake for Completion<T> {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        match self.frame.try_take_result() {
            Some(result) => self.shared.record(self.index, result),
            // Not finished: this was not the completion signal.
            None => self.fired.store(false, Ordering::Release),
        }
    }
}

impl<T: Send + 'static> WhenAll<T> {
    /// Attaches a completion continuation to every child and starts them.
    fn start_all(&self, shared: &Arc<Shared<T>>) {
        for (index, child) in self.children.iter().enumerate() {
            let Some(frame) = child.frame() else {
                shared.record(index, Err(TaskError::Empty));
                continue;
            };

            let completion = Waker::from(Arc::new(Completion {
                shared: shared.clone(),
                frame: frame.clone(),
                index,
                fired: AtomicBool::new(false),
            }));

            frame.set_continuation(&completion);
            frame.start();

            // A child that had already finished before it was handed to us
            // never resumes its continuation by itself.
            if frame.is_done() {
                if let Some(continuation) = frame.take_continuation() {
                    continuation.wake();
                }
            }
        }
    }
}

impl<T: Send + 'static> Future for WhenAll<T> {
    type Output = anyhow::Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let shared = match &this.shared {
            Some(shared) => shared.clone(),
            None => {
                let shared = Arc::new(Shared::new(this.children.len()));
                this.shared = Some(shared.clone());

                trace!(children = this.children.len(), "when_all starting children");
                this.start_all(&shared);
                shared
            }
        };

        // Registered after the burst: children that completed synchronously
        // are already counted and need no wake-up.
        *shared.parent.lock() = Some(cx.waker().clone());

        if shared.remaining.load(Ordering::Acquire) > 0 {
            return Poll::Pending;
        }

        shared.parent.lock().take();
        Poll::Ready(shared.collect())
    }
}

impl Future for WhenAllVoid {
    type Output = anyhow::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| result.map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;

    use anyhow::{Result, anyhow};

    #[test]
    fn zero_children_complete_on_first_poll() -> Result<()> {
        let mut task = Task::new(async { when_all(Vec::<Task<u8>>::new()).await });

        task.resume()?;

        assert!(task.is_done());
        assert!(task.get_result()?.is_empty());
        Ok(())
    }

    #[test]
    fn synchronous_children_resume_parent_within_one_step() -> Result<()> {
        let mut task = Task::new(async {
            when_all((0..5).map(|i| Task::new(async move { Ok(i * 10) }))).await
        });

        task.resume()?;

        assert!(task.is_done());
        assert_eq!(task.get_result()?, vec![0, 10, 20, 30, 40]);
        Ok(())
    }

    #[test]
    fn already_completed_child_is_counted() -> Result<()> {
        let mut finished = Task::new(async { Ok("early") });
        finished.resume()?;
        assert!(finished.is_done());

        let mut task = Task::new(async move {
            when_all([finished, Task::new(async { Ok("late") })]).await
        });

        assert_eq!(task.get_result()?, vec!["early", "late"]);
        Ok(())
    }

    #[test]
    fn empty_child_fails_the_combinator() {
        let mut task = Task::new(async {
            when_all([Task::new(async { Ok(1) }), Task::default()]).await
        });

        let err = task.get_result().unwrap_err();
        let inner = err.body_error().unwrap().downcast_ref::<TaskError>();

        assert!(matches!(inner, Some(TaskError::Empty)));
    }

    #[test]
    fn failing_children_are_still_counted() {
        let mut task = Task::new(async {
            when_all([
                Task::new(async { Ok(1) }),
                Task::new(async { Err(anyhow!("second failed")) }),
                Task::new(async { Err(anyhow!("third failed")) }),
            ])
            .await
        });

        let err = task.get_result().unwrap_err();

        assert_eq!(err.to_string(), "second failed");
    }

    #[test]
    fn void_mode_produces_unit() -> Result<()> {
        let mut task = Task::new(async {
            when_all_void([Task::new(async { Ok(()) }), Task::new(async { Ok(()) })]).await
        });

        task.get_result()?;
        Ok(())
    }
}
