use super::id::TaskId;
use super::state::{ABANDONED, COMPLETED, CREATED, IDLE, NOTIFIED, RUNNING, Step, TaskState};
use crate::error::TaskError;
use crate::runtime::context::{self, Runnable};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

/// The suspendable body of a task.
pub(crate) type Body<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// Result slot of a frame.
enum Slot<T> {
    /// The body has not finished yet.
    Pending,
    /// Terminal outcome, waiting to be observed.
    Ready(Result<T, TaskError>),
    /// The outcome was handed out to an observer.
    Taken,
}

/// The execution state of a task, shared between the owning [`Task`] handle
/// and every waker that may resume it.
///
/// A frame is resumed on the thread that wakes it. If that thread is already
/// polling another frame, the wake-up waits in the thread's run queue until
/// the outer poll returns. The `state` word guarantees a single poller at a
/// time; a wake-up that arrives while the body is being polled is recorded
/// as `NOTIFIED` and turned into another poll by the thread already running it.
pub(crate) struct Frame<T> {
    id: TaskId,

    /// Lifecycle state (`CREATED`, `IDLE`, `RUNNING`, ...).
    state: AtomicUsize,

    /// The body future. `None` once it completed or was abandoned.
    body: Mutex<Option<Body<T>>>,

    /// Terminal outcome of the body.
    slot: Mutex<Slot<T>>,

    /// Signalled once when `slot` becomes `Ready`.
    completed: Condvar,

    /// Resumed at most once, when the frame completes.
    continuation: Mutex<Option<Waker>>,
}

impl<T> Frame<T> {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn raw_state(&self) -> usize {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.raw_state() == COMPLETED
    }

    /// Stores `waker` as the continuation of this frame.
    pub(crate) fn set_continuation(&self, waker: &Waker) {
        let mut continuation = self.continuation.lock();

        match continuation.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *continuation = Some(waker.clone()),
        }
    }

    pub(crate) fn take_continuation(&self) -> Option<Waker> {
        self.continuation.lock().take()
    }

    /// Takes the outcome if the body has finished.
    ///
    /// Returns `None` while the frame is still pending and
    /// `Some(Err(TaskError::Consumed))` once the outcome was already taken.
    pub(crate) fn try_take_result(&self) -> Option<Result<T, TaskError>> {
        let mut slot = self.slot.lock();

        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Pending => {
                *slot = Slot::Pending;
                None
            }
            Slot::Ready(result) => Some(result),
            Slot::Taken => Some(Err(TaskError::Consumed)),
        }
    }

    /// Blocks the calling thread until the frame completes, then takes the
    /// outcome.
    fn wait_result(&self) -> Result<T, TaskError> {
        let mut slot = self.slot.lock();

        while matches!(*slot, Slot::Pending) {
            self.completed.wait(&mut slot);
        }

        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => result,
            _ => Err(TaskError::Consumed),
        }
    }

    /// Releases the body of a frame whose owner went away.
    ///
    /// The body is dropped without being polled again. A poll in progress on
    /// another thread finishes first, since it holds the body lock.
    fn abandon(&self) {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state != COMPLETED && state != ABANDONED).then_some(ABANDONED)
            });

        if previous.is_err() {
            return;
        }

        // Dropped outside the lock: the body may own child tasks.
        let body = self.body.lock().take();
        drop(body);

        // Breaks the cycle with continuations that point back at this frame.
        drop(self.take_continuation());

        trace!(task = %self.id, "frame abandoned before completion");
    }
}

impl<T: Send + 'static> Frame<T> {
    fn new(body: Body<T>) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            state: AtomicUsize::new(CREATED),
            body: Mutex::new(Some(body)),
            slot: Mutex::new(Slot::Pending),
            completed: Condvar::new(),
            continuation: Mutex::new(None),
        })
    }

    /// Runs the frame on behalf of an explicit `resume` call.
    ///
    /// Children and continuations woken while the body runs are drained on
    /// this thread before returning, so the reported step reflects them.
    pub(crate) fn resume(self: &Arc<Self>) -> Result<Step, TaskError> {
        loop {
            let current = self.raw_state();

            match current {
                CREATED | IDLE => {
                    if self
                        .state
                        .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        context::enter(|| self.drive());

                        return Ok(if self.is_done() {
                            Step::Completed
                        } else {
                            Step::Suspended
                        });
                    }
                }
                RUNNING => {
                    // Another thread is inside the body; it will poll once more.
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(Step::Suspended);
                    }
                }
                NOTIFIED => return Ok(Step::Suspended),
                COMPLETED => return Err(TaskError::AlreadyCompleted),
                _ => return Err(TaskError::Empty),
            }
        }
    }

    /// Starts a cold frame.
    ///
    /// On an idle thread the body runs now, up to its first suspension
    /// point. Called while another frame is being polled on this thread, the
    /// start is queued until that poll returns. Does nothing if the frame has
    /// already been started.
    pub(crate) fn start(self: &Arc<Self>) {
        if self.raw_state() == CREATED {
            context::schedule(self.clone());
        }
    }

    /// Resumes a suspended frame in response to a wake-up.
    ///
    /// Cold, completed and abandoned frames ignore wake-ups.
    pub(crate) fn notify(self: &Arc<Self>) {
        if matches!(self.raw_state(), IDLE | RUNNING) {
            context::schedule(self.clone());
        }
    }

    /// Polls the body until it suspends or completes.
    ///
    /// The caller must have moved the state to `RUNNING`.
    fn drive(self: &Arc<Self>) {
        let waker = self.waker();
        let mut cx = Context::from_waker(&waker);

        trace!(task = %self.id, "frame resumed");

        loop {
            let outcome = {
                let mut body = self.body.lock();

                let Some(future) = body.as_mut() else {
                    // Released by the owning handle while we were waiting for the lock.
                    return;
                };

                match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
                    Ok(Poll::Pending) => None,
                    Ok(Poll::Ready(output)) => {
                        *body = None;
                        Some(output.map_err(TaskError::Failed))
                    }
                    Err(payload) => {
                        *body = None;
                        Some(Err(TaskError::Panicked(panic_message(payload.as_ref()))))
                    }
                }
            };

            if let Some(result) = outcome {
                self.complete(result);
                return;
            }

            if self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                trace!(task = %self.id, "frame suspended");
                return;
            }

            // Woken while polling: go around again. Anything but NOTIFIED
            // means the frame was abandoned in the meantime.
            if self
                .state
                .compare_exchange(NOTIFIED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
        }
    }

    /// Publishes the outcome, wakes blocked observers, then resumes the
    /// continuation.
    ///
    /// The continuation is queued behind this frame rather than polled from
    /// inside it, so completing a long chain of awaits does not nest.
    fn complete(&self, result: Result<T, TaskError>) {
        match &result {
            Ok(_) => trace!(task = %self.id, "frame completed"),
            Err(err) => trace!(task = %self.id, error = %err, "frame failed"),
        }

        {
            let mut slot = self.slot.lock();
            *slot = Slot::Ready(result);
            self.state.store(COMPLETED, Ordering::Release);
        }

        self.completed.notify_all();

        if let Some(continuation) = self.take_continuation() {
            continuation.wake();
        }
    }
}

impl<T: Send + 'static> Runnable for Frame<T> {
    fn run(self: Arc<Self>) {
        loop {
            let current = self.raw_state();

            match current {
                CREATED | IDLE => {
                    if self
                        .state
                        .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.drive();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// A lazily started, resumable unit of computation.
///
/// A `Task` owns the frame of an async body. Creating it runs nothing: the
/// body executes only when the task is resumed, awaited by another task,
/// started by a combinator, or observed through [`get_result`](Self::get_result).
///
/// Every suspension point inside the body hands control back to whoever
/// resumed the frame. The frame is later resumed by the party it registered
/// with (the scheduler thread for sleeps, a child task for awaits, the
/// countdown of a `when_all`), on that party's thread.
///
/// The handle is move-only. [`take`](Self::take) moves the frame into a new
/// handle and leaves an empty one behind, which refuses every operation with
/// [`TaskError::Empty`]. Dropping a handle whose body has not finished
/// releases the body without running any more of it.
///
/// # Examples
///
/// ```rust
/// use kairos::Task;
///
/// let mut task = Task::new(async { Ok(7 * 2 + 10) });
/// assert!(!task.is_done());
///
/// assert_eq!(task.get_result().unwrap(), 24);
/// ```
pub struct Task<T> {
    frame: Option<Arc<Frame<T>>>,
}

impl<T> Task<T> {
    /// Returns the ID of the owned frame, or `None` for an empty handle.
    pub fn id(&self) -> Option<TaskId> {
        self.frame.as_ref().map(|frame| frame.id())
    }

    /// Returns the current lifecycle state of the task.
    pub fn state(&self) -> TaskState {
        match &self.frame {
            Some(frame) => TaskState::from_raw(frame.raw_state()),
            None => TaskState::Empty,
        }
    }

    /// Returns `true` once the body has reached its terminal point.
    ///
    /// Always `false` for an empty handle.
    pub fn is_done(&self) -> bool {
        self.frame.as_ref().is_some_and(|frame| frame.is_done())
    }

    /// Returns `true` if the handle does not own a frame.
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    /// Moves the frame into a new handle, leaving this one empty.
    ///
    /// This is the explicit form of move-assignment: the returned task is the
    /// sole owner from now on.
    pub fn take(&mut self) -> Task<T> {
        Task {
            frame: self.frame.take(),
        }
    }

    pub(crate) fn frame(&self) -> Option<&Arc<Frame<T>>> {
        self.frame.as_ref()
    }

    fn owned_frame(&self) -> Result<&Arc<Frame<T>>, TaskError> {
        self.frame.as_ref().ok_or(TaskError::Empty)
    }
}

impl<T: Send + 'static> Task<T> {
    /// Creates a cold task from an async body.
    ///
    /// Nothing inside `body` runs until the task is first resumed.
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let frame = Frame::new(Box::pin(body));
        trace!(task = %frame.id(), "frame created");

        Self { frame: Some(frame) }
    }

    /// Runs the body until it suspends or completes.
    ///
    /// If the body is currently running on another thread, the call records
    /// a notification (the running thread polls once more) and returns
    /// [`Step::Suspended`].
    ///
    /// # Errors
    ///
    /// - [`TaskError::AlreadyCompleted`] if the body already finished.
    /// - [`TaskError::Empty`] if the handle does not own a frame.
    pub fn resume(&mut self) -> Result<Step, TaskError> {
        self.owned_frame()?.resume()
    }

    /// Alias of [`resume`](Self::resume).
    pub fn step(&mut self) -> Result<Step, TaskError> {
        self.resume()
    }

    /// Drives the task to completion and returns its outcome.
    ///
    /// A cold task is started on the calling thread. If the body then
    /// suspends on something another thread completes (a timer, a child
    /// running elsewhere), the calling thread blocks until the frame finishes.
    ///
    /// The outcome is consumed: a second call returns
    /// [`TaskError::Consumed`].
    ///
    /// Do not call this from inside a task body that runs on the scheduler
    /// thread while waiting on a timer of that same scheduler; await the task
    /// instead.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Failed`] with the body's own error.
    /// - [`TaskError::Panicked`] if the body panicked.
    /// - [`TaskError::Empty`] / [`TaskError::Consumed`] on misuse.
    pub fn get_result(&mut self) -> Result<T, TaskError> {
        let frame = self.owned_frame()?;

        context::enter(|| frame.start());
        frame.wait_result()
    }
}

impl<T> Default for Task<T> {
    /// Returns an empty handle.
    fn default() -> Self {
        Self { frame: None }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.abandon();
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
