use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::Waker;

/// A frame that can be run from the local run queue.
pub(crate) trait Runnable {
    /// Starts or resumes the frame, or records a notification if another
    /// thread is already polling it.
    fn run(self: Arc<Self>);
}

/// Work deferred until the frame being polled on this thread returns.
enum Job {
    Frame(Arc<dyn Runnable>),
    Wake(Waker),
}

thread_local! {
    /// Frames started or woken while this thread was already polling one.
    static RUN_QUEUE: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };

    /// Number of nested [`enter`] calls active on this thread.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running frames until dropped.
struct Entered;

impl Entered {
    fn new() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Entered
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

fn is_entered() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

fn push(job: Job) {
    RUN_QUEUE.with(|queue| queue.borrow_mut().push_back(job));
}

fn pop() -> Option<Job> {
    RUN_QUEUE.with(|queue| queue.borrow_mut().pop_front())
}

/// Runs `f` as a frame-running context, then runs every job it queued.
///
/// Frames started or woken from inside `f` are not polled recursively: they
/// wait in the thread-local queue and run one after another here. A chain of
/// N awaiting frames therefore resumes in constant stack depth.
///
/// # Returns
///
/// Returns the result of `f`. Queued jobs have all run by then.
pub(crate) fn enter<R>(f: impl FnOnce() -> R) -> R {
    let _entered = Entered::new();
    let out = f();

    while let Some(job) = pop() {
        match job {
            Job::Frame(frame) => frame.run(),
            Job::Wake(waker) => waker.wake(),
        }
    }

    out
}

/// Runs `frame` now if the thread is idle, or queues it behind the frame
/// being polled.
pub(crate) fn schedule(frame: Arc<dyn Runnable>) {
    if is_entered() {
        push(Job::Frame(frame));
    } else {
        enter(|| frame.run());
    }
}

/// Wakes `waker` once every job already queued on this thread has run.
///
/// Outside a frame-running context the waker is woken immediately.
pub(crate) fn defer_wake(waker: Waker) {
    if is_entered() {
        push(Job::Wake(waker));
    } else {
        waker.wake();
    }
}
