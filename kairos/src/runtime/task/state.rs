/// Frame allocated, body not yet polled.
pub(crate) const CREATED: usize = 0;

/// Body returned `Poll::Pending` and waits for a wake-up.
pub(crate) const IDLE: usize = 1;

/// Body is being polled.
///
/// At most one thread observes this state at a time.
pub(crate) const RUNNING: usize = 2;

/// Woken while running.
///
/// The thread that is polling the body polls it again before leaving
/// the frame, instead of suspending it.
pub(crate) const NOTIFIED: usize = 3;

/// Body produced its outcome. Terminal.
pub(crate) const COMPLETED: usize = 4;

/// The owning handle was dropped before completion and the body has been
/// (or is being) released. Terminal.
pub(crate) const ABANDONED: usize = 5;

/// Observable lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Cold: no body code has run yet.
    Created,
    /// Currently executing on some thread.
    Running,
    /// Waiting at a suspension point (timer, child task, combinator).
    Suspended,
    /// Terminal: the result slot holds a value or an error.
    Completed,
    /// The handle does not own a frame.
    Empty,
}

impl TaskState {
    pub(crate) fn from_raw(raw: usize) -> Self {
        match raw {
            CREATED => TaskState::Created,
            IDLE => TaskState::Suspended,
            RUNNING | NOTIFIED => TaskState::Running,
            COMPLETED => TaskState::Completed,
            _ => TaskState::Empty,
        }
    }
}

/// Outcome of a single [`Task::resume`](crate::Task::resume) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The frame stopped at a suspension point (or is being driven by
    /// another thread) and needs another wake-up.
    Suspended,
    /// The frame reached its terminal point.
    Completed,
}
