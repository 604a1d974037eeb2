use std::io;

/// Errors reported by [`Task`](crate::Task) operations.
///
/// Two families live here: protocol violations (`AlreadyCompleted`, `Empty`,
/// `Consumed`), which are programming errors of the caller, and the terminal
/// failure of a task body (`Failed`, `Panicked`).
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("task was resumed after it had already completed")]
    AlreadyCompleted,

    #[error("task handle does not own a frame (moved-from or default-constructed)")]
    Empty,

    #[error("task result was already taken")]
    Consumed,

    #[error("task body panicked: {0}")]
    Panicked(String),

    /// The body returned an error. The original error is kept as-is, so its
    /// message and concrete type stay observable through `downcast_ref`.
    #[error(transparent)]
    Failed(anyhow::Error),
}

impl TaskError {
    /// Returns `true` for errors caused by misuse of the task API rather than
    /// by the body itself.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TaskError::AlreadyCompleted | TaskError::Empty | TaskError::Consumed
        )
    }

    /// Returns the body error, if the task failed by returning one.
    pub fn body_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Converts the error into the form seen by an awaiting task body.
    ///
    /// A body error is handed back unchanged so that it propagates through
    /// any number of awaiting frames without being wrapped.
    pub(crate) fn into_anyhow(self) -> anyhow::Error {
        match self {
            TaskError::Failed(err) => err,
            other => anyhow::Error::new(other),
        }
    }
}

/// Errors reported by the timer [`Scheduler`](crate::Scheduler).
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler has shut down and no longer accepts timers")]
    ShutDown,

    #[error("failed to spawn the scheduler thread: {0}")]
    Spawn(#[from] io::Error),
}

impl PartialEq for SchedulerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ShutDown, Self::ShutDown) => true,
            (Self::Spawn(a), Self::Spawn(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
