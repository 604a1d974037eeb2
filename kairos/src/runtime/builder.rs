use super::scheduler::{Scheduler, ShutdownPolicy};
use crate::error::SchedulerError;

/// Builder for configuring and starting a scheduler.
///
/// `SchedulerBuilder` allows customizing the scheduler before its thread is
/// spawned: the name of that thread and what happens to queued timers on
/// shutdown.
///
/// # Examples
///
/// ```rust
/// use kairos::{SchedulerBuilder, ShutdownPolicy};
///
/// let scheduler = SchedulerBuilder::new()
///     .thread_name("timers")
///     .shutdown_policy(ShutdownPolicy::Discard)
///     .build()
///     .unwrap();
///
/// assert_eq!(scheduler.shutdown().dropped, 0);
/// ```
#[derive(Clone, Debug)]
pub struct SchedulerBuilder {
    /// Name given to the scheduler thread.
    thread_name: String,

    /// Policy applied when the scheduler shuts down.
    shutdown_policy: ShutdownPolicy,
}

impl SchedulerBuilder {
    /// Creates a new `SchedulerBuilder` with default configuration.
    ///
    /// The thread is named `kairos-scheduler` and shutdown drains the queue.
    pub fn new() -> Self {
        Self {
            thread_name: String::from("kairos-scheduler"),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }

    /// Sets the name of the scheduler thread.
    ///
    /// # Panics
    ///
    /// Panics if `name` contains a NUL byte.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.contains('\0'), "thread name must not contain NUL bytes");

        self.thread_name = name;
        self
    }

    /// Sets the policy applied to queued timers on shutdown.
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Spawns the scheduler thread with the configured options.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the thread cannot be created.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        Scheduler::spawn(self.thread_name, self.shutdown_policy)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
