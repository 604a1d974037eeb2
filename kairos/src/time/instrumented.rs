use pin_project::pin_project;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Wraps a future and measures the time it takes to complete.
///
/// The returned future resolves to a tuple containing:
/// - the output of the wrapped future,
/// - the elapsed time since the first poll.
///
/// Timing starts on the **first poll**, not at construction time, so a cold
/// task wrapped here is measured from the moment it is started.
///
/// # Examples
///
/// ```rust
/// use kairos::Task;
/// use kairos::time::instrumented;
///
/// let mut task = Task::new(async {
///     let (value, elapsed) = instrumented(async { 42 }).await;
///     assert!(elapsed.as_secs() < 1);
///     Ok(value)
/// });
///
/// assert_eq!(task.get_result().unwrap(), 42);
/// ```
pub fn instrumented<F>(future: F) -> Instrumented<F> {
    Instrumented {
        future,
        start: None,
    }
}

/// A future that measures the execution time of another future.
///
/// Dropping it before completion discards the measurement.
#[pin_project]
#[must_use = "futures do nothing unless awaited"]
pub struct Instrumented<F> {
    #[pin]
    future: F,

    /// Instant of the first poll.
    start: Option<Instant>,
}

impl<F: Future> Future for Instrumented<F> {
    type Output = (F::Output, Duration);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let start = *this.start.get_or_insert_with(Instant::now);

        this.future
            .poll(cx)
            .map(|output| (output, start.elapsed()))
    }
}
