use crate::runtime::context;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspends once, re-queueing its frame behind the frames already waiting
/// on this thread.
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        context::defer_wake(cx.waker().clone());
        Poll::Pending
    }
}

/// Lets the other frames queued on this thread run before continuing.
///
/// Children started by [`when_all`](crate::task::when_all), and frames woken
/// by the same timer delivery, wait in a per-thread queue while one of them
/// is polled. Awaiting `yield_now` puts the current frame at the back of that
/// queue, so long synchronous bodies can take turns instead of running to
/// completion one after the other. With nothing else queued the frame
/// resumes right away.
///
/// # Examples
///
/// ```rust
/// use kairos::{Task, yield_now};
/// use kairos::task::when_all;
/// use std::sync::{Arc, Mutex};
///
/// let turns = Arc::new(Mutex::new(Vec::new()));
///
/// let worker = |name: char, turns: Arc<Mutex<Vec<char>>>| {
///     Task::new(async move {
///         for _ in 0..2 {
///             turns.lock().unwrap().push(name);
///             yield_now().await;
///         }
///         Ok(())
///     })
/// };
///
/// let a = worker('a', turns.clone());
/// let b = worker('b', turns.clone());
///
/// let mut task = Task::new(async move { when_all([a, b]).await });
/// task.get_result().unwrap();
///
/// assert_eq!(*turns.lock().unwrap(), vec!['a', 'b', 'a', 'b']);
/// ```
pub async fn yield_now() {
    YieldNow { yielded: false }.await
}
