use crate::error::TaskError;
use crate::runtime::task::Task;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

impl<T: Send + 'static> Future for Task<T> {
    /// The child's value, or its original error.
    type Output = anyhow::Result<T>;

    /// Awaits a child task from inside another task body.
    ///
    /// A cold child is started on the awaiting thread once the awaiting frame
    /// has suspended, and runs until its first suspension. The awaiting
    /// frame's waker becomes the child's continuation and is resumed once the
    /// child completes, on whichever thread completes it.
    ///
    /// A failed child hands its error back unchanged, so `?` propagates the
    /// original error through any depth of awaiting frames.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(frame) = self.frame() else {
            return Poll::Ready(Err(TaskError::Empty.into_anyhow()));
        };

        frame.start();

        if let Some(result) = frame.try_take_result() {
            return Poll::Ready(result.map_err(TaskError::into_anyhow));
        }

        // The continuation is registered before re-checking the slot, so a
        // completion racing on another thread either sees it or is seen here.
        frame.set_continuation(cx.waker());

        match frame.try_take_result() {
            Some(result) => {
                frame.take_continuation();
                Poll::Ready(result.map_err(TaskError::into_anyhow))
            }
            None => Poll::Pending,
        }
    }
}

/// Conversion into a [`Task`], used by the fan-in combinators.
///
/// Implemented for tasks themselves and for [`Sleep`](crate::time::Sleep),
/// so that mixed sleeps and tasks can be passed to
/// [`when_all_void`](crate::task::when_all_void).
pub trait IntoTask {
    /// The value produced by the task.
    type Output;

    /// Wraps `self` into a cold task.
    fn into_task(self) -> Task<Self::Output>;
}

impl<T: Send + 'static> IntoTask for Task<T> {
    type Output = T;

    fn into_task(self) -> Task<T> {
        self
    }
}
