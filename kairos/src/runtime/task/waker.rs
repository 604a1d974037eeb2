use crate::runtime::task::core::Frame;

use std::sync::Arc;
use std::task::{Wake, Waker};

/// Waking a frame resumes it on the waking thread.
///
/// The scheduler thread, a completing child or a `when_all` countdown all end
/// up here. A wake-up issued from inside another frame's poll is queued on
/// the thread and runs after it; the frame state machine turns concurrent
/// wake-ups into a single extra poll.
impl<T: Send + 'static> Wake for Frame<T> {
    fn wake(self: Arc<Self>) {
        self.notify();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notify();
    }
}

impl<T: Send + 'static> Frame<T> {
    /// Creates a [`Waker`] that resumes this frame.
    ///
    /// The waker keeps the frame allocation alive; waking it after the frame
    /// completed or was abandoned does nothing.
    pub(crate) fn waker(self: &Arc<Self>) -> Waker {
        Waker::from(self.clone())
    }
}
