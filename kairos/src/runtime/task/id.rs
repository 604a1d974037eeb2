use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that uniquely identifies a task frame within the process.
///
/// IDs are handed out from a process-wide counter when a frame is allocated
/// and are never reused. They are meant for logs and diagnostics only.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    pub(crate) fn next() -> Self {
        let raw = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        // Starts at 1 and would need 2^64 frames to wrap.
        match NonZeroU64::new(raw) {
            Some(id) => TaskId(id),
            None => unreachable!("task id counter overflowed"),
        }
    }

    /// Returns the raw numeric value of the ID.
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
