use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::task::Waker;
use std::time::Instant;

/// An entry in the scheduler timer queue.
///
/// A `TimerEntry` asks for `waker` to be woken once `deadline` is reached.
/// Entries with the same deadline are delivered in insertion order, which is
/// what `seq` records.
///
/// The entry may be cancelled before it fires, by the sleep that queued it.
pub(crate) struct TimerEntry {
    /// The time at which the waker should be woken.
    pub(crate) deadline: Instant,

    /// Insertion sequence number, unique per queue.
    pub(crate) seq: u64,

    /// Waker to notify when the deadline is reached.
    pub(crate) waker: Waker,

    /// Cancellation flag shared with the owner of the timer.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by sequence number.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap: the earliest deadline is popped first, and
    /// among equal deadlines the entry inserted first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending timers.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `waker` to be woken at `deadline`, unless `cancelled` is set
    /// first.
    pub(crate) fn push(&mut self, deadline: Instant, waker: Waker, cancelled: Arc<AtomicBool>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(TimerEntry {
            deadline,
            seq,
            waker,
            cancelled,
        });
    }

    /// Returns the earliest deadline, if any.
    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Removes the earliest entry if its deadline is at or before `now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => self.heap.pop(),
            _ => None,
        }
    }

    /// Removes the earliest entry regardless of its deadline.
    #[cfg(test)]
    pub(crate) fn pop(&mut self) -> Option<TimerEntry> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every cancelled entry and returns them.
    pub(crate) fn remove_cancelled(&mut self) -> Vec<TimerEntry> {
        let (cancelled, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(TimerEntry::is_cancelled);

        self.heap = BinaryHeap::from(live);
        cancelled
    }

    /// Removes every pending entry, in no particular order.
    pub(crate) fn take_all(&mut self) -> Vec<TimerEntry> {
        std::mem::take(&mut self.heap).into_vec()
    }
}
