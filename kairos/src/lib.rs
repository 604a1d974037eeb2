//! # Kairos
//!
//! **Kairos** is a minimal cooperative task runtime for the **Nebula** ecosystem.
//!
//! It is built around lazy, resumable tasks rather than a thread pool. A
//! [`Task`] owns the frame of an async body and runs nothing until it is
//! resumed. Every suspension point hands control back to whoever resumed the
//! frame; the frame is later resumed by the party it registered with, on
//! that party's thread:
//!
//! - a **timer scheduler** thread, for [`sleep_for`](time::sleep_for),
//! - the **child task** it awaits, through a continuation,
//! - a **fan-in countdown**, for [`when_all`](task::when_all).
//!
//! There is no global runtime: the [`Scheduler`] is an explicit value and
//! sleeps hold a [`Handle`] to it.
//!
//! ## Quick Start
//!
//! ```rust
//! use kairos::{Scheduler, Task};
//! use kairos::task::when_all;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::start().unwrap();
//! let handle = scheduler.handle();
//!
//! let fetch = |id: u32, ms: u64| {
//!     let handle = handle.clone();
//!     Task::new(async move {
//!         handle.sleep_for(Duration::from_millis(ms)).await;
//!         Ok(id)
//!     })
//! };
//!
//! let children = [fetch(1, 30), fetch(2, 10), fetch(3, 20)];
//!
//! let mut total = Task::new(async move {
//!     // The three children sleep concurrently: ~30ms, not ~60ms.
//!     let ids = when_all(children).await?;
//!     Ok(ids.iter().sum::<u32>())
//! });
//!
//! assert_eq!(total.get_result().unwrap(), 6);
//! ```
//!
//! ## Modules
//!
//! - [`task`]: Tasks, task states and the `when_all` combinators
//! - [`time`]: Sleeps and elapsed-time measurement
//!
//! ## Getting Started
//!
//! Add Kairos to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! kairos = { git = "https://github.com/Nebula-ecosystem/Kairos", package = "kairos" }
//! ```

mod error;
mod runtime;

pub mod time;

pub use error::{SchedulerError, TaskError};
pub use runtime::builder::SchedulerBuilder;
pub use runtime::scheduler::{Handle, Scheduler, ShutdownPolicy, ShutdownReport};
pub use runtime::task;
pub use runtime::task::Task;
pub use runtime::yield_now::yield_now;

pub use kairos_macros::*;

/// Support items for the code generated by `kairos-macros`. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use parking_lot::Mutex;

    /// Takes the value a `when_all!` branch stored in its slot.
    pub fn take_slot<T>(slot: &Mutex<Option<T>>) -> anyhow::Result<T> {
        slot.lock()
            .take()
            .ok_or_else(|| anyhow::Error::new(crate::TaskError::Consumed))
    }
}
