//! Time utilities.
//!
//! This module provides the time-related suspension points of the runtime.
//! Every sleep is bound to an explicit scheduler [`Handle`](crate::Handle).
//!
//! It includes:
//! - [`sleep_for`] and the [`Sleep`] future,
//! - [`sleep_ms`] and [`sleep`], which return ready-made tasks,
//! - [`instrumented`] for measuring how long a future takes.

mod instrumented;
mod sleep;

#[doc(inline)]
pub use instrumented::{Instrumented, instrumented};

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_for, sleep_ms};
