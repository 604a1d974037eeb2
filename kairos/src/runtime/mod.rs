//! Core runtime components.
//!
//! This module contains the fundamental building blocks of the runtime:
//! task frames, the timer scheduler that resumes them, and cooperative
//! yielding.
//!
//! It is responsible for:
//! - running task bodies lazily, one resumption at a time,
//! - resuming suspended frames when their timers expire,
//! - chaining frames through continuations and fan-in countdowns.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod scheduler;
pub(crate) mod yield_now;

pub mod task;
