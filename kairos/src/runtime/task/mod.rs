//! Task primitives.
//!
//! This module defines the lazy, resumable tasks of the runtime and the
//! fan-in combinators built on them.
//!
//! It includes:
//! - the [`Task`] handle and the frame it owns,
//! - frame state management and the waker that resumes a frame inline,
//! - awaiting one task from another through continuations,
//! - [`when_all`] and [`when_all_void`].

mod core;
mod handle;
mod id;
mod state;
mod waker;
mod when_all;

pub use self::core::Task;
pub use handle::IntoTask;
pub use id::TaskId;
pub use state::{Step, TaskState};
pub use when_all::{WhenAll, WhenAllVoid, when_all, when_all_void};
