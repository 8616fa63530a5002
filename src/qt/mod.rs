//! Cooperative user-space thread runtime (spec.md §4.1), grounded on
//! `examples/original_source/hw1/qthread.{c,h}`.
//!
//! Exactly one logical thread runs at a time; a thread only ever gives up
//! the CPU at an explicit suspension point (`yield_now`, `exit`, `join` on
//! a thread that isn't done yet, `usleep`, a `Mutex`/`CondVar` call that has
//! to wait, or an I/O call that would block). Between suspension points all
//! scheduler state is touched by exactly one logical thread, so the only
//! reason anything here reaches for a real lock at all is that each QT
//! thread is, underneath, backed by its own parked OS thread (see
//! [`context`]) — never because two logical threads are genuinely racing.

pub mod context;
pub mod io;
pub mod queue;
pub mod runtime;
pub mod sync;
pub mod thread;

pub use runtime::Runtime;
pub use sync::{CondVar, Mutex};
pub use thread::Thread;

use crate::errors::{AsErrorKind, ErrorKind};
use thiserror::Error;

/// Failures a QT non-blocking I/O wrapper can report (spec.md §4.1 I/O
/// wrappers), beyond the generic `std::io::Error` the syscall itself
/// returns.
#[derive(Debug, Error)]
pub enum QtError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AsErrorKind for QtError {
    fn kind(&self) -> ErrorKind {
        match self {
            QtError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Default stack size for each backing OS thread (spec.md §3 default).
pub const STACK_SIZE: usize = 8 * 1024;

/// How long the scheduler blocks in one round of sleeping/polling when no
/// thread is immediately runnable, in microseconds (original `PEND_TIME`).
pub const PEND_TIME_USEC: u64 = 10_000;
