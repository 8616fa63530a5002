//! The "opaque switch" capability every QT thread rides on.
//!
//! The original assembly-level context switch is explicitly out of scope
//! for this crate (SPEC_FULL.md §4.1 treats it as an external collaborator
//! that may legitimately be "a thin assembly shim, a stackful coroutine
//! library, or a task scheduler"). [`OsThreadContext`] picks the third
//! option: each QT thread owns one real, parked OS thread, and "switching
//! to" a thread just means handing it a single-use baton and waiting to be
//! handed one back. Because at most one baton is ever held at a time, this
//! reproduces the cooperative, one-runs-at-a-time contract exactly, without
//! unsafe stack manipulation or a fabricated dependency on a coroutine
//! crate this crate's retrieval pack never showed a real user of.

use std::sync::{Condvar, Mutex};

/// A handoff point a scheduler can park a thread on and later wake it at.
///
/// Implementors must guarantee that a `park` call only returns after a
/// matching `unpark` call that happens-after it; spurious wakeups are not
/// allowed to leak through to callers.
pub trait Context: Send + Sync {
    /// Block the calling OS thread until [`Context::unpark`] is called.
    fn park(&self);
    /// Wake whoever is (or will next be) parked on this context.
    fn unpark(&self);
}

/// A one-shot-at-a-time baton built from a [`Mutex`]/[`Condvar`] pair.
///
/// The mutex here is never contended in practice: QT's own invariant (at
/// most one logical thread runs at a time) already guarantees that only
/// the thread currently holding the global baton ever touches this
/// instance. It exists purely to satisfy `Send + Sync`, not to resolve
/// contention.
pub struct OsThreadContext {
    runnable: Mutex<bool>,
    condvar: Condvar,
}

impl OsThreadContext {
    pub fn new(initially_runnable: bool) -> Self {
        OsThreadContext {
            runnable: Mutex::new(initially_runnable),
            condvar: Condvar::new(),
        }
    }
}

impl Context for OsThreadContext {
    fn park(&self) {
        let mut guard = self.runnable.lock().unwrap();
        while !*guard {
            guard = self.condvar.wait(guard).unwrap();
        }
        *guard = false;
    }

    fn unpark(&self) {
        let mut guard = self.runnable.lock().unwrap();
        *guard = true;
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn park_blocks_until_unparked() {
        let ctx = Arc::new(OsThreadContext::new(false));
        let worker_ctx = ctx.clone();
        let flag = Arc::new(Mutex::new(false));
        let worker_flag = flag.clone();
        let handle = thread::spawn(move || {
            worker_ctx.park();
            *worker_flag.lock().unwrap() = true;
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!*flag.lock().unwrap());
        ctx.unpark();
        handle.join().unwrap();
        assert!(*flag.lock().unwrap());
    }
}
