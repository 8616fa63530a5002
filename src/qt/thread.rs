//! Thread control block (grounded on `struct qthread` in
//! `examples/original_source/hw1/qthread.h`).

use std::any::Any;
use std::marker::PhantomData;
use std::os::unix::io::RawFd;
use std::sync::{Mutex, Weak};
use std::thread::JoinHandle;

use super::context::{Context, OsThreadContext};

pub(crate) type ThreadId = u64;

/// What a thread is blocked waiting on, if anything, while parked on the
/// `io_waiters` queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IoWait {
    None,
    Read(RawFd),
    Write(RawFd),
}

pub(crate) struct ThreadState {
    pub done: bool,
    pub retval: Option<Box<dyn Any + Send>>,
    /// A weak back-reference to whoever is waiting to `join` this thread.
    /// Weak because a joiner never owns the thread it's waiting on.
    pub waiter: Option<Weak<ThreadControl>>,
    pub io_wait: IoWait,
}

/// Everything the scheduler needs to know about one QT thread.
pub(crate) struct ThreadControl {
    pub id: ThreadId,
    pub ctx: Box<dyn Context>,
    pub state: Mutex<ThreadState>,
    pub join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadControl {
    pub fn new(id: ThreadId) -> Self {
        ThreadControl {
            id,
            ctx: Box::new(OsThreadContext::new(false)),
            state: Mutex::new(ThreadState {
                done: false,
                retval: None,
                waiter: None,
                io_wait: IoWait::None,
            }),
            join_handle: Mutex::new(None),
        }
    }
}

pub(crate) type ThreadRef = std::sync::Arc<ThreadControl>;

/// A handle to a thread created by [`crate::qt::Runtime::start`] or
/// [`crate::qt::Runtime::create`]. Consumed by [`crate::qt::Runtime::join`];
/// there is no way to construct, clone, or join a `Thread` more than once,
/// which rules out "joining a thread that doesn't exist" by construction.
pub struct Thread<T = ()> {
    pub(crate) inner: ThreadRef,
    pub(crate) _marker: PhantomData<T>,
}

impl<T> Thread<T> {
    pub(crate) fn id(&self) -> ThreadId {
        self.inner.id
    }
}
