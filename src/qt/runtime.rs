//! The scheduler itself (grounded on `schedule`, `qthread_run`,
//! `qthread_create`, `qthread_exit`, `qthread_join`, `qthread_yield`,
//! `qthread_usleep` in `examples/original_source/hw1/qthread.c`).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::context::Context;
use super::queue::ThreadQueue;
use super::thread::{IoWait, Thread, ThreadControl, ThreadId, ThreadRef};
use super::{PEND_TIME_USEC, STACK_SIZE};

/// Marker panic payload used by [`Runtime::exit`] to unwind out of a
/// thread body without running the rest of its call stack, the same way
/// `std::thread`'s own early-return-via-panic primitives (and, for that
/// matter, Go's `runtime.Goexit`) work: the payload is caught by the
/// thread's own runner and never escapes past it.
struct ExitSignal;

enum Handoff {
    /// The thread that called `schedule` is still the only runnable one;
    /// no switch happened.
    Noop,
    SwitchTo(ThreadRef),
    ToMain,
}

struct RuntimeState {
    active: ThreadQueue,
    sleepers: Vec<(ThreadRef, Instant)>,
    io_waiters: ThreadQueue,
    current: Option<ThreadRef>,
    next_id: ThreadId,
}

/// Process-lifetime scheduler state: the three queues, the notion of
/// "current thread", and the baton the call into [`Runtime::run`] itself
/// waits on. Call `run()` exactly once per `Runtime`.
pub struct Runtime {
    state: StdMutex<RuntimeState>,
    main_ctx: Box<dyn Context>,
}

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Arc::new(Runtime {
            state: StdMutex::new(RuntimeState {
                active: ThreadQueue::new(),
                sleepers: Vec::new(),
                io_waiters: ThreadQueue::new(),
                current: None,
                next_id: 0,
            }),
            main_ctx: Box::new(super::context::OsThreadContext::new(false)),
        })
    }

    pub(crate) fn current_thread(&self) -> ThreadRef {
        self.state
            .lock()
            .unwrap()
            .current
            .clone()
            .expect("qt primitive called with no current thread (not running inside the scheduler)")
    }

    pub(crate) fn move_to_active(&self, t: ThreadRef) {
        self.state.lock().unwrap().active.push_back(t);
    }

    /// Spawn a thread whose body is allowed to return normally; `create`
    /// lets the caller capture a typed return value, unlike the original
    /// C API's `void *` (a Rust closure supersedes the two-opaque-argument
    /// convention entirely, so there's nothing to carry over there).
    pub fn create<F, T>(self: &Arc<Self>, f: F) -> Thread<T>
    where
        F: FnOnce(&Arc<Runtime>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = {
            let mut st = self.state.lock().unwrap();
            st.next_id += 1;
            st.next_id
        };
        let thread_ref: ThreadRef = Arc::new(ThreadControl::new(id));
        {
            let mut st = self.state.lock().unwrap();
            st.active.push_back(thread_ref.clone());
        }

        let rt = self.clone();
        let tref = thread_ref.clone();
        let builder = thread::Builder::new().stack_size(STACK_SIZE).name(format!("qt-{id}"));
        let join_handle = builder
            .spawn(move || {
                tref.ctx.park();
                trace!("qt thread {} running", tref.id);
                let result = panic::catch_unwind(AssertUnwindSafe(|| f(&rt)));
                match result {
                    Ok(val) => rt.finish_current(Box::new(val)),
                    Err(payload) => {
                        if payload.downcast_ref::<ExitSignal>().is_some() {
                            // `Runtime::exit` already finished and retired this thread.
                        } else {
                            rt.finish_current_on_panic();
                            panic::resume_unwind(payload);
                        }
                    }
                }
            })
            .expect("failed to spawn backing OS thread for qt thread");
        *thread_ref.join_handle.lock().unwrap() = Some(join_handle);

        Thread {
            inner: thread_ref,
            _marker: std::marker::PhantomData,
        }
    }

    /// Spawn a thread whose body is not expected to produce a meaningful
    /// value (the common "worker loop" shape).
    pub fn start<F>(self: &Arc<Self>, f: F) -> Thread<()>
    where
        F: FnOnce(&Arc<Runtime>) + Send + 'static,
    {
        self.create(move |rt| f(rt))
    }

    /// Enter the scheduler. Returns once no thread remains runnable,
    /// sleeping, or I/O-waiting — note that a thread permanently blocked
    /// on a `Mutex`/`CondVar` it will never be woken from (a deadlock) is
    /// invisible to this check, exactly as in the original: such a thread
    /// simply never runs again, and `run()` still returns.
    pub fn run(self: &Arc<Self>) {
        match self.schedule() {
            Handoff::Noop => {}
            Handoff::SwitchTo(next) => {
                next.ctx.unpark();
                self.main_ctx.park();
            }
            Handoff::ToMain => {}
        }
        debug!("qt runtime: no runnable, sleeping, or io-waiting threads remain");
    }

    /// Give up the CPU; the calling thread goes to the back of the ready
    /// queue and may run again as soon as it reaches the front.
    pub fn yield_now(self: &Arc<Self>) {
        let cur = self.current_thread();
        self.state.lock().unwrap().active.push_back(cur.clone());
        self.suspend_and_wait(&cur);
    }

    /// Finish the calling thread with `val`, waking its joiner (if any).
    /// Never returns: unwinds out of the thread body exactly once, caught
    /// by the thread's own runner in [`Runtime::create`].
    pub fn exit<T: Send + 'static>(self: &Arc<Self>, val: T) -> ! {
        self.finish_current(Box::new(val));
        panic::panic_any(ExitSignal)
    }

    /// Block until `handle`'s thread has finished, then return its value.
    /// Panics if `T` doesn't match the type the thread actually finished
    /// with (the same "undefined, documented, not checked" contract the
    /// original's untyped `void *` return carried).
    pub fn join<T: Send + 'static>(self: &Arc<Self>, handle: Thread<T>) -> T {
        let t = handle.inner;
        let already_done = t.state.lock().unwrap().done;
        if !already_done {
            let cur = self.current_thread();
            t.state.lock().unwrap().waiter = Some(Arc::downgrade(&cur));
            self.suspend_and_wait(&cur);
        }
        let retval = t
            .state
            .lock()
            .unwrap()
            .retval
            .take()
            .expect("joined thread finished without recording a return value");
        if let Some(jh) = t.join_handle.lock().unwrap().take() {
            let _ = jh.join();
        }
        *retval
            .downcast::<T>()
            .expect("qt::Runtime::join called with a type that doesn't match the thread's return type")
    }

    /// Sleep the calling thread for at least `usecs` microseconds without
    /// blocking any other thread.
    pub fn usleep(self: &Arc<Self>, usecs: u64) {
        let deadline = Instant::now() + Duration::from_micros(usecs);
        let cur = self.current_thread();
        while Instant::now() < deadline {
            self.state.lock().unwrap().sleepers.push((cur.clone(), deadline));
            self.suspend_and_wait(&cur);
        }
    }

    fn finish_current(self: &Arc<Self>, val: Box<dyn Any + Send>) {
        let cur = self.current_thread();
        let waiter = {
            let mut s = cur.state.lock().unwrap();
            s.done = true;
            s.retval = Some(val);
            s.waiter.take().and_then(|w| w.upgrade())
        };
        if let Some(w) = waiter {
            self.move_to_active(w);
        }
        self.retire(&cur);
    }

    fn finish_current_on_panic(self: &Arc<Self>) {
        let cur = self.current_thread();
        let waiter = {
            let mut s = cur.state.lock().unwrap();
            s.done = true;
            s.waiter.take().and_then(|w| w.upgrade())
        };
        if let Some(w) = waiter {
            self.move_to_active(w);
        }
        self.retire(&cur);
    }

    /// Suspend the calling thread (already enqueued wherever it needs to
    /// be by the caller) and wait for someone to schedule it again.
    pub(crate) fn suspend_and_wait(self: &Arc<Self>, cur: &ThreadRef) {
        match self.schedule() {
            Handoff::Noop => {}
            Handoff::SwitchTo(next) => {
                next.ctx.unpark();
                cur.ctx.park();
            }
            Handoff::ToMain => {
                self.main_ctx.unpark();
                cur.ctx.park();
            }
        }
    }

    /// Retire the calling thread permanently: hand off the baton and let
    /// its backing OS thread run off the end of its closure. Never waits
    /// to be scheduled again.
    fn retire(self: &Arc<Self>, _cur: &ThreadRef) {
        match self.schedule() {
            Handoff::SwitchTo(next) => next.ctx.unpark(),
            Handoff::ToMain => self.main_ctx.unpark(),
            Handoff::Noop => unreachable!("a retiring thread cannot still be enqueued on `active`"),
        }
    }

    fn schedule(self: &Arc<Self>) -> Handoff {
        loop {
            let mut st = self.state.lock().unwrap();
            let self_thread = st.current.clone();
            match st.active.pop_front() {
                Some(t) => {
                    if let Some(sref) = &self_thread {
                        if Arc::ptr_eq(sref, &t) {
                            st.current = Some(t);
                            return Handoff::Noop;
                        }
                    }
                    st.current = Some(t.clone());
                    return Handoff::SwitchTo(t);
                }
                None => {
                    if st.sleepers.is_empty() && st.io_waiters.is_empty() {
                        st.current = None;
                        return Handoff::ToMain;
                    }
                    if !st.sleepers.is_empty() {
                        drop(st);
                        thread::sleep(Duration::from_micros(PEND_TIME_USEC));
                        let mut st2 = self.state.lock().unwrap();
                        for (t, _deadline) in st2.sleepers.drain(..) {
                            st2.active.push_back(t);
                        }
                        continue;
                    }
                    drop(st);
                    self.poll_io_waiters();
                    continue;
                }
            }
        }
    }

    fn poll_io_waiters(&self) {
        let mut st = self.state.lock().unwrap();
        let waiters: Vec<ThreadRef> = st.io_waiters.drain().collect();
        drop(st);
        if waiters.is_empty() {
            return;
        }
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(waiters.len());
        for w in &waiters {
            let (fd, events) = match w.state.lock().unwrap().io_wait {
                IoWait::Read(fd) => (fd, libc::POLLIN),
                IoWait::Write(fd) => (fd, libc::POLLOUT),
                IoWait::None => (-1, 0),
            };
            pollfds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
        }
        let timeout_ms = ((PEND_TIME_USEC / 1000).max(1)) as libc::c_int;
        unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms);
        }
        let mut st = self.state.lock().unwrap();
        for (w, pfd) in waiters.into_iter().zip(pollfds.into_iter()) {
            if pfd.revents != 0 {
                st.active.push_back(w);
            } else {
                st.io_waiters.push_back(w);
            }
        }
    }

    /// Park the current thread on the I/O-waiters queue until `fd` is
    /// ready for the given direction. Used by [`super::io`].
    pub(crate) fn wait_for_io(self: &Arc<Self>, wait: IoWait) {
        let cur = self.current_thread();
        {
            let mut s = cur.state.lock().unwrap();
            s.io_wait = wait;
        }
        self.state.lock().unwrap().io_waiters.push_back(cur.clone());
        self.suspend_and_wait(&cur);
        cur.state.lock().unwrap().io_wait = IoWait::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn two_threads_interleave_and_join() {
        let rt = Runtime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = counter.clone();
        let t1 = rt.create(move |rt| {
            for _ in 0..5 {
                c1.fetch_add(1, Ordering::SeqCst);
                rt.yield_now();
            }
            42
        });
        let c2 = counter.clone();
        let t2 = rt.create(move |rt| {
            for _ in 0..5 {
                c2.fetch_add(1, Ordering::SeqCst);
                rt.yield_now();
            }
            "done"
        });
        rt.run();
        assert_eq!(rt.join(t1), 42);
        assert_eq!(rt.join(t2), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn exit_unwinds_without_running_rest_of_body() {
        let rt = Runtime::new();
        let reached = Arc::new(AtomicUsize::new(0));
        let r = reached.clone();
        let t = rt.create(move |rt| {
            r.fetch_add(1, Ordering::SeqCst);
            rt.exit(7i32);
            #[allow(unreachable_code)]
            {
                r.fetch_add(100, Ordering::SeqCst);
                0
            }
        });
        rt.run();
        assert_eq!(rt.join(t), 7);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn usleep_does_not_block_other_threads() {
        let rt = Runtime::new();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let o1 = order.clone();
        let t1 = rt.start(move |rt| {
            rt.usleep(20_000);
            o1.lock().unwrap().push("slow");
        });
        let o2 = order.clone();
        let t2 = rt.start(move |_| {
            o2.lock().unwrap().push("fast");
        });
        rt.run();
        rt.join(t1);
        rt.join(t2);
        assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[test]
    fn join_on_already_finished_thread_returns_immediately() {
        let rt = Runtime::new();
        let t = rt.create(|_| 9u8);
        rt.run();
        assert_eq!(rt.join(t), 9);
    }
}
