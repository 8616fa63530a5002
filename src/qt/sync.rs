//! Cooperative mutex and condition variable (grounded on
//! `qthread_mutex_lock`/`qthread_mutex_unlock`/`qthread_cond_wait`/
//! `qthread_cond_signal`/`qthread_cond_broadcast` in
//! `examples/original_source/hw1/qthread.c`).
//!
//! These are intentionally *not* `std::sync::Mutex`/`Condvar`: they block
//! the logical QT thread (by parking its backing OS thread and handing
//! the baton to whoever is next), not the underlying OS thread pool, and
//! they carry no poisoning semantics — a panic while "holding" one of
//! these just unwinds normally, there being no critical section to
//! poison.

use std::sync::{Arc, Mutex as StdMutex};

use super::queue::ThreadQueue;
use super::runtime::Runtime;

struct MutexState {
    locked: bool,
    waiters: ThreadQueue,
}

/// A non-reentrant lock whose `lock`/`unlock` are suspension points.
pub struct Mutex {
    rt: Arc<Runtime>,
    inner: StdMutex<MutexState>,
}

impl Mutex {
    pub fn new(rt: &Arc<Runtime>) -> Self {
        Mutex {
            rt: rt.clone(),
            inner: StdMutex::new(MutexState {
                locked: false,
                waiters: ThreadQueue::new(),
            }),
        }
    }

    /// Block until the lock is held by the calling thread.
    pub fn lock(&self) {
        let mut st = self.inner.lock().unwrap();
        if !st.locked {
            st.locked = true;
            return;
        }
        let cur = self.rt.current_thread();
        st.waiters.push_back(cur.clone());
        drop(st);
        self.rt.suspend_and_wait(&cur);
    }

    /// Release the lock. If another thread was waiting, it becomes
    /// runnable and now considers itself the holder — no other thread may
    /// observe the lock as unlocked in between.
    pub fn unlock(&self) {
        let mut st = self.inner.lock().unwrap();
        match st.waiters.pop_front() {
            None => st.locked = false,
            Some(next) => {
                drop(st);
                self.rt.move_to_active(next);
            }
        }
    }
}

/// A condition variable whose `wait` atomically unlocks `mutex`, suspends,
/// and relocks `mutex` before returning (no spurious wakeups: a thread is
/// only made runnable again by an explicit `signal`/`broadcast`, so callers
/// don't strictly need to re-check their predicate in a loop, though doing
/// so remains good practice for clarity).
pub struct CondVar {
    rt: Arc<Runtime>,
    waiters: StdMutex<ThreadQueue>,
}

impl CondVar {
    pub fn new(rt: &Arc<Runtime>) -> Self {
        CondVar {
            rt: rt.clone(),
            waiters: StdMutex::new(ThreadQueue::new()),
        }
    }

    pub fn wait(&self, mutex: &Mutex) {
        let cur = self.rt.current_thread();
        self.waiters.lock().unwrap().push_back(cur.clone());
        mutex.unlock();
        self.rt.suspend_and_wait(&cur);
        mutex.lock();
    }

    /// Wake at most one waiter.
    pub fn signal(&self) {
        if let Some(w) = self.waiters.lock().unwrap().pop_front() {
            self.rt.move_to_active(w);
        }
    }

    /// Wake every current waiter.
    pub fn broadcast(&self) {
        let mut q = self.waiters.lock().unwrap();
        while let Some(w) = q.pop_front() {
            self.rt.move_to_active(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn mutex_serializes_a_critical_section() {
        let rt = Runtime::new();
        let mtx = Arc::new(Mutex::new(&rt));
        let shared = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let m = mtx.clone();
            let s = shared.clone();
            handles.push(rt.start(move |rt| {
                m.lock();
                let before = s.load(Ordering::SeqCst);
                rt.yield_now();
                s.store(before + 1, Ordering::SeqCst);
                m.unlock();
            }));
        }
        rt.run();
        for h in handles {
            rt.join(h);
        }
        assert_eq!(shared.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn condvar_signal_wakes_a_single_waiter() {
        let rt = Runtime::new();
        let mtx = Arc::new(Mutex::new(&rt));
        let cv = Arc::new(CondVar::new(&rt));
        let ready = Arc::new(AtomicUsize::new(0));

        let m1 = mtx.clone();
        let cv1 = cv.clone();
        let r1 = ready.clone();
        let waiter = rt.start(move |_| {
            m1.lock();
            cv1.wait(&m1);
            r1.fetch_add(1, Ordering::SeqCst);
            m1.unlock();
        });

        let m2 = mtx.clone();
        let cv2 = cv.clone();
        let signaler = rt.start(move |rt| {
            rt.yield_now(); // let the waiter get in line first
            m2.lock();
            cv2.signal();
            m2.unlock();
        });

        rt.run();
        rt.join(waiter);
        rt.join(signaler);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }
}
