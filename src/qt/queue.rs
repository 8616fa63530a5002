//! A plain FIFO queue of threads (grounded on `tq_append`/`tq_pop` in
//! `examples/original_source/hw1/qthread.c`).

use std::collections::VecDeque;

use super::thread::ThreadRef;

#[derive(Default)]
pub(crate) struct ThreadQueue(VecDeque<ThreadRef>);

impl ThreadQueue {
    pub fn new() -> Self {
        ThreadQueue(VecDeque::new())
    }

    pub fn push_back(&mut self, t: ThreadRef) {
        self.0.push_back(t);
    }

    pub fn pop_front(&mut self) -> Option<ThreadRef> {
        self.0.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, ThreadRef> {
        self.0.drain(..)
    }
}
