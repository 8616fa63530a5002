//! Sleeping-barber scenario, run as a QT scheduling test: a barber thread
//! and a fixed pool of customer threads share a waiting line guarded by a
//! `qt::Mutex` and two `qt::CondVar`s. Constants are scaled down from
//! `examples/original_source/hw2/homework.c` (`NUM_OF_WAIT_CHAIRS`,
//! `NUM_OF_BARBER_CHAIR`, `NUM_OF_CUSTOMERS`) keeping the same shape: a
//! shop that seats one customer in the chair plus a handful waiting, and
//! more customers than chairs so some are turned away.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use corestack::qt::{CondVar, Mutex, Runtime};

const NUM_WAIT_CHAIRS: usize = 4;
const NUM_BARBER_CHAIRS: usize = 1;
const NUM_CUSTOMERS: usize = 10;
const HAIRCUT_USEC: u64 = 1_200;

struct Shop {
    line: StdMutex<VecDeque<usize>>,
    barber_asleep: StdMutex<bool>,
}

impl Shop {
    fn capacity() -> usize {
        NUM_WAIT_CHAIRS + NUM_BARBER_CHAIRS
    }
}

#[test]
fn every_customer_is_served_or_turned_away_and_the_line_never_overflows() {
    let rt = Runtime::new();
    let mutex = Arc::new(Mutex::new(&rt));
    let barber_cv = Arc::new(CondVar::new(&rt));
    let wait_cv = Arc::new(CondVar::new(&rt));
    let done_cv = Arc::new(CondVar::new(&rt));

    let shop = Arc::new(Shop {
        line: StdMutex::new(VecDeque::new()),
        barber_asleep: StdMutex::new(true),
    });

    let served = Arc::new(AtomicUsize::new(0));
    let turned_away = Arc::new(AtomicUsize::new(0));
    let max_waiting = Arc::new(AtomicUsize::new(0));

    // barber: sleeps until the line has someone, cuts hair, wakes the next
    // in line, repeats until every customer has been accounted for.
    let barber = {
        let mutex = mutex.clone();
        let barber_cv = barber_cv.clone();
        let wait_cv = wait_cv.clone();
        let done_cv = done_cv.clone();
        let shop = shop.clone();
        let served = served.clone();
        let turned_away = turned_away.clone();
        rt.start(move |rt| {
            mutex.lock();
            loop {
                if served.load(Ordering::SeqCst) + turned_away.load(Ordering::SeqCst)
                    == NUM_CUSTOMERS
                    && shop.line.lock().unwrap().is_empty()
                {
                    break;
                }
                while shop.line.lock().unwrap().is_empty() {
                    if served.load(Ordering::SeqCst) + turned_away.load(Ordering::SeqCst)
                        == NUM_CUSTOMERS
                    {
                        mutex.unlock();
                        return;
                    }
                    *shop.barber_asleep.lock().unwrap() = true;
                    barber_cv.wait(&mutex);
                }
                *shop.barber_asleep.lock().unwrap() = false;

                rt.usleep(HAIRCUT_USEC);

                let who = shop.line.lock().unwrap().pop_front();
                debug_assert!(who.is_some());
                served.fetch_add(1, Ordering::SeqCst);
                done_cv.broadcast();
                wait_cv.broadcast();
            }
            mutex.unlock();
        })
    };

    let mut customers = Vec::new();
    for id in 0..NUM_CUSTOMERS {
        let mutex = mutex.clone();
        let barber_cv = barber_cv.clone();
        let wait_cv = wait_cv.clone();
        let done_cv = done_cv.clone();
        let shop = shop.clone();
        let turned_away = turned_away.clone();
        let max_waiting = max_waiting.clone();
        customers.push(rt.start(move |_| {
            mutex.lock();
            let mut line = shop.line.lock().unwrap();
            if line.len() == Shop::capacity() {
                turned_away.fetch_add(1, Ordering::SeqCst);
                drop(line);
                mutex.unlock();
                return;
            }
            line.push_back(id);
            max_waiting.fetch_max(line.len(), Ordering::SeqCst);
            let asleep = *shop.barber_asleep.lock().unwrap();
            drop(line);
            if asleep {
                barber_cv.signal();
            }

            while shop.line.lock().unwrap().front().copied() != Some(id) {
                wait_cv.wait(&mutex);
            }
            done_cv.wait(&mutex);
            mutex.unlock();
        }));
    }

    rt.run();
    rt.join(barber);
    for c in customers {
        rt.join(c);
    }

    assert_eq!(
        served.load(Ordering::SeqCst) + turned_away.load(Ordering::SeqCst),
        NUM_CUSTOMERS
    );
    assert!(max_waiting.load(Ordering::SeqCst) <= Shop::capacity());
}
