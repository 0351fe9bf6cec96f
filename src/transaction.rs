//! Bounded hand-off of ready jobs from the scheduling pass to workers.
//!
//! A fixed pool of [`TransactionSlot`]s bounds the number of jobs in flight.
//! The producer allocates a slot, stores a job in it and pushes its id; a
//! worker pops the id, runs the job and flags the slot completed; the
//! producer then observes the flag, retires the job and deallocates the
//! slot. An exhausted pool is the backpressure signal.
//!
//! A slot may be published for one specific worker; other workers skip it
//! and take the oldest slot they are allowed to run.

use crate::{
    graph::JobRef,
    sync::{AtomicBool, Condvar, Mutex, Ordering},
};
use derive_more::Display;
use std::collections::VecDeque;

/// Index of a slot in the pool.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
#[display("slot {_0}")]
pub(crate) struct SlotId(usize);

#[derive(Debug)]
pub(crate) struct TransactionSlot {
    job: Mutex<Option<JobRef>>,
    completed: AtomicBool,
}

impl TransactionSlot {
    fn new() -> Self {
        Self {
            job: Mutex::new(None),
            completed: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_job(&self, job: JobRef) {
        let prev = self.job.lock().replace(job);
        assert!(prev.is_none(), "TransactionSlot::set_job: slot is occupied");
        self.completed.store(false, Ordering::Relaxed);
    }

    pub(crate) fn job(&self) -> Option<JobRef> {
        self.job.lock().clone()
    }

    pub(crate) fn take_job(&self) -> Option<JobRef> {
        self.job.lock().take()
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
struct Published {
    slot: SlotId,
    worker: Option<usize>,
}

impl Published {
    fn runs_on(&self, worker: usize) -> bool {
        self.worker.is_none_or(|target| target == worker)
    }
}

#[derive(Debug)]
struct State {
    free: Vec<SlotId>,
    published: VecDeque<Published>,
    aborted: bool,
}

#[derive(Debug)]
pub(crate) struct TransactionQueue {
    slots: Vec<TransactionSlot>,
    state: Mutex<State>,
    /// Signaled when a slot is published or on abort.
    published: Condvar,
    /// Signaled when a slot returns to the pool, when the published queue
    /// shrinks, or on abort.
    released: Condvar,
}

impl TransactionQueue {
    /// # Panics
    /// If `capacity` is zero.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "TransactionQueue::new: zero capacity");
        Self {
            slots: (0..capacity).map(|_| TransactionSlot::new()).collect(),
            state: Mutex::new(State {
                free: (0..capacity).rev().map(SlotId).collect(),
                published: VecDeque::with_capacity(capacity),
                aborted: false,
            }),
            published: Condvar::new(),
            released: Condvar::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that can currently be allocated.
    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    pub(crate) fn slot(&self, id: SlotId) -> &TransactionSlot {
        &self.slots[id.0]
    }

    /// Reserve a free slot. Returns `None` when aborted, or when the pool is
    /// exhausted and `blocking` is `false`.
    pub(crate) fn alloc(&self, blocking: bool) -> Option<SlotId> {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return None;
            }
            if let Some(slot) = state.free.pop() {
                return Some(slot);
            }
            if !blocking {
                return None;
            }
            state = self.released.wait(state);
        }
    }

    /// Clear the slot and return it to the pool.
    pub(crate) fn dealloc(&self, id: SlotId) {
        let slot = self.slot(id);
        drop(slot.take_job());
        slot.completed.store(false, Ordering::Relaxed);

        let mut state = self.state.lock();
        debug_assert!(!state.free.contains(&id), "TransactionQueue::dealloc: double free");
        state.free.push(id);
        drop(state);
        self.released.notify_one();
    }

    /// Publish an allocated slot, to any worker or only to `worker`.
    /// Returns `false` if the queue is aborted, or full and `blocking` is
    /// `false`; the caller then still owns the slot and must `dealloc` it.
    pub(crate) fn push(&self, slot: SlotId, worker: Option<usize>, blocking: bool) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return false;
            }
            if state.published.len() < self.slots.len() {
                state.published.push_back(Published { slot, worker });
                drop(state);
                // Only the target may take it, and it need not be the
                // waiter `notify_one` would pick.
                if worker.is_some() {
                    self.published.notify_all();
                } else {
                    self.published.notify_one();
                }
                return true;
            }
            if !blocking {
                return false;
            }
            state = self.released.wait(state);
        }
    }

    /// Take the oldest published slot that `worker` may run. Returns `None`
    /// once aborted, even if published slots remain, so no job starts
    /// after `abort`.
    pub(crate) fn pop(&self, worker: usize, blocking: bool) -> Option<SlotId> {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return None;
            }
            let eligible = state.published.iter().position(|entry| entry.runs_on(worker));
            let entry = eligible.and_then(|index| state.published.remove(index));
            if let Some(entry) = entry {
                drop(state);
                self.released.notify_one();
                return Some(entry.slot);
            }
            if !blocking {
                return None;
            }
            state = self.published.wait(state);
        }
    }

    /// Wake every blocked producer and consumer and refuse further work.
    /// Idempotent.
    pub(crate) fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        drop(state);
        self.published.notify_all();
        self.released.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Slots that were published but never popped.
    pub(crate) fn undelivered(&self) -> usize {
        self.state.lock().published.len()
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use crate::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_abort_releases_a_blocked_consumer() {
        loom::model(|| {
            let queue = Arc::new(TransactionQueue::new(1));
            let consumer = {
                let queue = queue.clone();
                thread::spawn(move || queue.pop(0, true))
            };
            let slot = queue.alloc(false).unwrap();
            let pushed = queue.push(slot, None, true);
            queue.abort();
            if let Some(popped) = consumer.join().unwrap() {
                assert!(pushed);
                assert_eq!(popped, slot);
            }
        });
    }

    #[test]
    fn loom_blocking_alloc_receives_the_released_slot() {
        loom::model(|| {
            let queue = Arc::new(TransactionQueue::new(1));
            let held = queue.alloc(false).unwrap();
            let waiter = {
                let queue = queue.clone();
                thread::spawn(move || queue.alloc(true))
            };
            queue.dealloc(held);
            assert_eq!(waiter.join().unwrap(), Some(held));
        });
    }
}
