use crate::{graph::JobRef, sync::Mutex, types::Priority};
use std::collections::VecDeque;

/// One FIFO per priority level, holding jobs whose dependency count reached
/// 1 and that have not been handed to a worker yet.
///
/// Queues grow on demand: a job that becomes ready must always find room,
/// since refusing it would strand it. Backpressure lives in the transaction
/// pool instead.
#[derive(Debug)]
pub(crate) struct ReadyQueues {
    queues: [Mutex<VecDeque<JobRef>>; Priority::COUNT],
}

impl ReadyQueues {
    pub(crate) fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
        }
    }

    #[inline]
    fn queue(&self, priority: Priority) -> &Mutex<VecDeque<JobRef>> {
        &self.queues[priority.as_index()]
    }

    pub(crate) fn push(&self, job: JobRef) {
        self.queue(job.priority()).lock().push_back(job);
    }

    /// Return a job that could not be dispatched to the head of its queue,
    /// so it keeps its place ahead of later submissions.
    pub(crate) fn push_front(&self, job: JobRef) {
        self.queue(job.priority()).lock().push_front(job);
    }

    /// Pop the front of the highest-priority non-empty queue.
    pub(crate) fn pop(&self) -> Option<JobRef> {
        Priority::DESCENDING
            .into_iter()
            .find_map(|priority| self.queue(priority).lock().pop_front())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queues.iter().map(|queue| queue.lock().len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queues.iter().all(|queue| queue.lock().is_empty())
    }

    /// Remove every queued job, returning how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        self.queues
            .iter()
            .map(|queue| {
                let mut queue = queue.lock();
                let len = queue.len();
                queue.clear();
                len
            })
            .sum()
    }
}
