mod setup;

pub use crate::graph::setup::{Batch, GraphSetupError, JobGraph};
use crate::{
    event::Event,
    job::Payload,
    sync::{Arc, AtomicBool, AtomicUsize, Mutex, Ordering, fence},
    types::{JobId, JobStatus, Priority},
};
use derive_more::Debug;

/// Frozen dependency graph shared by the application and the executor.
///
/// Nodes live in a single arena and refer to each other by [`JobId`], so a
/// node is never freed while a dependent could still reach it: the arena is
/// dropped with the last `Arc<Graph>`.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
}

#[derive(Debug)]
pub(crate) struct Node {
    kind: NodeKind,
    priority: Priority,
    name: Option<String>,
    /// Pool worker the node is routed to, before wrapping.
    worker: Option<usize>,
    /// Unmet prerequisites plus the submission credit: `1` means ready, `0`
    /// means retired.
    dependency_count: AtomicUsize,
    /// Nodes whose count is decremented when this one retires.
    dependents: Vec<JobId>,
    /// Present only for nodes built with blocking support.
    completion: Option<Event>,
    /// Set by the first user-facing `schedule`.
    submitted: AtomicBool,
    /// Set by whichever path enqueues the node. Never cleared.
    scheduled: AtomicBool,
    status: Mutex<JobStatus>,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Job(#[debug(skip)] Mutex<Option<Payload>>),
    Barrier,
}

/// A node of a specific graph, as carried through ready queues and
/// transaction slots.
#[derive(Debug, Clone)]
pub(crate) struct JobRef {
    pub(crate) graph: Arc<Graph>,
    pub(crate) id: JobId,
}

impl JobRef {
    pub(crate) fn new(graph: &Arc<Graph>, id: JobId) -> Self {
        Self {
            graph: graph.clone(),
            id,
        }
    }

    pub(crate) fn priority(&self) -> Priority {
        self.graph.priority(self.id)
    }

    pub(crate) fn is_barrier(&self) -> bool {
        self.graph.is_barrier(self.id)
    }

    pub(crate) fn worker(&self) -> Option<usize> {
        self.graph.worker(self.id)
    }
}

impl Graph {
    #[inline]
    fn node(&self, id: JobId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every handle of this graph in insertion order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = JobId> + use<> {
        (0..self.nodes.len()).map(JobId::from_index)
    }

    pub fn dependency_count(&self, id: JobId) -> usize {
        self.node(id).dependency_count.load(Ordering::Acquire)
    }

    pub fn priority(&self, id: JobId) -> Priority {
        self.node(id).priority
    }

    pub fn name(&self, id: JobId) -> Option<&str> {
        self.node(id).name.as_deref()
    }

    /// Worker requested with [`Job::on_worker`](crate::job::Job::on_worker).
    pub fn worker(&self, id: JobId) -> Option<usize> {
        self.node(id).worker
    }

    pub fn status(&self, id: JobId) -> JobStatus {
        self.node(id).status.lock().clone()
    }

    /// `true` once the node has run and notified its dependents.
    pub fn is_retired(&self, id: JobId) -> bool {
        self.dependency_count(id) == 0
    }

    pub fn is_barrier(&self, id: JobId) -> bool {
        matches!(self.node(id).kind, NodeKind::Barrier)
    }

    pub fn has_sync(&self, id: JobId) -> bool {
        self.node(id).completion.is_some()
    }

    /// Block the calling thread until the node has been retired.
    ///
    /// # Panics
    /// If the node was built without blocking support (see
    /// [`Job::with_sync`](crate::job::Job::with_sync)).
    pub fn sync(&self, id: JobId) {
        let Some(completion) = &self.node(id).completion else {
            panic!("Job {id} was not built with sync support");
        };
        completion.wait();
    }

    /// Record the user-facing submission of `id`.
    ///
    /// Returns `true` if the caller claimed the node and must enqueue it.
    /// A node that the automatic path already enqueued, or even retired, is
    /// only marked submitted: `Manager::run` relies on that when the inline
    /// executor drains dependents inside the call that scheduled the root.
    ///
    /// # Panics
    /// If `id` was already submitted.
    pub(crate) fn submit(&self, id: JobId) -> bool {
        let node = self.node(id);
        let twice = node.submitted.swap(true, Ordering::AcqRel);
        assert!(!twice, "Job {id} is scheduled twice");
        node.dependency_count.load(Ordering::Acquire) == 1 && self.claim(id)
    }

    /// The only path into a ready queue. Guarantees single enqueue even when
    /// a submission races with the last prerequisite's retirement.
    fn claim(&self, id: JobId) -> bool {
        self.node(id)
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the payload of `id` on the calling thread and record the outcome.
    ///
    /// A panic in the payload is not caught here.
    ///
    /// # Panics
    /// If `id` is a barrier or has already been executed.
    pub(crate) fn execute(&self, id: JobId) -> JobStatus {
        let node = self.node(id);
        let NodeKind::Job(payload) = &node.kind else {
            panic!("Job {id} is a barrier and has no payload");
        };
        let payload = payload
            .lock()
            .take()
            .unwrap_or_else(|| panic!("Job {id} is executed twice"));
        let status = match payload() {
            Ok(()) => JobStatus::Succeeded,
            Err(err) => JobStatus::Failed(err.to_string()),
        };
        *node.status.lock() = status.clone();
        status
    }

    pub(crate) fn record_panic(&self, id: JobId, message: String) {
        *self.node(id).status.lock() = JobStatus::Panicked(message);
    }

    /// Hook run by the executor once it has observed that `id` finished.
    pub(crate) fn on_executed(&self, id: JobId, on_ready: impl FnMut(JobId)) {
        self.dependency_ready(id, on_ready);
    }

    /// Retire `id`: decrement every dependent, hand each one that became
    /// ready (and was claimed here) to `on_ready`, then release waiters.
    fn dependency_ready(&self, id: JobId, mut on_ready: impl FnMut(JobId)) {
        let node = self.node(id);
        if let NodeKind::Barrier = node.kind {
            *node.status.lock() = JobStatus::Succeeded;
        }

        // Publish everything this node wrote before dependents can observe
        // their decremented counters.
        if !node.dependents.is_empty() {
            fence(Ordering::Release);
        }
        for &dependent in &node.dependents {
            if self.decrement_dependency(dependent) && self.claim(dependent) {
                on_ready(dependent);
            }
        }

        let prev = node.dependency_count.fetch_sub(1, Ordering::AcqRel);
        assert_eq!(prev, 1, "Job {id} retired while not ready");
        if let Some(completion) = &node.completion {
            completion.set();
        }
    }

    /// Returns `true` if this decrement made `id` ready.
    fn decrement_dependency(&self, id: JobId) -> bool {
        let prev = self
            .node(id)
            .dependency_count
            .fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 1, "Job {id} dependency count underflow");
        if prev == 2 {
            // Pairs with the release fence of every prerequisite.
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }
}
