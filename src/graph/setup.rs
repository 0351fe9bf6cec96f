use crate::{
    event::Event,
    graph::{Graph, Node, NodeKind},
    job::{Job, Payload},
    sync::{Arc, AtomicBool, AtomicUsize, Mutex},
    types::{JobId, JobStatus, Priority},
};
use thiserror::Error;

/// Error kind for graph validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphSetupError {
    /// The dependency graph contains a cycle. `path` lists the nodes on it,
    /// starting and ending with the same handle.
    #[error("graph contains a cycle: {}", format_path(path))]
    Cycle { path: Vec<JobId> },
}

fn format_path(path: &[JobId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Handles of a job fanned out by [`JobGraph::add_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Barrier every job of the batch depends on.
    pub start: JobId,
    /// One job per index, in index order.
    pub jobs: Vec<JobId>,
    /// Barrier that retires once every job has.
    pub done: JobId,
}

/// Single-threaded builder of a job dependency graph.
///
/// Nodes are appended with [`add_job`](Self::add_job) or
/// [`add_barrier`](Self::add_barrier) and linked with
/// [`add_dependency`](Self::add_dependency). Handing the builder to
/// [`Manager::submit`](crate::manager::Manager::submit) freezes it, so the
/// graph can no longer change once any of its nodes may run.
#[must_use]
#[derive(Debug, Default)]
pub struct JobGraph {
    nodes: Vec<NodeSetup>,
}

#[derive(derive_more::Debug)]
struct NodeSetup {
    #[debug(skip)]
    payload: Option<Payload>,
    priority: Priority,
    name: Option<String>,
    sync: bool,
    worker: Option<usize>,
    /// Number of prerequisites registered so far.
    predecessors: usize,
    dependents: Vec<JobId>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn add_job(&mut self, job: Job) -> JobId {
        let Job {
            priority,
            name,
            sync,
            worker,
            payload,
        } = job;
        self.push(NodeSetup {
            payload: Some(payload),
            priority,
            name,
            sync,
            worker,
            predecessors: 0,
            dependents: vec![],
        })
    }

    /// Add a payload-less node that completes as soon as all of its
    /// prerequisites have. Barriers always support
    /// [`Graph::sync`](crate::graph::Graph::sync).
    pub fn add_barrier(&mut self) -> JobId {
        self.push(NodeSetup {
            payload: None,
            priority: Priority::Critical,
            name: None,
            sync: true,
            worker: None,
            predecessors: 0,
            dependents: vec![],
        })
    }

    /// Fan `f` out into `count` jobs, job `i` calling `f(i)`.
    ///
    /// The jobs sit between two barriers: link prerequisites of the whole
    /// batch to [`Batch::start`] and dependents to [`Batch::done`], which is
    /// also the handle to [`sync`](crate::graph::Graph::sync) on.
    pub fn add_batch(
        &mut self,
        priority: Priority,
        count: usize,
        f: impl Fn(usize) + Send + Sync + 'static,
    ) -> Batch {
        let f = Arc::new(f);
        let start = self.add_barrier();
        let jobs: Vec<_> = (0..count)
            .map(|index| {
                let f = f.clone();
                let job = self.add_job(Job::new(priority, move || f(index)));
                self.add_dependency(start, job);
                job
            })
            .collect();
        let done = self.add_barrier();
        if jobs.is_empty() {
            self.add_dependency(start, done);
        }
        for &job in &jobs {
            self.add_dependency(job, done);
        }
        Batch { start, jobs, done }
    }

    fn push(&mut self, node: NodeSetup) -> JobId {
        let id = JobId::from_index(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Register `prerequisite` as a dependency of `dependent`: `dependent`
    /// becomes ready only after `prerequisite` has completed.
    ///
    /// # Panics
    /// If either handle was not issued by this builder, or if both are the
    /// same node.
    pub fn add_dependency(&mut self, prerequisite: JobId, dependent: JobId) {
        let len = self.nodes.len();
        assert!(
            prerequisite.index() < len,
            "Job {prerequisite} is not part of this graph"
        );
        assert!(
            dependent.index() < len,
            "Job {dependent} is not part of this graph"
        );
        assert_ne!(prerequisite, dependent, "Job {dependent} depends on itself");
        self.nodes[dependent.index()].predecessors += 1;
        self.nodes[prerequisite.index()].dependents.push(dependent);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first search over the dependents lists.
    ///
    /// # Errors
    /// [`GraphSetupError::Cycle`] with one offending cycle if the graph is
    /// not acyclic.
    pub fn find_cycle(&self) -> Result<(), GraphSetupError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        // (node, index of the next dependent to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::OnStack;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                let Some(&child) = self.nodes[node].dependents.get(next) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                top.1 += 1;
                let child = child.index();
                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::OnStack;
                        stack.push((child, 0));
                    }
                    Mark::OnStack => {
                        let start = stack
                            .iter()
                            .position(|&(n, _)| n == child)
                            .expect("JobGraph::find_cycle: [1]");
                        let mut path: Vec<_> = stack[start..]
                            .iter()
                            .map(|&(n, _)| JobId::from_index(n))
                            .collect();
                        path.push(JobId::from_index(child));
                        return Err(GraphSetupError::Cycle { path });
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    /// Materialize the runtime arena. Every count starts at
    /// `predecessors + 1`; the extra unit is the submission credit.
    pub(crate) fn freeze(self) -> Graph {
        let nodes = self
            .nodes
            .into_iter()
            .map(|setup| {
                let NodeSetup {
                    payload,
                    priority,
                    name,
                    sync,
                    worker,
                    predecessors,
                    dependents,
                } = setup;
                Node {
                    kind: match payload {
                        Some(payload) => NodeKind::Job(Mutex::new(Some(payload))),
                        None => NodeKind::Barrier,
                    },
                    priority,
                    name,
                    worker,
                    dependency_count: AtomicUsize::new(predecessors + 1),
                    dependents,
                    completion: sync.then(Event::manual_reset),
                    submitted: AtomicBool::new(false),
                    scheduled: AtomicBool::new(false),
                    status: Mutex::new(JobStatus::Pending),
                }
            })
            .collect();
        Graph { nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Job {
        Job::new(Priority::Normal, || {})
    }

    #[test]
    fn cycle_is_reported_with_its_path() {
        //   A -> B -> C
        //        ^    |
        //        +----+
        let mut graph = JobGraph::new();
        let a = graph.add_job(noop());
        let b = graph.add_job(noop());
        let c = graph.add_job(noop());
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);
        graph.add_dependency(c, b);

        let err = graph.find_cycle().unwrap_err();
        assert_eq!(err, GraphSetupError::Cycle { path: vec![b, c, b] });
        assert_eq!(err.to_string(), "graph contains a cycle: #1 -> #2 -> #1");
    }

    #[test]
    fn diamond_is_acyclic() {
        let mut graph = JobGraph::new();
        let a = graph.add_job(noop());
        let b = graph.add_job(noop());
        let c = graph.add_job(noop());
        let d = graph.add_barrier();
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);
        assert_eq!(graph.find_cycle(), Ok(()));
    }

    #[test]
    #[should_panic(expected = "depends on itself")]
    fn self_dependency_panics() {
        let mut graph = JobGraph::new();
        let a = graph.add_job(noop());
        graph.add_dependency(a, a);
    }

    #[test]
    #[should_panic(expected = "is not part of this graph")]
    fn foreign_handle_panics() {
        let mut graph = JobGraph::new();
        let a = graph.add_job(noop());
        graph.add_dependency(a, JobId::from_index(5));
    }

    #[test]
    fn batch_is_framed_by_two_barriers() {
        let mut graph = JobGraph::new();
        let before = graph.add_job(noop());
        let batch = graph.add_batch(Priority::High, 3, |_| {});
        let after = graph.add_job(noop());
        graph.add_dependency(before, batch.start);
        graph.add_dependency(batch.done, after);

        assert_eq!(batch.jobs.len(), 3);
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.nodes[batch.done.index()].predecessors, 3);
        for &job in &batch.jobs {
            let node = &graph.nodes[job.index()];
            assert_eq!(node.priority, Priority::High);
            assert_eq!(node.predecessors, 1);
        }
        assert_eq!(graph.find_cycle(), Ok(()));

        let empty = graph.add_batch(Priority::Low, 0, |_| {});
        assert!(empty.jobs.is_empty());
        assert_eq!(graph.nodes[empty.done.index()].predecessors, 1);
    }

    #[cfg(not(feature = "loom"))]
    #[test]
    fn freeze_adds_the_submission_credit() {
        let mut graph = JobGraph::new();
        let a = graph.add_job(noop());
        let b = graph.add_job(noop());
        let c = graph.add_job(noop().with_sync());
        graph.add_dependency(a, c);
        graph.add_dependency(b, c);

        let graph = graph.freeze();
        assert_eq!(graph.dependency_count(a), 1);
        assert_eq!(graph.dependency_count(c), 3);
        assert!(graph.has_sync(c));
        assert!(!graph.has_sync(a));
    }
}
