use crate::{
    config::ExecutionMode,
    executor::{Executor, SchedulingPass, execute_isolated},
    graph::{Graph, JobRef},
    ready::ReadyQueues,
    sync::Arc,
    types::JobId,
};
use tracing::trace;

/// Executes every job synchronously on the thread that submitted it.
///
/// Uses the same ready queues and pass guard as the threaded executor, so
/// readiness, priority, and FIFO order come out identical; deep dependency
/// chains are drained iteratively rather than by recursion. A payload that
/// schedules more work only enqueues it, and the outer pass picks it up.
/// Worker targets set with [`Job::on_worker`](crate::job::Job::on_worker)
/// are ignored.
#[derive(Debug)]
pub struct InlineExecutor {
    ready: ReadyQueues,
    pass: SchedulingPass,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self {
            ready: ReadyQueues::new(),
            pass: SchedulingPass::new(),
        }
    }

    fn do_scheduling(&self) {
        if self.pass.request() {
            self.pass.service(|| self.drain());
        }
    }

    fn drain(&self) {
        while let Some(job) = self.ready.pop() {
            if !job.is_barrier() {
                trace!(job = %job.id, "executing inline");
                execute_isolated(&job);
            }
            let JobRef { graph, id } = &job;
            graph.on_executed(*id, |dependent| {
                self.ready.push(JobRef::new(graph, dependent));
            });
        }
    }
}

impl Default for InlineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for InlineExecutor {
    fn schedule(&self, graph: &Arc<Graph>, id: JobId) {
        if graph.submit(id) {
            self.ready.push(JobRef::new(graph, id));
            self.do_scheduling();
        }
    }

    fn worker_count(&self) -> usize {
        1
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::{graph::JobGraph, job::Job, types::Priority};
    use parking_lot::Mutex;

    #[test]
    fn chain_runs_to_completion_inside_schedule() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = JobGraph::new();
        let ids: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                builder.add_job(Job::new(Priority::Normal, move || log.lock().push(i)))
            })
            .collect();
        for pair in ids.windows(2) {
            builder.add_dependency(pair[0], pair[1]);
        }
        let graph = Arc::new(builder.freeze());

        let executor = InlineExecutor::new();
        executor.schedule(&graph, ids[0]);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
        assert!(ids.iter().all(|&id| graph.is_retired(id)));
        // Dependents were enqueued automatically; submitting them afterwards
        // is harmless.
        executor.schedule(&graph, ids[3]);
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn scheduling_a_blocked_job_defers_it() {
        let mut builder = JobGraph::new();
        let a = builder.add_job(Job::new(Priority::Normal, || {}));
        let b = builder.add_job(Job::new(Priority::Normal, || {}));
        builder.add_dependency(a, b);
        let graph = Arc::new(builder.freeze());

        let executor = InlineExecutor::new();
        executor.schedule(&graph, b);
        assert_eq!(graph.dependency_count(b), 2);
        assert!(!graph.status(b).is_finished());
        executor.schedule(&graph, a);
        assert!(graph.is_retired(b));
    }
}
