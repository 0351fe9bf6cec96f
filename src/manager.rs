use crate::{
    config::{ExecutionMode, SchedulerConfig},
    executor::{Executor, InlineExecutor, SchedulerError, ThreadPoolExecutor},
    graph::{Graph, JobGraph},
    sync::Arc,
    types::JobId,
};
use derive_more::Debug;
use tracing::info;

/// Entry point of the scheduler: owns the executor selected by
/// [`SchedulerConfig::mode`] and validates graphs before they run.
///
/// Dropping the manager shuts the executor down; see
/// [`ThreadPoolExecutor`] for the shutdown order.
#[must_use]
#[derive(Debug)]
pub struct Manager {
    #[debug(skip)]
    executor: Box<dyn Executor>,
    detect_cycles: bool,
}

impl Manager {
    /// # Errors
    /// If the worker pool cannot be spawned.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let executor: Box<dyn Executor> = match config.mode {
            ExecutionMode::Threaded => Box::new(ThreadPoolExecutor::new(&config)?),
            ExecutionMode::Inline => Box::new(InlineExecutor::new()),
        };
        info!(
            mode = ?config.mode,
            workers = executor.worker_count(),
            detect_cycles = config.detect_cycles,
            "job manager ready"
        );
        Ok(Self {
            executor,
            detect_cycles: config.detect_cycles,
        })
    }

    /// # Errors
    /// If the worker pool cannot be spawned.
    pub fn with_defaults() -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::default())
    }

    /// Wrap a custom [`Executor`].
    pub fn from_executor(executor: impl Executor + 'static, detect_cycles: bool) -> Self {
        Self {
            executor: Box::new(executor),
            detect_cycles,
        }
    }

    /// Freeze `graph` so its jobs can be scheduled. Nothing runs yet.
    ///
    /// # Errors
    /// [`GraphSetupError::Cycle`](crate::graph::GraphSetupError::Cycle) if
    /// cycle detection is enabled and the graph is cyclic.
    pub fn submit(&self, graph: JobGraph) -> Result<Arc<Graph>, SchedulerError> {
        if self.detect_cycles {
            graph.find_cycle()?;
        }
        Ok(Arc::new(graph.freeze()))
    }

    /// Submit one job of a graph returned by [`submit`](Self::submit).
    ///
    /// # Panics
    /// If the job was already scheduled.
    pub fn schedule(&self, graph: &Arc<Graph>, id: JobId) {
        self.executor.schedule(graph, id);
    }

    /// [`submit`](Self::submit) `graph` and schedule every node in insertion
    /// order.
    ///
    /// # Errors
    /// See [`submit`](Self::submit).
    pub fn run(&self, graph: JobGraph) -> Result<Arc<Graph>, SchedulerError> {
        let graph = self.submit(graph)?;
        for id in graph.ids() {
            self.schedule(&graph, id);
        }
        Ok(graph)
    }

    pub fn worker_count(&self) -> usize {
        self.executor.worker_count()
    }

    /// CPU id each worker was asked to pin to; `None` for unpinned workers.
    pub fn worker_cores(&self) -> Vec<Option<usize>> {
        self.executor.worker_cores()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.executor.mode()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::{
        graph::GraphSetupError,
        job::Job,
        types::{JobStatus, Priority},
    };
    use std::num::NonZeroUsize;

    #[test]
    fn cyclic_graph_is_rejected_when_detection_is_on() {
        let manager = Manager::new(SchedulerConfig::inline().with_cycle_detection(true)).unwrap();
        let mut graph = JobGraph::new();
        let a = graph.add_job(Job::new(Priority::Normal, || {}));
        let b = graph.add_job(Job::new(Priority::Normal, || {}));
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let err = manager.run(graph).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Setup(GraphSetupError::Cycle { ref path }) if path.len() == 3
        ));
    }

    #[test]
    fn threaded_manager_reports_its_workers() {
        let manager = Manager::new(
            SchedulerConfig::default()
                .with_mode(ExecutionMode::Threaded)
                .with_workers(NonZeroUsize::new(2).unwrap()),
        )
        .unwrap();
        assert_eq!(manager.worker_count(), 2);
        assert_eq!(manager.mode(), ExecutionMode::Threaded);

        let mut graph = JobGraph::new();
        let job = graph.add_job(Job::new(Priority::High, || {}).with_sync());
        let graph = manager.run(graph).unwrap();
        graph.sync(job);
        assert_eq!(graph.status(job), JobStatus::Succeeded);
    }

    #[test]
    fn custom_executor_is_used() {
        let manager = Manager::from_executor(InlineExecutor::new(), false);
        assert_eq!(manager.mode(), ExecutionMode::Inline);
        assert_eq!(manager.worker_count(), 1);
        assert_eq!(manager.worker_cores(), vec![None]);
    }
}
