mod inline;
mod pool;
mod worker;

pub use crate::executor::{inline::InlineExecutor, pool::ThreadPoolExecutor};
use crate::{
    config::ExecutionMode,
    graph::{Graph, GraphSetupError, JobRef},
    sync::{Arc, AtomicUsize, Ordering},
    types::{JobId, JobStatus},
};
use std::{any::Any, io, panic};
use thiserror::Error;
use tracing::warn;

/// Error returned when a scheduler cannot be built or a graph is rejected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error(transparent)]
    Setup(#[from] GraphSetupError),
    #[error("failed to spawn worker thread {index}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn the scheduling thread")]
    SchedulerSpawn(#[source] io::Error),
}

/// Submission interface shared by every execution strategy.
pub trait Executor: Send + Sync {
    /// Submit `id` of `graph`.
    ///
    /// A job whose dependency count is 1 is enqueued right away. A job that
    /// still waits on prerequisites is enqueued automatically when the last
    /// of them retires, so this call is only required for the roots of a
    /// graph. Submitting a job that was already enqueued that way, or has
    /// already run, is accepted and does nothing.
    ///
    /// # Panics
    /// If the same job is submitted twice.
    fn schedule(&self, graph: &Arc<Graph>, id: JobId);

    /// Threads executing payloads; `1` for the inline executor.
    fn worker_count(&self) -> usize;

    /// CPU each worker was asked to pin to, by worker index.
    fn worker_cores(&self) -> Vec<Option<usize>> {
        vec![None; self.worker_count()]
    }

    fn mode(&self) -> ExecutionMode;
}

/// Single-runner guard of the scheduling pass.
///
/// Every caller that may have produced work registers a request. Only the
/// caller that moves the counter from 0 to 1 is told to start a runner; the
/// runner keeps servicing until it has consumed every request, including
/// those that arrived while it was draining. No other caller ever drains.
#[derive(Debug)]
pub(crate) struct SchedulingPass {
    requests: AtomicUsize,
}

impl SchedulingPass {
    pub(crate) fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
        }
    }

    /// Returns `true` if the caller must start the runner.
    #[must_use]
    pub(crate) fn request(&self) -> bool {
        self.requests.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Run `body` until no request is left unserviced.
    pub(crate) fn service(&self, mut body: impl FnMut()) {
        loop {
            let seen = self.requests.load(Ordering::Acquire);
            body();
            if self.requests.fetch_sub(seen, Ordering::AcqRel) == seen {
                return;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }
}

/// Run a job's payload, turning a panic into [`JobStatus::Panicked`] so the
/// calling thread survives and the job can still be retired.
pub(crate) fn execute_isolated(job: &JobRef) {
    let JobRef { graph, id } = job;
    let id = *id;
    match panic::catch_unwind(panic::AssertUnwindSafe(|| graph.execute(id))) {
        Ok(JobStatus::Failed(error)) => {
            warn!(job = %id, name = graph.name(id), %error, "job failed");
        }
        Ok(_) => {}
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(job = %id, name = graph.name(id), panic = %message, "job panicked");
            graph.record_panic(id, message);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::{graph::JobGraph, job::Job, types::Priority};

    #[test]
    fn only_the_first_request_starts_a_runner() {
        let pass = SchedulingPass::new();
        assert!(pass.request());
        assert!(!pass.request());
        assert_eq!(pass.pending(), 2);

        let mut rounds = 0;
        pass.service(|| {
            rounds += 1;
            // A request registered mid-drain forces one more round.
            if rounds == 1 {
                assert!(!pass.request());
            }
        });
        assert_eq!(rounds, 2);
        assert_eq!(pass.pending(), 0);
        assert!(pass.request());
    }

    #[test]
    fn panics_and_errors_are_recorded() {
        let mut builder = JobGraph::new();
        let ok = builder.add_job(Job::new(Priority::Normal, || {}));
        let failing = builder.add_job(Job::fallible(Priority::Normal, || Err("disk full")));
        let panicking = builder.add_job(Job::new(Priority::Normal, || panic!("boom")).named("p"));
        let graph = Arc::new(builder.freeze());

        for id in [ok, failing, panicking] {
            execute_isolated(&JobRef::new(&graph, id));
        }
        assert_eq!(graph.status(ok), JobStatus::Succeeded);
        assert_eq!(graph.status(failing), JobStatus::Failed("disk full".to_owned()));
        assert_eq!(graph.status(panicking), JobStatus::Panicked("boom".to_owned()));
    }
}
