use crate::types::{JobError, Priority};
use derive_more::Debug;

pub(crate) type Payload = Box<dyn FnOnce() -> Result<(), JobError> + Send + 'static>;

/// Description of a unit of work, consumed by
/// [`JobGraph::add_job`](crate::graph::JobGraph::add_job).
///
/// The payload is invoked exactly once, on whichever thread the executor
/// picks. An `Err` return or a panic is recorded against the job; it never
/// stops the job's dependents from running.
#[must_use]
#[derive(Debug)]
pub struct Job {
    pub(crate) priority: Priority,
    pub(crate) name: Option<String>,
    pub(crate) sync: bool,
    pub(crate) worker: Option<usize>,
    #[debug(skip)]
    pub(crate) payload: Payload,
}

impl Job {
    /// A job whose payload cannot fail.
    pub fn new(priority: Priority, f: impl FnOnce() + Send + 'static) -> Self {
        Self::from_payload(
            priority,
            Box::new(move || {
                f();
                Ok(())
            }),
        )
    }

    /// A job whose payload reports failure through `Err`.
    pub fn fallible<E>(priority: Priority, f: impl FnOnce() -> Result<(), E> + Send + 'static) -> Self
    where
        E: Into<JobError>,
    {
        Self::from_payload(priority, Box::new(move || f().map_err(Into::into)))
    }

    fn from_payload(priority: Priority, payload: Payload) -> Self {
        Self {
            priority,
            name: None,
            sync: false,
            worker: None,
            payload,
        }
    }

    /// Name shown in log records.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allocate a completion event so that
    /// [`Graph::sync`](crate::graph::Graph::sync) can block on this job.
    pub fn with_sync(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Run this job only on pool worker `index`, taken modulo the number of
    /// workers. Ignored by the inline executor.
    pub fn on_worker(mut self, index: usize) -> Self {
        self.worker = Some(index);
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}
