use crate::{
    config::{ExecutionMode, SchedulerConfig},
    event::Event,
    executor::{Executor, SchedulerError, SchedulingPass, worker::Worker},
    graph::{Graph, JobRef},
    ready::ReadyQueues,
    sync::{self, Arc, AtomicBool, JoinHandle, Ordering},
    transaction::{SlotId, TransactionQueue},
    types::JobId,
};
use tracing::{debug, error, info, trace, warn};

/// Worker pool fed by a dedicated scheduling thread.
///
/// `schedule` only pushes onto a ready queue and requests a scheduling pass.
/// The scheduling thread owns the pass: it moves ready jobs into transaction
/// slots and, once a worker flags a slot completed, retires the job there,
/// which readies its dependents. A job built with
/// [`Job::on_worker`](crate::job::Job::on_worker) is published for that
/// worker alone. Dropping the executor stops the scheduling
/// thread, aborts the transaction queue and joins every worker; jobs still
/// queued at that point never run.
#[derive(Debug)]
pub struct ThreadPoolExecutor {
    shared: Arc<Shared>,
    scheduler: Option<JoinHandle<()>>,
    workers: Vec<Worker>,
}

/// State reachable from the scheduling thread, the workers and submitters.
#[derive(Debug)]
pub(super) struct Shared {
    ready: ReadyQueues,
    pub(super) transactions: TransactionQueue,
    pass: SchedulingPass,
    /// Size of the pool; worker targets wrap around it.
    worker_count: usize,
    /// Doorbell of the scheduling thread.
    wakeup: Event,
    exit: AtomicBool,
}

impl Shared {
    fn enqueue(&self, job: JobRef) {
        trace!(job = %job.id, priority = %job.priority(), "job ready");
        self.ready.push(job);
        self.request_pass();
    }

    /// Register that a pass may find work, waking the scheduling thread if
    /// no pass is pending.
    pub(super) fn request_pass(&self) {
        if self.pass.request() {
            self.wakeup.set();
        }
    }

    fn scheduler_loop(&self) {
        let mut pending = Vec::with_capacity(self.transactions.capacity());
        debug!("scheduling thread started");
        loop {
            self.wakeup.wait();
            if self.exit.load(Ordering::Acquire) {
                break;
            }
            self.pass.service(|| self.drain_once(&mut pending));
        }
        debug!(in_flight = pending.len(), "scheduling thread exiting");
    }

    /// One iteration of the scheduling pass: reap completed transactions,
    /// then dispatch ready jobs until the queues or the slot pool run dry.
    fn drain_once(&self, pending: &mut Vec<SlotId>) {
        if self.exit.load(Ordering::Acquire) {
            return;
        }

        pending.retain(|&slot_id| {
            let slot = self.transactions.slot(slot_id);
            if !slot.is_completed() {
                return true;
            }
            let job = slot
                .take_job()
                .expect("Shared::drain_once: completed slot without a job");
            self.retire(&job);
            self.transactions.dealloc(slot_id);
            false
        });

        while let Some(job) = self.ready.pop() {
            if job.is_barrier() {
                self.retire(&job);
                continue;
            }
            let Some(slot_id) = self.transactions.alloc(false) else {
                trace!(job = %job.id, "transaction pool exhausted, deferring");
                self.ready.push_front(job);
                break;
            };
            let target = job.worker().map(|worker| worker % self.worker_count);
            self.transactions.slot(slot_id).set_job(job.clone());
            if !self.transactions.push(slot_id, target, false) {
                self.transactions.dealloc(slot_id);
                self.ready.push_front(job);
                break;
            }
            trace!(job = %job.id, slot = %slot_id, worker = ?target, "dispatched");
            pending.push(slot_id);
        }
    }

    /// Dependents readied here go straight onto the ready queues; the
    /// running pass dispatches them before it exits.
    fn retire(&self, job: &JobRef) {
        let JobRef { graph, id } = job;
        trace!(job = %id, "retiring");
        graph.on_executed(*id, |dependent| {
            self.ready.push(JobRef::new(graph, dependent));
        });
    }
}

impl ThreadPoolExecutor {
    /// Spawn `config.resolved_worker_count()` workers and the scheduling
    /// thread.
    ///
    /// # Errors
    /// If a thread cannot be spawned. Threads that were already started are
    /// shut down before returning.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let worker_count = config.resolved_worker_count();
        let shared = Arc::new(Shared {
            ready: ReadyQueues::new(),
            transactions: TransactionQueue::new(config.transaction_capacity.get()),
            pass: SchedulingPass::new(),
            worker_count,
            wakeup: Event::auto_reset(),
            exit: AtomicBool::new(false),
        });
        let mut executor = Self {
            shared,
            scheduler: None,
            workers: Vec::with_capacity(worker_count),
        };

        let cores = sync::core_ids();
        for index in 0..worker_count {
            let worker = Worker::spawn(
                index,
                format!("{}-worker-{index}", config.thread_name),
                config.affinity.core_for(index, &cores),
                executor.shared.clone(),
            )
            .map_err(|source| SchedulerError::WorkerSpawn { index, source })?;
            executor.workers.push(worker);
        }

        let shared = executor.shared.clone();
        let scheduler = sync::spawn(format!("{}-scheduler", config.thread_name), move || {
            shared.scheduler_loop();
        })
        .map_err(SchedulerError::SchedulerSpawn)?;
        executor.scheduler = Some(scheduler);

        info!(
            workers = worker_count,
            transaction_capacity = config.transaction_capacity.get(),
            "thread pool started"
        );
        Ok(executor)
    }
}

impl Executor for ThreadPoolExecutor {
    fn schedule(&self, graph: &Arc<Graph>, id: JobId) {
        if graph.submit(id) {
            self.shared.enqueue(JobRef::new(graph, id));
        }
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn worker_cores(&self) -> Vec<Option<usize>> {
        self.workers.iter().map(Worker::core).collect()
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Threaded
    }
}

impl Drop for ThreadPoolExecutor {
    /// The scheduling thread stops producing first; aborting the queue then
    /// releases workers blocked in `pop`, and no published job starts after
    /// that.
    fn drop(&mut self) {
        let Self {
            shared,
            scheduler,
            workers,
        } = self;

        shared.exit.store(true, Ordering::Release);
        shared.wakeup.set();
        if let Some(scheduler) = scheduler.take() {
            if scheduler.join().is_err() {
                error!("scheduling thread panicked");
            }
        }

        shared.transactions.abort();
        for worker in workers.drain(..) {
            worker.join();
        }

        let abandoned = shared.ready.clear();
        let undelivered = shared.transactions.undelivered();
        if abandoned > 0 || undelivered > 0 {
            warn!(abandoned, undelivered, "thread pool stopped with unfinished jobs");
        }
        info!("thread pool stopped");
    }
}
