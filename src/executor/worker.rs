use crate::{
    executor::{execute_isolated, pool::Shared},
    sync::{self, Arc, JoinHandle},
};
use std::io;
use tracing::{debug, error, warn};

/// A pool thread that pops transactions, runs their job and flags them
/// completed until the transaction queue is aborted.
#[derive(Debug)]
pub(super) struct Worker {
    index: usize,
    core: Option<usize>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(super) fn spawn(
        index: usize,
        name: String,
        core: Option<usize>,
        shared: Arc<Shared>,
    ) -> io::Result<Self> {
        let handle = sync::spawn(name, move || {
            if let Some(core) = core {
                if sync::pin_current_thread(core) {
                    debug!(worker = index, core, "pinned worker thread");
                } else {
                    warn!(worker = index, core, "failed to pin worker thread");
                }
            }
            Self::run_loop(index, &shared);
        })?;
        Ok(Self {
            index,
            core,
            handle: Some(handle),
        })
    }

    pub(super) fn core(&self) -> Option<usize> {
        self.core
    }

    fn run_loop(index: usize, shared: &Shared) {
        debug!(worker = index, "worker started");
        let transactions = &shared.transactions;
        while let Some(slot_id) = transactions.pop(index, true) {
            let slot = transactions.slot(slot_id);
            let job = slot
                .job()
                .expect("Worker::run_loop: published slot without a job");
            execute_isolated(&job);
            drop(job);
            slot.mark_completed();
            shared.request_pass();
        }
        debug!(worker = index, "worker exiting");
    }

    pub(super) fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(worker = self.index, "worker thread panicked");
            }
        }
    }
}
