use derive_more::Debug;
use std::{num::NonZeroUsize, sync::Arc};

/// How a [`Manager`](crate::manager::Manager) runs jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Worker pool plus a dedicated scheduling thread.
    Threaded,
    /// Everything happens on the thread that calls `schedule`.
    Inline,
}

impl Default for ExecutionMode {
    /// `Inline` when built with the `single-thread` feature, `Threaded`
    /// otherwise.
    fn default() -> Self {
        if cfg!(feature = "single-thread") {
            Self::Inline
        } else {
            Self::Threaded
        }
    }
}

/// Which CPU each worker is pinned to. Pinning is best-effort.
///
/// Cores are OS CPU ids drawn from the process affinity mask, so a process
/// started under `taskset -c 4-7` pins its workers to CPUs 4 to 7.
#[derive(Debug, Clone, Default)]
pub enum Affinity {
    /// Leave placement to the OS.
    #[default]
    Unpinned,
    /// Worker `i` runs on the `i % n`-th of the `n` CPUs the process may use.
    PerCore,
    /// Map a worker index to an affinity mask of CPU ids; `None` leaves that
    /// worker unpinned. A thread is pinned to a single CPU, so the mask is
    /// narrowed to its members the process may use, and worker `i` takes the
    /// `i % len`-th of them. A mask with no usable member leaves the worker
    /// unpinned.
    Custom(#[debug("<provider>")] Arc<dyn Fn(usize) -> Option<Vec<usize>> + Send + Sync>),
}

impl Affinity {
    pub fn custom(
        provider: impl Fn(usize) -> Option<Vec<usize>> + Send + Sync + 'static,
    ) -> Self {
        Self::Custom(Arc::new(provider))
    }

    /// CPU id for `worker`, given the ids in the process affinity mask.
    pub(crate) fn core_for(&self, worker: usize, usable: &[usize]) -> Option<usize> {
        match self {
            Self::Unpinned => None,
            Self::PerCore => nth_wrapping(usable, worker),
            Self::Custom(provider) => {
                let mask: Vec<usize> = provider(worker)?
                    .into_iter()
                    .filter(|core| usable.contains(core))
                    .collect();
                nth_wrapping(&mask, worker)
            }
        }
    }
}

fn nth_wrapping(cores: &[usize], n: usize) -> Option<usize> {
    if cores.is_empty() {
        None
    } else {
        Some(cores[n % cores.len()])
    }
}

/// Construction-time settings of a [`Manager`](crate::manager::Manager).
#[must_use]
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mode: ExecutionMode,
    /// `None` means one worker per logical CPU.
    pub worker_count: Option<NonZeroUsize>,
    /// Jobs that may be in flight at once.
    pub transaction_capacity: NonZeroUsize,
    pub affinity: Affinity,
    /// Reject cyclic graphs in `Manager::submit` instead of deadlocking.
    pub detect_cycles: bool,
    /// Prefix of every thread name.
    pub thread_name: String,
}

pub const DEFAULT_TRANSACTION_CAPACITY: NonZeroUsize = NonZeroUsize::new(16).unwrap();

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            worker_count: None,
            transaction_capacity: DEFAULT_TRANSACTION_CAPACITY,
            affinity: Affinity::default(),
            detect_cycles: cfg!(debug_assertions),
            thread_name: "jgs".to_owned(),
        }
    }
}

impl SchedulerConfig {
    /// Settings for the inline, single-thread executor.
    pub fn inline() -> Self {
        Self::default().with_mode(ExecutionMode::Inline)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    pub fn with_transaction_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.transaction_capacity = capacity;
        self
    }

    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Configured worker count, or the detected parallelism.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_core_uses_cpu_ids_not_positions() {
        let usable = [4, 5, 6, 7];
        assert_eq!(Affinity::Unpinned.core_for(3, &usable), None);
        assert_eq!(Affinity::PerCore.core_for(0, &usable), Some(4));
        assert_eq!(Affinity::PerCore.core_for(5, &usable), Some(5));
        assert_eq!(Affinity::PerCore.core_for(0, &[]), None);
    }

    #[test]
    fn custom_mask_is_narrowed_to_usable_cpus() {
        let usable = [4, 5, 6, 7];
        let masks = Affinity::custom(|worker| match worker {
            0 => None,
            1 => Some(vec![0, 1]),
            _ => Some(vec![2, 6, 7]),
        });
        assert_eq!(masks.core_for(0, &usable), None);
        // No member of the mask is usable.
        assert_eq!(masks.core_for(1, &usable), None);
        // Mask narrows to [6, 7]; worker 2 takes entry 2 % 2.
        assert_eq!(masks.core_for(2, &usable), Some(6));
        assert_eq!(masks.core_for(3, &usable), Some(7));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SchedulerConfig::default()
            .with_workers(NonZeroUsize::new(3).unwrap())
            .with_transaction_capacity(NonZeroUsize::MIN)
            .with_thread_name("render");
        assert_eq!(config.resolved_worker_count(), 3);
        assert_eq!(config.transaction_capacity.get(), 1);
        assert_eq!(config.thread_name, "render");
        assert_eq!(SchedulerConfig::inline().mode, ExecutionMode::Inline);
    }
}
