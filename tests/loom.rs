#![allow(missing_docs)]
#![cfg(feature = "loom")]

use jgs::{ExecutionMode, Job, JobGraph, JobStatus, Manager, Priority, SchedulerConfig};
use loom::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::num::NonZeroUsize;

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_mode(ExecutionMode::Threaded)
        .with_workers(NonZeroUsize::MIN)
        .with_transaction_capacity(NonZeroUsize::MIN)
        .with_cycle_detection(false)
}

fn model(f: impl Fn() + Sync + Send + 'static) {
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(1);
    builder.check(f);
}

#[derive(Debug, Clone)]
struct Shared {
    // Execution order, by job tag.
    log: Arc<Mutex<Vec<u32>>>,
    // Indexed by tag.
    counts: Arc<Vec<AtomicUsize>>,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
            counts: Arc::new((0..capacity).map(|_| AtomicUsize::new(0)).collect()),
        }
    }

    fn job(&self, tag: u32) -> Job {
        let shared = self.clone();
        Job::new(Priority::Normal, move || {
            shared.counts[tag as usize].fetch_add(1, Ordering::Relaxed);
            shared.log.lock().unwrap().push(tag);
        })
    }

    fn count(&self, tag: u32) -> usize {
        self.counts[tag as usize].load(Ordering::Relaxed)
    }
}

#[test]
fn loom_chain_submission_races_with_retirement() {
    model(|| {
        // Graph:
        //   A(0)
        //    |
        //   B(1)
        // `run` schedules B while the scheduling thread may already be
        // retiring A and readying B itself.
        let shared = Shared::new(2);
        let manager = Manager::new(config()).unwrap();
        let mut graph = JobGraph::new();
        let a = graph.add_job(shared.job(0));
        let b = graph.add_job(shared.job(1).with_sync());
        graph.add_dependency(a, b);

        let graph = manager.run(graph).unwrap();
        graph.sync(b);

        assert_eq!(*shared.log.lock().unwrap(), vec![0, 1]);
        assert_eq!(shared.count(0), 1);
        assert_eq!(shared.count(1), 1);
        assert!(graph.is_retired(a));
        assert_eq!(graph.status(b), JobStatus::Succeeded);
    });
}

#[test]
fn loom_diamond_waits_for_both_parents() {
    model(|| {
        // Graph:
        //   A(0)   B(1)
        //     \    /
        //      C(2)
        let shared = Shared::new(3);
        let manager = Manager::new(config()).unwrap();
        let mut graph = JobGraph::new();
        let c = graph.add_job(shared.job(2).with_sync());
        let a = graph.add_job(shared.job(0));
        let b = graph.add_job(shared.job(1));
        graph.add_dependency(a, c);
        graph.add_dependency(b, c);

        let graph = manager.run(graph).unwrap();
        graph.sync(c);

        let log = shared.log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], 2);
        for tag in 0..3 {
            assert_eq!(shared.count(tag), 1);
        }
    });
}

#[test]
fn loom_shutdown_with_queued_jobs_terminates() {
    model(|| {
        let shared = Shared::new(2);
        let manager = Manager::new(config()).unwrap();
        let mut graph = JobGraph::new();
        let ids = [graph.add_job(shared.job(0)), graph.add_job(shared.job(1))];
        let graph = manager.run(graph).unwrap();
        drop(manager);

        // Every job either ran to completion or never started.
        for (tag, id) in ids.into_iter().enumerate() {
            let ran = shared.count(tag as u32);
            assert!(ran <= 1);
            let expected = if ran == 1 { JobStatus::Succeeded } else { JobStatus::Pending };
            assert_eq!(graph.status(id), expected);
        }
    });
}
