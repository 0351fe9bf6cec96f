//! Dependency-driven job scheduler with a prioritized worker pool.
//!
//! Applications describe work as a directed acyclic graph of jobs. Every
//! node carries a dependency count (unmet prerequisites plus one submission
//! credit); a node whose count reaches 1 is ready and is handed to a worker
//! as soon as a transaction slot frees up. When it finishes, the scheduler
//! decrements the count of each dependent, which keeps the traversal going
//! without any caller having to drain queues.
//!
//! Key modules:
//! - `graph`: the single-threaded `JobGraph` builder and the frozen `Graph`
//!   arena with its atomic dependency counters.
//! - `executor`: the `Executor` trait with the threaded worker pool and the
//!   inline single-thread implementation.
//! - `manager`: the `Manager` façade selecting an executor from a
//!   `SchedulerConfig`.
//! - `config`: worker count, affinity, transaction capacity, cycle checks.
//!
//! Quick start:
//! 1. Build a `JobGraph`, adding jobs with `add_job` and linking them with
//!    `add_dependency`.
//! 2. Hand it to `Manager::run` (or `submit` and then `schedule` the roots).
//! 3. `sync` on a barrier or a job built `with_sync` to wait for completion.
//!
//! Ordering: within one priority, jobs are dispatched in the order they
//! became ready; a higher priority is always drained before a lower one is
//! inspected. A job never starts before every prerequisite has retired, and
//! runs at most once.

/// Construction-time configuration of the scheduler.
///
/// Exposes `SchedulerConfig`, the `ExecutionMode` switch between the worker
/// pool and inline execution, and the `Affinity` strategy for pinning
/// workers.
pub mod config;
mod event;
/// Execution strategies behind the common `Executor` submission interface.
///
/// Contains the reentrancy-guarded scheduling pass, the worker pool with
/// its dedicated scheduling thread, and the inline executor.
pub mod executor;
/// Dependency graph construction and the runtime node arena.
///
/// `JobGraph` is mutable and single-threaded; `Manager::submit` freezes it
/// into a shared `Graph` whose nodes are addressed by `JobId`.
pub mod graph;
/// The `Job` payload description.
pub mod job;
/// The `Manager` façade.
pub mod manager;
mod ready;
mod sync;
mod transaction;
/// Identifiers, priorities, and job outcomes.
pub mod types;

pub use crate::{
    config::{Affinity, ExecutionMode, SchedulerConfig},
    executor::{Executor, InlineExecutor, SchedulerError, ThreadPoolExecutor},
    graph::{Batch, Graph, GraphSetupError, JobGraph},
    job::Job,
    manager::Manager,
    types::{JobError, JobId, JobStatus, Priority},
};
