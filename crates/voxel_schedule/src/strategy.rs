//! The scheduling-strategy seam.
//!
//! Strategies decide *which* of the currently runnable tasks a worker gets
//! next; the dependency DAG and the access-conflict rule are invariants they
//! all uphold. Workers call [`Strategy::try_start_task`] concurrently, so
//! implementations keep their state behind an internal lock.

use std::collections::HashMap;

use crate::task::{SystemId, TaskInfo};

/// The result of polling a strategy for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    /// Run this task; its accesses are now held.
    Task(SystemId),
    /// Nothing is runnable right now; the caller should yield and retry.
    NotAvailable,
    /// Every task of this tick has been handed out; the caller may exit.
    NoneRemaining,
}

/// Immutable per-tick view of the system graph handed to strategies.
pub struct GraphView<'a> {
    /// All registered tasks, keyed by system ID.
    pub tasks: &'a HashMap<SystemId, TaskInfo>,
}

/// Per-worker information passed to [`Strategy::try_start_task`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerInfo {
    /// Worker index; the main thread is worker 0.
    pub index: usize,
    /// Whether this worker is the designated main thread.
    pub is_main_thread: bool,
}

/// A swappable scheduling strategy.
pub trait Strategy: Send + Sync {
    /// Rebuilds transient per-tick state from the graph.
    fn on_tick_start(&self, graph: &GraphView<'_>);

    /// Called concurrently by workers to obtain the next task.
    fn try_start_task(&self, graph: &GraphView<'_>, worker: &WorkerInfo) -> TaskPoll;

    /// Called when a worker finishes a task: releases its accesses, reverses
    /// its blacklist contributions and unblocks its dependents.
    fn complete_task(&self, graph: &GraphView<'_>, worker: &WorkerInfo, task: SystemId);
}

/// Strategy selection for [`SchedulerConfig`](crate::SchedulerConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Prioritize tasks that unlock the most downstream work.
    #[default]
    MaximizeAvailableWork,
    /// Hand out runnable tasks in registration order.
    Fifo,
}
