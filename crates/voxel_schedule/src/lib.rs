//! # voxel_schedule
//!
//! Parallel system scheduling for the voxel engine core.
//!
//! This crate provides:
//!
//! - [`SystemDescriptor`] / [`AccessSet`] — declared read/write sets,
//!   dependencies, blacklists and main-thread pinning per system.
//! - [`AccessTracker`] — the read-multiset/write-set exclusion rule.
//! - [`Strategy`] — the swappable `try_start_task` / `complete_task` seam,
//!   with [`strategies::MaximizeAvailableWork`] and [`strategies::Fifo`]
//!   shipped.
//! - [`SystemScheduler`] — per-tick dispatch over a scoped worker pool; the
//!   calling thread is the designated main thread.
//! - [`SystemManager`] — tick counting and `min_dt`/`max_dt` clamping
//!   around the scheduler.

pub mod access;
pub mod error;
pub mod manager;
pub mod scheduler;
pub mod strategies;
pub mod strategy;
pub mod task;

pub use access::AccessTracker;
pub use error::ScheduleError;
pub use manager::{SystemManager, TickTiming};
pub use scheduler::{SchedulerConfig, System, SystemScheduler};
pub use strategy::{GraphView, Strategy, StrategyKind, TaskPoll, WorkerInfo};
pub use task::{markers, AccessSet, SystemDescriptor, SystemId, TaskInfo, Tick};
