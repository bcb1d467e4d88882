//! Registration-order scheduling strategy.
//!
//! Runnable tasks are handed out in the order they were added to the
//! scheduler, subject to the same dependency, blacklist, access and
//! main-thread rules as every strategy.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::access::AccessTracker;
use crate::strategy::{GraphView, Strategy, TaskPoll, WorkerInfo};
use crate::task::SystemId;

#[derive(Debug, Clone, Copy)]
struct TaskData {
    unfulfilled_dependencies: usize,
    blacklisted_by_count: usize,
}

#[derive(Default)]
struct State {
    data: HashMap<SystemId, TaskData>,
    /// Runnable tasks in registration order (system IDs are allocated
    /// monotonically).
    available: Vec<SystemId>,
    access: AccessTracker,
    started: usize,
}

/// First-in-first-out scheduling strategy.
#[derive(Default)]
pub struct Fifo {
    state: Mutex<State>,
}

impl Fifo {
    /// Creates the strategy with empty per-tick state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_sorted(available: &mut Vec<SystemId>, id: SystemId) {
    let pos = available.partition_point(|&existing| existing < id);
    available.insert(pos, id);
}

impl Strategy for Fifo {
    fn on_tick_start(&self, graph: &GraphView<'_>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;

        state.data.clear();
        state.available.clear();
        state.access = AccessTracker::new();
        state.started = 0;

        for (&id, task) in graph.tasks {
            let data = TaskData {
                unfulfilled_dependencies: task.dependencies.len(),
                blacklisted_by_count: 0,
            };
            if data.unfulfilled_dependencies == 0 {
                insert_sorted(&mut state.available, id);
            }
            state.data.insert(id, data);
        }
    }

    fn try_start_task(&self, graph: &GraphView<'_>, worker: &WorkerInfo) -> TaskPoll {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;

        if state.available.is_empty() {
            return if state.started == graph.tasks.len() {
                TaskPoll::NoneRemaining
            } else {
                TaskPoll::NotAvailable
            };
        }

        let mut selected = None;
        for (slot, &id) in state.available.iter().enumerate() {
            let task = &graph.tasks[&id];
            let data = state.data[&id];

            if data.blacklisted_by_count != 0 {
                continue;
            }
            if state.access.has_access_conflict(&task.access) {
                continue;
            }
            if task.requires_main_thread && !worker.is_main_thread {
                continue;
            }

            selected = Some((slot, id));
            break;
        }

        match selected {
            Some((slot, id)) => {
                state.available.remove(slot);
                let task = &graph.tasks[&id];
                for blacklisted in &task.blacklist {
                    if let Some(data) = state.data.get_mut(blacklisted) {
                        data.blacklisted_by_count += 1;
                    }
                }
                state.access.add_task_access(&task.access);
                state.started += 1;
                TaskPoll::Task(id)
            }
            None => TaskPoll::NotAvailable,
        }
    }

    fn complete_task(&self, graph: &GraphView<'_>, _worker: &WorkerInfo, task: SystemId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;

        let info = &graph.tasks[&task];

        for blacklisted in &info.blacklist {
            if let Some(data) = state.data.get_mut(blacklisted) {
                data.blacklisted_by_count -= 1;
            }
        }

        for dependent in &info.dependents {
            if let Some(data) = state.data.get_mut(dependent) {
                data.unfulfilled_dependencies -= 1;
                if data.unfulfilled_dependencies == 0 {
                    insert_sorted(&mut state.available, *dependent);
                }
            }
        }

        state.access.remove_task_access(&info.access);
    }
}
