//! Strategy that maximizes the amount of available work.
//!
//! Tasks that lock a lot of execution behind themselves as dependents are
//! prioritized. A task's priority is its own estimated runtime plus the
//! priority of all its dependents, so finishing it early unblocks the most
//! downstream work. Optimized for graphs with a few large systems and/or
//! many internal dependencies.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use crate::access::AccessTracker;
use crate::strategy::{GraphView, Strategy, TaskPoll, WorkerInfo};
use crate::task::{SystemId, TaskInfo};

#[derive(Debug, Clone, Copy)]
struct TaskData {
    priority: Duration,
    unfulfilled_dependencies: usize,
    blacklisted_by_count: usize,
}

#[derive(Default)]
struct State {
    data: HashMap<SystemId, TaskData>,
    /// Runnable tasks ordered by priority; iterated back-to-front.
    available: BTreeSet<(Duration, SystemId)>,
    access: AccessTracker,
    started: usize,
}

/// Priority-maximizing scheduling strategy.
#[derive(Default)]
pub struct MaximizeAvailableWork {
    state: Mutex<State>,
}

impl MaximizeAvailableWork {
    /// Creates the strategy with empty per-tick state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn priority_of(
    tasks: &HashMap<SystemId, TaskInfo>,
    memo: &mut HashMap<SystemId, Duration>,
    id: SystemId,
) -> Duration {
    if let Some(&p) = memo.get(&id) {
        return p;
    }
    let task = &tasks[&id];
    let mut priority = task.performance;
    for &dependent in &task.dependents {
        priority += priority_of(tasks, memo, dependent);
    }
    memo.insert(id, priority);
    priority
}

impl Strategy for MaximizeAvailableWork {
    fn on_tick_start(&self, graph: &GraphView<'_>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;

        state.data.clear();
        state.available.clear();
        state.access = AccessTracker::new();
        state.started = 0;

        let mut memo = HashMap::new();
        for (&id, task) in graph.tasks {
            let data = TaskData {
                priority: priority_of(graph.tasks, &mut memo, id),
                unfulfilled_dependencies: task.dependencies.len(),
                blacklisted_by_count: 0,
            };
            if data.unfulfilled_dependencies == 0 {
                state.available.insert((data.priority, id));
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
        for &(priority, id) in state.available.iter().rev() {
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

            selected = Some((priority, id));
            break;
        }

        match selected {
            Some((priority, id)) => {
                state.available.remove(&(priority, id));
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
                    state.available.insert((data.priority, *dependent));
                }
            }
        }

        state.access.remove_task_access(&info.access);
    }
}
