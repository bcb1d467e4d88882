//! The system scheduler.
//!
//! Owns the graph of registered systems and runs it to completion once per
//! tick. Workers (the calling thread plus a pool of scoped threads) poll the
//! configured [`Strategy`] for runnable tasks; the strategy upholds the
//! dependency DAG, the access-conflict rule and blacklists, and only the
//! calling thread is handed `requires_main_thread` tasks.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;
use voxel_ecs::Registry;

use crate::error::ScheduleError;
use crate::strategies::{Fifo, MaximizeAvailableWork};
use crate::strategy::{GraphView, Strategy, StrategyKind, TaskPoll, WorkerInfo};
use crate::task::{SystemDescriptor, SystemId, TaskInfo, Tick};

/// One tick's worth of work over a registry.
pub trait System: Send {
    /// Executes the system. It must touch only the component types in its
    /// declared access set; the scheduler's exclusion guarantees depend on
    /// it.
    fn run(&mut self, registry: &mut Registry, tick: &Tick);
}

impl<F: FnMut(&mut Registry, &Tick) + Send> System for F {
    fn run(&mut self, registry: &mut Registry, tick: &Tick) {
        self(registry, tick);
    }
}

/// Scheduler construction options.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Which strategy picks among runnable tasks.
    pub strategy: StrategyKind,
    /// Extra worker threads spawned per tick, in addition to the calling
    /// thread.
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1),
        }
    }
}

/// Shared pointer to the registry a tick runs over.
///
/// Handing concurrently-running systems mutable registry access is sound
/// because the strategy's access-conflict rule guarantees their declared
/// read/write sets are disjoint wherever it matters, and systems contract
/// to stay within their declared sets.
struct WorldCell(*mut Registry);

unsafe impl Send for WorldCell {}
unsafe impl Sync for WorldCell {}

impl WorldCell {
    /// # Safety
    ///
    /// Callers must hold a task access grant from the strategy covering
    /// every component type they touch through the returned reference.
    unsafe fn registry(&self) -> &mut Registry {
        unsafe { &mut *self.0 }
    }
}

/// Owns the system graph and dispatches it each tick.
pub struct SystemScheduler {
    config: SchedulerConfig,
    strategy: Box<dyn Strategy>,
    tasks: HashMap<SystemId, TaskInfo>,
    systems: HashMap<SystemId, Mutex<Box<dyn System>>>,
    next_id: u64,
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl SystemScheduler {
    /// Creates a scheduler with the given configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let strategy: Box<dyn Strategy> = match config.strategy {
            StrategyKind::MaximizeAvailableWork => Box::new(MaximizeAvailableWork::new()),
            StrategyKind::Fifo => Box::new(Fifo::new()),
        };
        Self {
            config,
            strategy,
            tasks: HashMap::new(),
            systems: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a system and returns its ID.
    ///
    /// Dependencies and blacklist entries naming unknown systems are
    /// dropped. Because a dependency must name an already-registered system,
    /// the graph is acyclic by construction.
    pub fn add_system(
        &mut self,
        descriptor: SystemDescriptor,
        system: impl System + 'static,
    ) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;

        let dependencies: Vec<_> = descriptor
            .dependencies
            .into_iter()
            .filter(|dep| self.tasks.contains_key(dep))
            .collect();
        for dep in &dependencies {
            if let Some(task) = self.tasks.get_mut(dep) {
                task.dependents.push(id);
            }
        }

        let blacklist: Vec<_> = descriptor
            .blacklist
            .into_iter()
            .filter(|other| self.tasks.contains_key(other))
            .collect();

        self.tasks.insert(
            id,
            TaskInfo {
                name: descriptor.name,
                access: descriptor.access,
                dependencies,
                dependents: Vec::new(),
                blacklist,
                requires_main_thread: descriptor.requires_main_thread,
                performance: descriptor.performance,
            },
        );
        self.systems.insert(id, Mutex::new(Box::new(system)));
        id
    }

    /// Removes a system. Returns whether it existed.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        self.take_system(id).is_some()
    }

    /// Removes a system and returns it.
    pub fn take_system(&mut self, id: SystemId) -> Option<Box<dyn System>> {
        self.tasks.remove(&id)?;
        for task in self.tasks.values_mut() {
            task.dependencies.retain(|&other| other != id);
            task.dependents.retain(|&other| other != id);
            task.blacklist.retain(|&other| other != id);
        }
        let slot = self.systems.remove(&id)?;
        Some(slot.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    /// Returns mutable access to a registered system.
    #[must_use]
    pub fn system_mut(&mut self, id: SystemId) -> Option<&mut (dyn System + 'static)> {
        let slot = self.systems.get_mut(&id)?;
        match slot.get_mut() {
            Ok(system) => Some(system.as_mut()),
            Err(poisoned) => Some(poisoned.into_inner().as_mut()),
        }
    }

    /// Returns the scheduling metadata of a registered system.
    #[must_use]
    pub fn task_info(&self, id: SystemId) -> Option<&TaskInfo> {
        self.tasks.get(&id)
    }

    /// Returns `true` if a system with the given ID exists.
    #[must_use]
    pub fn has_system(&self, id: SystemId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no systems are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every registered system once, honoring dependencies, access
    /// exclusion, blacklists and main-thread pinning. The calling thread is
    /// the designated main thread and participates as worker 0.
    pub fn invoke(&mut self, registry: &mut Registry, tick: &Tick) -> Result<(), ScheduleError> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let graph = GraphView { tasks: &self.tasks };
        self.strategy.on_tick_start(&graph);

        let world = WorldCell(registry as *mut Registry);
        let abort = AtomicBool::new(false);
        let failure: Mutex<Option<String>> = Mutex::new(None);

        let strategy = self.strategy.as_ref();
        let systems = &self.systems;
        let tasks = &self.tasks;

        std::thread::scope(|scope| {
            for index in 1..=self.config.worker_threads {
                let graph = GraphView { tasks };
                let world = &world;
                let abort = &abort;
                let failure = &failure;
                scope.spawn(move || {
                    worker_loop(
                        strategy,
                        &graph,
                        systems,
                        world,
                        tick,
                        WorkerInfo {
                            index,
                            is_main_thread: false,
                        },
                        abort,
                        failure,
                    );
                });
            }

            worker_loop(
                strategy,
                &GraphView { tasks },
                systems,
                &world,
                tick,
                WorkerInfo {
                    index: 0,
                    is_main_thread: true,
                },
                &abort,
                &failure,
            );
        });

        let failed = failure.lock().unwrap_or_else(|e| e.into_inner()).take();
        match failed {
            Some(name) => Err(ScheduleError::SystemPanicked {
                name,
                tick: tick.tick,
            }),
            None => Ok(()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    strategy: &dyn Strategy,
    graph: &GraphView<'_>,
    systems: &HashMap<SystemId, Mutex<Box<dyn System>>>,
    world: &WorldCell,
    tick: &Tick,
    worker: WorkerInfo,
    abort: &AtomicBool,
    failure: &Mutex<Option<String>>,
) {
    loop {
        if abort.load(Ordering::Relaxed) {
            return;
        }

        match strategy.try_start_task(graph, &worker) {
            TaskPoll::NoneRemaining => return,
            TaskPoll::NotAvailable => std::thread::yield_now(),
            TaskPoll::Task(id) => {
                debug!(system = %graph.tasks[&id].name, worker = worker.index, "task start");

                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut system = systems[&id].lock().unwrap_or_else(|e| e.into_inner());
                    // SAFETY: the strategy granted this task's access set and
                    // excludes every conflicting task until complete_task.
                    let registry = unsafe { world.registry() };
                    system.run(registry, tick);
                }));

                match result {
                    Ok(()) => strategy.complete_task(graph, &worker, id),
                    Err(_) => {
                        let mut failed = failure.lock().unwrap_or_else(|e| e.into_inner());
                        failed.get_or_insert_with(|| graph.tasks[&id].name.clone());
                        abort.store(true, Ordering::Relaxed);
                        return;
                    }
                }
            }
        }
    }
}
