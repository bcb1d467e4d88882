//! Task metadata: system identity, declared accesses and scheduling hints.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use voxel_ecs::ComponentTypeId;

/// A unique identifier for a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u64);

/// Well-known pseudo-access markers.
///
/// These participate in the access-conflict rule like component types but
/// guard non-component state: a system that declares a write on
/// [`ENTITY_LIFECYCLE`] is the only one allowed to create or destroy
/// entities directly, and [`CONNECTIONS`] serializes systems that touch an
/// instance's connection table.
pub mod markers {
    use voxel_ecs::ComponentTypeId;

    /// Write marker for direct entity creation/destruction.
    pub const ENTITY_LIFECYCLE: ComponentTypeId =
        ComponentTypeId::from_name("voxel_schedule::markers::entity_lifecycle");

    /// Write marker for an instance's connection table.
    pub const CONNECTIONS: ComponentTypeId =
        ComponentTypeId::from_name("voxel_schedule::markers::connections");
}

/// Declared read and write sets of component types for a system.
#[derive(Debug, Clone, Default)]
pub struct AccessSet {
    /// Component types read by the system.
    pub reads: HashSet<ComponentTypeId>,
    /// Component types written by the system.
    pub writes: HashSet<ComponentTypeId>,
}

impl AccessSet {
    /// Creates an empty access set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a read access.
    #[must_use]
    pub fn read(mut self, type_id: ComponentTypeId) -> Self {
        self.reads.insert(type_id);
        self
    }

    /// Adds a write access.
    #[must_use]
    pub fn write(mut self, type_id: ComponentTypeId) -> Self {
        self.writes.insert(type_id);
        self
    }

    /// Two access sets conflict when one writes a type the other reads or
    /// writes.
    #[must_use]
    pub fn conflicts_with(&self, other: &AccessSet) -> bool {
        self.writes
            .iter()
            .any(|w| other.reads.contains(w) || other.writes.contains(w))
            || other.writes.iter().any(|w| self.reads.contains(w))
    }
}

/// Scheduling metadata for one registered system.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Human-readable system name.
    pub name: String,
    /// Declared component accesses.
    pub access: AccessSet,
    /// Systems that must complete before this one starts (same tick).
    pub dependencies: Vec<SystemId>,
    /// Systems this one must complete before. Derived from `dependencies`.
    pub dependents: Vec<SystemId>,
    /// Systems that must not run concurrently with this one, regardless of
    /// access sets.
    pub blacklist: Vec<SystemId>,
    /// Pin execution to the designated main thread.
    pub requires_main_thread: bool,
    /// Estimated run time, used by the priority strategy.
    pub performance: Duration,
}

/// Registration-time description of a system.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    /// Human-readable system name.
    pub name: String,
    /// Declared component accesses.
    pub access: AccessSet,
    /// Systems that must complete before this one starts.
    pub dependencies: Vec<SystemId>,
    /// Systems that must not run concurrently with this one.
    pub blacklist: Vec<SystemId>,
    /// Pin execution to the designated main thread.
    pub requires_main_thread: bool,
    /// Estimated run time.
    pub performance: Duration,
}

impl SystemDescriptor {
    /// Creates a descriptor with no accesses and default hints.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: AccessSet::new(),
            dependencies: Vec::new(),
            blacklist: Vec::new(),
            requires_main_thread: false,
            performance: Duration::from_micros(100),
        }
    }

    /// Replaces the access set.
    #[must_use]
    pub fn with_access(mut self, access: AccessSet) -> Self {
        self.access = access;
        self
    }

    /// Adds a dependency on another system.
    #[must_use]
    pub fn after(mut self, id: SystemId) -> Self {
        self.dependencies.push(id);
        self
    }

    /// Adds a system that may not run concurrently with this one.
    #[must_use]
    pub fn blacklisting(mut self, id: SystemId) -> Self {
        self.blacklist.push(id);
        self
    }

    /// Pins the system to the main thread.
    #[must_use]
    pub fn on_main_thread(mut self) -> Self {
        self.requires_main_thread = true;
        self
    }

    /// Sets the estimated run time used for prioritization.
    #[must_use]
    pub fn with_performance(mut self, performance: Duration) -> Self {
        self.performance = performance;
        self
    }
}

/// Per-tick timing information passed to systems.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Clamped simulation timestep for this tick.
    pub dt: Duration,
    /// Monotonically increasing tick counter.
    pub tick: u64,
    /// Wall-clock instant the tick started.
    pub started: Instant,
}
