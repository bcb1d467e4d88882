//! Tick timing around the scheduler.
//!
//! [`SystemManager`] owns a [`SystemScheduler`] and drives it on a clamped
//! timestep: the simulated `dt` is the previous tick's wall time clamped to
//! `[min_dt, max_dt]`. Ticks that finish early sleep out the remainder of
//! `min_dt`; ticks that overrun `max_dt` log a warning and the simulation
//! slows down.

use std::time::{Duration, Instant};

use tracing::warn;
use voxel_ecs::Registry;

use crate::error::ScheduleError;
use crate::scheduler::{SchedulerConfig, System, SystemScheduler};
use crate::task::{SystemDescriptor, SystemId, Tick};

/// Tick timing parameters.
#[derive(Debug, Clone)]
pub struct TickTiming {
    /// First tick number. Must be greater than zero so the epoch timestamp
    /// always compares less than any current timestamp.
    pub starting_tick: u64,
    /// Smallest amount of time simulated per tick.
    pub min_dt: Duration,
    /// Largest amount of time simulated per tick.
    pub max_dt: Duration,
    /// Time simulated by the very first tick.
    pub default_dt: Duration,
}

impl Default for TickTiming {
    fn default() -> Self {
        Self {
            starting_tick: 1,
            min_dt: Duration::from_millis(1),
            max_dt: Duration::from_millis(250),
            default_dt: Duration::from_millis(10),
        }
    }
}

impl TickTiming {
    fn validate(&self) {
        assert!(self.starting_tick > 0, "cannot start at tick 0");
        assert!(self.min_dt > Duration::ZERO, "min_dt must be positive");
        assert!(self.min_dt <= self.max_dt, "min_dt cannot exceed max_dt");
        assert!(
            self.default_dt >= self.min_dt && self.default_dt <= self.max_dt,
            "default_dt must lie within [min_dt, max_dt]"
        );
    }
}

/// Drives a scheduler on a clamped fixed-ish timestep.
pub struct SystemManager {
    scheduler: SystemScheduler,
    timing: TickTiming,
    tick: u64,
    current_dt: Duration,
}

impl Default for SystemManager {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), TickTiming::default())
    }
}

impl SystemManager {
    /// Creates a manager with the given scheduler configuration and timing.
    ///
    /// # Panics
    ///
    /// Panics if the timing parameters are inconsistent.
    #[must_use]
    pub fn new(config: SchedulerConfig, timing: TickTiming) -> Self {
        timing.validate();
        Self {
            scheduler: SystemScheduler::new(config),
            tick: timing.starting_tick,
            current_dt: timing.default_dt,
            timing,
        }
    }

    /// Runs one tick over the registry.
    ///
    /// Returns the scheduler error if a system panicked; the tick counter
    /// still advances so subsequent ticks proceed.
    pub fn update(&mut self, registry: &mut Registry) -> Result<(), ScheduleError> {
        let started = Instant::now();
        let dt = self.current_dt.clamp(self.timing.min_dt, self.timing.max_dt);

        let tick = Tick {
            dt,
            tick: self.tick,
            started,
        };
        let result = self.scheduler.invoke(registry, &tick);

        let elapsed = started.elapsed();
        self.current_dt = elapsed;
        if elapsed < self.timing.min_dt {
            std::thread::sleep(self.timing.min_dt - elapsed);
        } else if elapsed > self.timing.max_dt {
            warn!(
                tick = self.tick,
                elapsed_ms = elapsed.as_millis() as u64,
                max_dt_ms = self.timing.max_dt.as_millis() as u64,
                "simulation cannot keep up"
            );
        }

        self.tick += 1;
        result
    }

    /// Registers a system; see [`SystemScheduler::add_system`].
    pub fn add_system(
        &mut self,
        descriptor: SystemDescriptor,
        system: impl System + 'static,
    ) -> SystemId {
        self.scheduler.add_system(descriptor, system)
    }

    /// Removes a system; see [`SystemScheduler::remove_system`].
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        self.scheduler.remove_system(id)
    }

    /// The current tick number.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Wall time of the most recent tick.
    #[must_use]
    pub fn current_dt(&self) -> Duration {
        self.current_dt
    }

    /// The tick timing parameters.
    #[must_use]
    pub fn timing(&self) -> &TickTiming {
        &self.timing
    }

    /// The underlying scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    /// The underlying scheduler, mutably.
    #[must_use]
    pub fn scheduler_mut(&mut self) -> &mut SystemScheduler {
        &mut self.scheduler
    }
}
