//! Scheduler behavior: ordering, exclusion, pinning, failure propagation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voxel_ecs::{ComponentTypeId, Registry};
use voxel_schedule::{
    AccessSet, ScheduleError, SchedulerConfig, StrategyKind, SystemDescriptor, SystemScheduler,
    Tick,
};

fn tick(n: u64) -> Tick {
    Tick {
        dt: Duration::from_millis(10),
        tick: n,
        started: std::time::Instant::now(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(strategy: StrategyKind) -> SchedulerConfig {
    SchedulerConfig {
        strategy,
        worker_threads: 3,
    }
}

#[test]
fn test_dependencies_order_execution() {
    init_tracing();
    for strategy in [StrategyKind::MaximizeAvailableWork, StrategyKind::Fifo] {
        let mut scheduler = SystemScheduler::new(config(strategy));
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>| {
            let order = order.clone();
            move |_: &mut Registry, _: &Tick| {
                order.lock().unwrap().push(name);
            }
        };

        let first = scheduler.add_system(SystemDescriptor::new("first"), record("first", &order));
        let second = scheduler.add_system(
            SystemDescriptor::new("second").after(first),
            record("second", &order),
        );
        scheduler.add_system(
            SystemDescriptor::new("third").after(second),
            record("third", &order),
        );

        let mut registry = Registry::new();
        for n in 0..3 {
            order.lock().unwrap().clear();
            scheduler.invoke(&mut registry, &tick(n)).unwrap();
            assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        }
    }
}

#[test]
fn test_each_system_runs_exactly_once_per_tick() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let counters: Vec<Arc<AtomicUsize>> = (0..8).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    for (i, counter) in counters.iter().enumerate() {
        let counter = counter.clone();
        scheduler.add_system(
            SystemDescriptor::new(format!("counter_{i}")),
            move |_: &mut Registry, _: &Tick| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
    }

    let mut registry = Registry::new();
    scheduler.invoke(&mut registry, &tick(1)).unwrap();
    scheduler.invoke(&mut registry, &tick(2)).unwrap();

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}

#[test]
fn test_conflicting_writers_never_overlap() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let component = ComponentTypeId::from_name("contended");
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    for i in 0..6 {
        let in_flight = in_flight.clone();
        let overlaps = overlaps.clone();
        scheduler.add_system(
            SystemDescriptor::new(format!("writer_{i}"))
                .with_access(AccessSet::new().write(component)),
            move |_: &mut Registry, _: &Tick| {
                if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            },
        );
    }

    let mut registry = Registry::new();
    scheduler.invoke(&mut registry, &tick(1)).unwrap();
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_readers_and_writer_exclusion() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let component = ComponentTypeId::from_name("shared_data");
    let readers_active = Arc::new(AtomicUsize::new(0));
    let writer_active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    for i in 0..4 {
        let readers_active = readers_active.clone();
        let writer_active = writer_active.clone();
        let violations = violations.clone();
        scheduler.add_system(
            SystemDescriptor::new(format!("reader_{i}"))
                .with_access(AccessSet::new().read(component)),
            move |_: &mut Registry, _: &Tick| {
                readers_active.fetch_add(1, Ordering::SeqCst);
                if writer_active.load(Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(1));
                readers_active.fetch_sub(1, Ordering::SeqCst);
            },
        );
    }

    {
        let readers_active = readers_active.clone();
        let writer_active = writer_active.clone();
        let violations = violations.clone();
        scheduler.add_system(
            SystemDescriptor::new("writer").with_access(AccessSet::new().write(component)),
            move |_: &mut Registry, _: &Tick| {
                writer_active.fetch_add(1, Ordering::SeqCst);
                if readers_active.load(Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(1));
                writer_active.fetch_sub(1, Ordering::SeqCst);
            },
        );
    }

    let mut registry = Registry::new();
    for n in 0..5 {
        scheduler.invoke(&mut registry, &tick(n)).unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blacklisted_systems_never_overlap() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let make = |in_flight: &Arc<AtomicUsize>, overlaps: &Arc<AtomicUsize>| {
        let in_flight = in_flight.clone();
        let overlaps = overlaps.clone();
        move |_: &mut Registry, _: &Tick| {
            if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    };

    // Disjoint access sets; only the blacklist keeps them apart.
    let a = scheduler.add_system(
        SystemDescriptor::new("a"),
        make(&in_flight, &overlaps),
    );
    scheduler.add_system(
        SystemDescriptor::new("b").blacklisting(a),
        make(&in_flight, &overlaps),
    );

    let mut registry = Registry::new();
    for n in 0..10 {
        scheduler.invoke(&mut registry, &tick(n)).unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_main_thread_pinning() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let main_thread = std::thread::current().id();
    let observed = Arc::new(Mutex::new(Vec::new()));

    for i in 0..4 {
        let observed = observed.clone();
        scheduler.add_system(
            SystemDescriptor::new(format!("pinned_{i}")).on_main_thread(),
            move |_: &mut Registry, _: &Tick| {
                observed.lock().unwrap().push(std::thread::current().id());
            },
        );
    }

    let mut registry = Registry::new();
    scheduler.invoke(&mut registry, &tick(1)).unwrap();

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 4);
    for id in observed.iter() {
        assert_eq!(*id, main_thread);
    }
}

#[test]
fn test_system_panic_aborts_tick_and_next_tick_recovers() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let healthy_runs = Arc::new(AtomicUsize::new(0));

    let first = {
        let healthy_runs = healthy_runs.clone();
        scheduler.add_system(
            SystemDescriptor::new("healthy"),
            move |_: &mut Registry, _: &Tick| {
                healthy_runs.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    let exploding = scheduler.add_system(
        SystemDescriptor::new("exploding").after(first),
        |_: &mut Registry, _: &Tick| panic!("boom"),
    );

    let mut registry = Registry::new();
    let err = scheduler.invoke(&mut registry, &tick(7)).unwrap_err();
    match err {
        ScheduleError::SystemPanicked { name, tick } => {
            assert_eq!(name, "exploding");
            assert_eq!(tick, 7);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The system that ran before the panic committed its effects.
    assert_eq!(healthy_runs.load(Ordering::SeqCst), 1);

    // Subsequent ticks run normally once the failing system is removed.
    assert!(scheduler.remove_system(exploding));
    scheduler.invoke(&mut registry, &tick(8)).unwrap();
    assert_eq!(healthy_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_take_system_removes_it_from_the_graph() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::Fifo));
    let runs = Arc::new(AtomicUsize::new(0));

    let id = {
        let runs = runs.clone();
        scheduler.add_system(
            SystemDescriptor::new("transient"),
            move |_: &mut Registry, _: &Tick| {
                runs.fetch_add(1, Ordering::SeqCst);
            },
        )
    };

    let mut registry = Registry::new();
    scheduler.invoke(&mut registry, &tick(1)).unwrap();
    assert!(scheduler.take_system(id).is_some());
    assert!(!scheduler.has_system(id));
    scheduler.invoke(&mut registry, &tick(2)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_dependencies_are_dropped() {
    init_tracing();
    let mut scheduler = SystemScheduler::new(config(StrategyKind::MaximizeAvailableWork));
    let a = scheduler.add_system(SystemDescriptor::new("a"), |_: &mut Registry, _: &Tick| {});
    scheduler.remove_system(a);

    // The dependency names a system that no longer exists; it is dropped and
    // the new system is immediately runnable.
    let b = scheduler.add_system(
        SystemDescriptor::new("b").after(a),
        |_: &mut Registry, _: &Tick| {},
    );
    assert!(scheduler.task_info(b).unwrap().dependencies.is_empty());

    let mut registry = Registry::new();
    scheduler.invoke(&mut registry, &tick(1)).unwrap();
}
