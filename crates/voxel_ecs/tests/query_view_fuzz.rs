//! Randomized query-view checks against naive predicate evaluation.
//!
//! A registry is populated with random component membership; for each query
//! shape the view must yield exactly the entities whose current membership
//! satisfies the predicate, each exactly once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use voxel_ecs::{All, And, Component, Entity, Has, Not, Nothing, Or, QueryExpr, Registry};

macro_rules! test_component {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        struct $name(u32);

        impl Component for $name {
            fn type_name() -> &'static str {
                concat!("view_fuzz::", stringify!($name))
            }
        }
    };
}

test_component!(A);
test_component!(B);
test_component!(C);

#[derive(Debug, Clone, Copy)]
struct Membership {
    a: bool,
    b: bool,
    c: bool,
}

fn check<Q: QueryExpr>(
    registry: &Registry,
    memberships: &HashMap<Entity, Membership>,
    predicate: impl Fn(Membership) -> bool,
) {
    let mut yielded: Vec<Entity> = registry.view::<Q>().iter().collect();
    let before_dedup = yielded.len();
    yielded.sort_unstable();
    yielded.dedup();
    assert_eq!(before_dedup, yielded.len(), "view yielded an entity twice");

    let mut expected: Vec<Entity> = memberships
        .iter()
        .filter(|(_, &m)| predicate(m))
        .map(|(&e, _)| e)
        .collect();
    expected.sort_unstable();

    assert_eq!(yielded, expected);
}

fn check_all_queries(registry: &Registry, memberships: &HashMap<Entity, Membership>) {
    check::<Has<A>>(registry, memberships, |m| m.a);
    check::<And<Has<A>, And<Has<B>, Has<C>>>>(registry, memberships, |m| m.a && m.b && m.c);
    check::<Or<Has<A>, Has<B>>>(registry, memberships, |m| m.a || m.b);
    check::<Not<Has<A>>>(registry, memberships, |m| !m.a);
    check::<And<Or<Has<A>, Has<B>>, Not<Has<C>>>>(registry, memberships, |m| (m.a || m.b) && !m.c);
    check::<Or<Has<C>, Not<Has<B>>>>(registry, memberships, |m| m.c || !m.b);
    check::<All>(registry, memberships, |_| true);
    check::<Nothing>(registry, memberships, |_| false);
}

#[test]
fn fuzz_views_agree_with_naive_evaluation() {
    let mut rng = fastrand::Rng::with_seed(0xCAFE_0001);
    let mut registry = Registry::new();
    let mut memberships: HashMap<Entity, Membership> = HashMap::new();

    for round in 0..60 {
        // Mutate the population: spawn some entities, despawn a few,
        // add and remove components.
        for _ in 0..rng.u32(1..12) {
            let e = registry.create_entity();
            let m = Membership {
                a: rng.bool(),
                b: rng.bool(),
                c: rng.bool(),
            };
            if m.a {
                registry.emplace(e, A(0));
            }
            if m.b {
                registry.emplace(e, B(0));
            }
            if m.c {
                registry.emplace(e, C(0));
            }
            memberships.insert(e, m);
        }

        let current: Vec<Entity> = memberships.keys().copied().collect();
        for &e in &current {
            match rng.u32(0..10) {
                0 => {
                    registry.destroy_entity(e);
                    memberships.remove(&e);
                }
                1 => {
                    let m = memberships.get_mut(&e).unwrap();
                    if m.b {
                        registry.erase::<B>(e);
                        m.b = false;
                    } else {
                        registry.emplace(e, B(0));
                        m.b = true;
                    }
                }
                2 => {
                    let m = memberships.get_mut(&e).unwrap();
                    if !m.c {
                        registry.emplace(e, C(0));
                        m.c = true;
                    }
                }
                _ => {}
            }
        }

        if round % 5 == 0 {
            check_all_queries(&registry, &memberships);
        }
    }

    check_all_queries(&registry, &memberships);
}

#[test]
fn fuzz_views_on_sparse_membership() {
    // Heavily skewed membership exercises the smallest-pool selection.
    let mut rng = fastrand::Rng::with_seed(0xCAFE_0002);
    let mut registry = Registry::new();
    let mut memberships: HashMap<Entity, Membership> = HashMap::new();

    for _ in 0..300 {
        let e = registry.create_entity();
        let m = Membership {
            a: rng.u32(0..100) < 90,
            b: rng.u32(0..100) < 10,
            c: rng.u32(0..100) < 2,
        };
        if m.a {
            registry.emplace(e, A(0));
        }
        if m.b {
            registry.emplace(e, B(0));
        }
        if m.c {
            registry.emplace(e, C(0));
        }
        memberships.insert(e, m);
    }

    check_all_queries(&registry, &memberships);
}
