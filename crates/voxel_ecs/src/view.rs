//! Query views over a registry.
//!
//! A [`View`] turns a [`QueryExpr`] into an iteration plan:
//!
//! 1. if the query has at least one *included* component, iterate the
//!    smallest such pool and filter by the remaining predicates;
//! 2. else, for a closed-set query with *optional* components, iterate the
//!    union of their entity sets, de-duplicating;
//! 3. else, iterate the registry's alive set.
//!
//! Each qualifying entity is yielded exactly once per traversal. Views are
//! read-only; mutation goes through [`Registry::get_mut`] under the
//! scheduler's declared write access.

use std::marker::PhantomData;

use crate::component::ComponentTypeId;
use crate::entity::Entity;
use crate::query::{self, QueryExpr};
use crate::registry::Registry;

#[derive(Debug, Clone)]
enum Plan {
    /// Iterate one pool's entity set.
    Pool(ComponentTypeId),
    /// Iterate the union of several pools' entity sets, de-duplicating.
    Union(Vec<ComponentTypeId>),
    /// Iterate the alive set.
    AllEntities,
    /// Nothing can match (an included pool is not even registered).
    Empty,
}

/// An iterable view of all entities matching a query.
pub struct View<'r, Q: QueryExpr> {
    registry: &'r Registry,
    plan: Plan,
    _query: PhantomData<Q>,
}

impl<'r, Q: QueryExpr> View<'r, Q> {
    /// Builds a view, choosing the cheapest iteration plan for the current
    /// pool sizes.
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        let included = query::included_components::<Q>();
        let optional = query::optional_components::<Q>();

        let plan = if !included.is_empty() {
            let smallest = included
                .iter()
                .map(|&id| (id, registry.any_pool(id).map(|p| p.len())))
                .min_by_key(|(_, len)| len.unwrap_or(0));
            match smallest {
                Some((id, Some(_))) => Plan::Pool(id),
                // An included component with no pool: nothing can match.
                _ => Plan::Empty,
            }
        } else if !optional.is_empty() && Q::is_closed_set() {
            let registered: Vec<_> = optional
                .into_iter()
                .filter(|&id| registry.any_pool(id).is_some())
                .collect();
            if registered.is_empty() {
                Plan::Empty
            } else {
                Plan::Union(registered)
            }
        } else {
            Plan::AllEntities
        };

        Self {
            registry,
            plan,
            _query: PhantomData,
        }
    }

    /// Iterates matching entities, each exactly once.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + 'r {
        let registry = self.registry;
        let candidates: Box<dyn Iterator<Item = Entity> + 'r> = match &self.plan {
            Plan::Pool(id) => match registry.any_pool(*id) {
                Some(pool) => Box::new(pool.entity_set().iter()),
                None => Box::new(std::iter::empty()),
            },
            Plan::Union(ids) => {
                let ids = ids.clone();
                Box::new(ids.clone().into_iter().enumerate().flat_map(move |(k, id)| {
                    let earlier = ids[..k].to_vec();
                    registry
                        .any_pool(id)
                        .map(|pool| pool.entity_set().iter())
                        .into_iter()
                        .flatten()
                        .filter(move |&e| {
                            // Skip entities already yielded by an earlier
                            // pool of the union.
                            !earlier
                                .iter()
                                .any(|&prev| registry.contains_type(prev, e))
                        })
                }))
            }
            Plan::AllEntities => Box::new(registry.entities().iter()),
            Plan::Empty => Box::new(std::iter::empty()),
        };

        candidates.filter(move |&e| Q::matches(registry, e))
    }

    /// Iterates `(entity, projection)` pairs for matching entities.
    ///
    /// Included components project as `&C`, optional ones as `Option<&C>`,
    /// following the query's shape.
    pub fn iter_with(&self) -> impl Iterator<Item = (Entity, Q::Refs<'r>)> + 'r {
        let registry = self.registry;
        self.iter()
            .filter_map(move |e| Q::fetch(registry, e).map(|refs| (e, refs)))
    }

    /// Counts matching entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

impl Registry {
    /// Builds a read-only view of all entities matching `Q`.
    #[must_use]
    pub fn view<Q: QueryExpr>(&self) -> View<'_, Q> {
        View::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::query::{All, And, Has, Not, Nothing, Or};
    use serde::{Deserialize, Serialize};

    macro_rules! test_component {
        ($name:ident) => {
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            struct $name(u32);

            impl Component for $name {
                fn type_name() -> &'static str {
                    concat!("view_test::", stringify!($name))
                }
            }
        };
    }

    test_component!(A);
    test_component!(B);
    test_component!(C);

    /// abc bit flags select which components each entity receives.
    fn populate(reg: &mut Registry, memberships: &[u8]) -> Vec<Entity> {
        memberships
            .iter()
            .map(|&bits| {
                let e = reg.create_entity();
                if bits & 0b001 != 0 {
                    reg.emplace(e, A(1));
                }
                if bits & 0b010 != 0 {
                    reg.emplace(e, B(2));
                }
                if bits & 0b100 != 0 {
                    reg.emplace(e, C(3));
                }
                e
            })
            .collect()
    }

    #[test]
    fn test_single_inclusion() {
        let mut reg = Registry::new();
        let entities = populate(&mut reg, &[0b001, 0b010, 0b011, 0b000]);

        let matched: Vec<_> = reg.view::<Has<A>>().iter().collect();
        assert_eq!(matched.len(), 2);
        assert!(matched.contains(&entities[0]));
        assert!(matched.contains(&entities[2]));
    }

    #[test]
    fn test_conjunction_iterates_smallest_pool() {
        let mut reg = Registry::new();
        populate(&mut reg, &[0b001, 0b001, 0b001, 0b011, 0b010]);

        let view = reg.view::<And<Has<A>, Has<B>>>();
        let matched: Vec<_> = view.iter().collect();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_disjunction_yields_each_entity_once() {
        let mut reg = Registry::new();
        let entities = populate(&mut reg, &[0b001, 0b010, 0b011, 0b100]);

        let matched: Vec<_> = reg.view::<Or<Has<A>, Has<B>>>().iter().collect();
        assert_eq!(matched.len(), 3);
        // The A&&B entity appears exactly once.
        let hits = matched.iter().filter(|&&e| e == entities[2]).count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_negation_scans_alive_set() {
        let mut reg = Registry::new();
        let entities = populate(&mut reg, &[0b001, 0b000, 0b010]);

        let matched: Vec<_> = reg.view::<Not<Has<A>>>().iter().collect();
        assert_eq!(matched.len(), 2);
        assert!(!matched.contains(&entities[0]));
    }

    #[test]
    fn test_universal_and_empty_queries() {
        let mut reg = Registry::new();
        populate(&mut reg, &[0b001, 0b010, 0b000]);

        assert_eq!(reg.view::<All>().count(), 3);
        assert_eq!(reg.view::<Nothing>().count(), 0);
    }

    #[test]
    fn test_unregistered_included_pool_matches_nothing() {
        let mut reg = Registry::new();
        populate(&mut reg, &[0b010]);
        assert_eq!(reg.view::<Has<A>>().count(), 0);
    }

    #[test]
    fn test_composite_query() {
        let mut reg = Registry::new();
        let entities = populate(&mut reg, &[0b001, 0b011, 0b101, 0b111, 0b110]);

        // A && !C
        let matched: Vec<_> = reg.view::<And<Has<A>, Not<Has<C>>>>().iter().collect();
        assert_eq!(matched.len(), 2);
        assert!(matched.contains(&entities[0]));
        assert!(matched.contains(&entities[1]));
    }

    #[test]
    fn test_iter_with_projections() {
        let mut reg = Registry::new();
        populate(&mut reg, &[0b011, 0b001]);

        for (entity, (a, b)) in reg.view::<And<Has<A>, Or<Has<B>, Has<C>>>>().iter_with() {
            assert_eq!(a.0, 1);
            let (b, c) = b;
            assert!(b.is_some() || c.is_some());
            assert!(reg.is_alive(entity));
        }

        let count = reg
            .view::<And<Has<A>, Or<Has<B>, Has<C>>>>()
            .iter_with()
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_view_respects_destroyed_entities() {
        let mut reg = Registry::new();
        let entities = populate(&mut reg, &[0b001, 0b001]);
        reg.destroy_entity(entities[0]);

        let matched: Vec<_> = reg.view::<Has<A>>().iter().collect();
        assert_eq!(matched, vec![entities[1]]);
    }
}
