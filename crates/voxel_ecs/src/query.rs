//! Compile-time boolean queries over component membership.
//!
//! A query is a type built from [`Has`], [`And`], [`Or`], [`Not`] and the
//! constants [`All`] / [`Nothing`]. From the query type the view engine
//! derives four component sets:
//!
//! - *included* — present on every matched entity (e.g. `X` in `Has<X>`);
//! - *optional* — presence varies across matched entities (e.g. `X` and `Y`
//!   in `Or<Has<X>, Has<Y>>`);
//! - *excluded* — guaranteed absent (e.g. `X` in `Not<Has<X>>`);
//! - *accessed* — every component the query mentions.
//!
//! A query is a *closed set* when the union of its accessed components'
//! entity sets is a superset of every entity it can match; open queries
//! (e.g. `Not<Has<X>>`) must fall back to scanning the alive set.

use std::marker::PhantomData;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::registry::Registry;

/// Which component set a traversal is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseMode {
    /// Components always present on matched entities.
    MustInclude,
    /// Components conditionally present on matched entities.
    CouldInclude,
    /// Components always absent from matched entities.
    MustExclude,
    /// Components conditionally absent from matched entities.
    CouldExclude,
    /// Every component the query mentions.
    Everything,
}

/// A boolean query over component membership.
pub trait QueryExpr: 'static {
    /// Projection for positions where the query guarantees presence:
    /// `&C` for included terms, `Option<&C>` under a disjunction, `()` for
    /// negations and constants. Composite queries nest tuples.
    type Refs<'a>;

    /// Projection used under a disjunction, where any term may be absent.
    type OptRefs<'a>;

    /// Evaluates the query against an entity's current membership.
    fn matches(registry: &Registry, entity: Entity) -> bool;

    /// Collects component IDs for the given traversal; `conditional` is set
    /// inside a disjunction, `negated` under an odd number of negations.
    fn collect(mode: TraverseMode, conditional: bool, negated: bool, out: &mut Vec<ComponentTypeId>);

    /// Whether the accessed components' entity sets cover every possible
    /// match.
    fn is_closed_set() -> bool;

    /// Projects the entity's components if it matches the query.
    fn fetch(registry: &Registry, entity: Entity) -> Option<Self::Refs<'_>>;

    /// Projects the entity's components with every term optional.
    fn fetch_opt(registry: &Registry, entity: Entity) -> Self::OptRefs<'_>;
}

/// Matches entities that have component `C`.
pub struct Has<C: Component>(PhantomData<C>);

impl<C: Component> QueryExpr for Has<C> {
    type Refs<'a> = &'a C;
    type OptRefs<'a> = Option<&'a C>;

    fn matches(registry: &Registry, entity: Entity) -> bool {
        registry.contains::<C>(entity)
    }

    fn collect(mode: TraverseMode, conditional: bool, negated: bool, out: &mut Vec<ComponentTypeId>) {
        let wanted = match mode {
            TraverseMode::Everything => true,
            TraverseMode::MustInclude => !conditional && !negated,
            TraverseMode::CouldInclude => conditional && !negated,
            TraverseMode::MustExclude => !conditional && negated,
            TraverseMode::CouldExclude => conditional && negated,
        };
        if wanted {
            out.push(ComponentTypeId::of::<C>());
        }
    }

    fn is_closed_set() -> bool {
        true
    }

    fn fetch(registry: &Registry, entity: Entity) -> Option<Self::Refs<'_>> {
        registry.get::<C>(entity)
    }

    fn fetch_opt(registry: &Registry, entity: Entity) -> Self::OptRefs<'_> {
        registry.get::<C>(entity)
    }
}

/// Matches entities that satisfy both sub-queries.
pub struct And<L: QueryExpr, R: QueryExpr>(PhantomData<(L, R)>);

impl<L: QueryExpr, R: QueryExpr> QueryExpr for And<L, R> {
    type Refs<'a> = (L::Refs<'a>, R::Refs<'a>);
    type OptRefs<'a> = (L::OptRefs<'a>, R::OptRefs<'a>);

    fn matches(registry: &Registry, entity: Entity) -> bool {
        L::matches(registry, entity) && R::matches(registry, entity)
    }

    fn collect(mode: TraverseMode, conditional: bool, negated: bool, out: &mut Vec<ComponentTypeId>) {
        L::collect(mode, conditional, negated, out);
        R::collect(mode, conditional, negated, out);
    }

    fn is_closed_set() -> bool {
        L::is_closed_set() || R::is_closed_set()
    }

    fn fetch(registry: &Registry, entity: Entity) -> Option<Self::Refs<'_>> {
        Some((L::fetch(registry, entity)?, R::fetch(registry, entity)?))
    }

    fn fetch_opt(registry: &Registry, entity: Entity) -> Self::OptRefs<'_> {
        (L::fetch_opt(registry, entity), R::fetch_opt(registry, entity))
    }
}

/// Matches entities that satisfy either sub-query.
pub struct Or<L: QueryExpr, R: QueryExpr>(PhantomData<(L, R)>);

impl<L: QueryExpr, R: QueryExpr> QueryExpr for Or<L, R> {
    type Refs<'a> = (L::OptRefs<'a>, R::OptRefs<'a>);
    type OptRefs<'a> = (L::OptRefs<'a>, R::OptRefs<'a>);

    fn matches(registry: &Registry, entity: Entity) -> bool {
        L::matches(registry, entity) || R::matches(registry, entity)
    }

    fn collect(mode: TraverseMode, _conditional: bool, negated: bool, out: &mut Vec<ComponentTypeId>) {
        L::collect(mode, true, negated, out);
        R::collect(mode, true, negated, out);
    }

    fn is_closed_set() -> bool {
        L::is_closed_set() && R::is_closed_set()
    }

    fn fetch(registry: &Registry, entity: Entity) -> Option<Self::Refs<'_>> {
        Self::matches(registry, entity).then(|| Self::fetch_opt(registry, entity))
    }

    fn fetch_opt(registry: &Registry, entity: Entity) -> Self::OptRefs<'_> {
        (L::fetch_opt(registry, entity), R::fetch_opt(registry, entity))
    }
}

/// Matches entities that do not satisfy the sub-query.
pub struct Not<Q: QueryExpr>(PhantomData<Q>);

impl<Q: QueryExpr> QueryExpr for Not<Q> {
    type Refs<'a> = ();
    type OptRefs<'a> = ();

    fn matches(registry: &Registry, entity: Entity) -> bool {
        !Q::matches(registry, entity)
    }

    fn collect(mode: TraverseMode, conditional: bool, negated: bool, out: &mut Vec<ComponentTypeId>) {
        Q::collect(mode, conditional, !negated, out);
    }

    fn is_closed_set() -> bool {
        !Q::is_closed_set()
    }

    fn fetch(registry: &Registry, entity: Entity) -> Option<Self::Refs<'_>> {
        (!Q::matches(registry, entity)).then_some(())
    }

    fn fetch_opt(_registry: &Registry, _entity: Entity) -> Self::OptRefs<'_> {}
}

/// The constant-true query; matches every alive entity.
pub struct All;

impl QueryExpr for All {
    type Refs<'a> = ();
    type OptRefs<'a> = ();

    fn matches(_registry: &Registry, _entity: Entity) -> bool {
        true
    }

    fn collect(_: TraverseMode, _: bool, _: bool, _: &mut Vec<ComponentTypeId>) {}

    fn is_closed_set() -> bool {
        false
    }

    fn fetch(_registry: &Registry, _entity: Entity) -> Option<Self::Refs<'_>> {
        Some(())
    }

    fn fetch_opt(_registry: &Registry, _entity: Entity) -> Self::OptRefs<'_> {}
}

/// The constant-false query; matches nothing.
pub struct Nothing;

impl QueryExpr for Nothing {
    type Refs<'a> = ();
    type OptRefs<'a> = ();

    fn matches(_registry: &Registry, _entity: Entity) -> bool {
        false
    }

    fn collect(_: TraverseMode, _: bool, _: bool, _: &mut Vec<ComponentTypeId>) {}

    fn is_closed_set() -> bool {
        true
    }

    fn fetch(_registry: &Registry, _entity: Entity) -> Option<Self::Refs<'_>> {
        None
    }

    fn fetch_opt(_registry: &Registry, _entity: Entity) -> Self::OptRefs<'_> {}
}

fn collect_unique<Q: QueryExpr>(mode: TraverseMode) -> Vec<ComponentTypeId> {
    let mut out = Vec::new();
    Q::collect(mode, false, false, &mut out);
    out.sort_unstable();
    out.dedup();
    out
}

/// Components guaranteed present on every entity matched by `Q`.
#[must_use]
pub fn included_components<Q: QueryExpr>() -> Vec<ComponentTypeId> {
    collect_unique::<Q>(TraverseMode::MustInclude)
}

/// Components whose presence varies across entities matched by `Q`.
#[must_use]
pub fn optional_components<Q: QueryExpr>() -> Vec<ComponentTypeId> {
    collect_unique::<Q>(TraverseMode::CouldInclude)
}

/// Components guaranteed absent from every entity matched by `Q`.
#[must_use]
pub fn excluded_components<Q: QueryExpr>() -> Vec<ComponentTypeId> {
    collect_unique::<Q>(TraverseMode::MustExclude)
}

/// Every component mentioned by `Q`; the pools a view must open.
#[must_use]
pub fn accessed_components<Q: QueryExpr>() -> Vec<ComponentTypeId> {
    collect_unique::<Q>(TraverseMode::Everything)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    macro_rules! test_component {
        ($name:ident) => {
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            struct $name(u32);

            impl Component for $name {
                fn type_name() -> &'static str {
                    concat!("query_test::", stringify!($name))
                }
            }
        };
    }

    test_component!(A);
    test_component!(B);
    test_component!(C);

    #[test]
    fn test_has_sets() {
        assert_eq!(included_components::<Has<A>>(), vec![A::component_type_id()]);
        assert!(optional_components::<Has<A>>().is_empty());
        assert!(excluded_components::<Has<A>>().is_empty());
        assert!(Has::<A>::is_closed_set());
    }

    #[test]
    fn test_conjunction_sets() {
        type Q = And<Has<A>, Has<B>>;
        let mut expected = vec![A::component_type_id(), B::component_type_id()];
        expected.sort_unstable();
        assert_eq!(included_components::<Q>(), expected);
        assert!(Q::is_closed_set());
    }

    #[test]
    fn test_disjunction_sets() {
        type Q = Or<Has<A>, Has<B>>;
        assert!(included_components::<Q>().is_empty());
        let mut expected = vec![A::component_type_id(), B::component_type_id()];
        expected.sort_unstable();
        assert_eq!(optional_components::<Q>(), expected);
        assert!(Q::is_closed_set());
    }

    #[test]
    fn test_negation_sets() {
        type Q = Not<Has<A>>;
        assert!(included_components::<Q>().is_empty());
        assert_eq!(excluded_components::<Q>(), vec![A::component_type_id()]);
        assert!(!Q::is_closed_set());
        // Double negation restores inclusion.
        assert_eq!(
            included_components::<Not<Not<Has<A>>>>(),
            vec![A::component_type_id()]
        );
    }

    #[test]
    fn test_mixed_query_sets() {
        // A && (B || !C)
        type Q = And<Has<A>, Or<Has<B>, Not<Has<C>>>>;
        assert_eq!(included_components::<Q>(), vec![A::component_type_id()]);
        assert_eq!(optional_components::<Q>(), vec![B::component_type_id()]);
        // C is conditionally excluded, not always excluded.
        assert!(excluded_components::<Q>().is_empty());
        assert_eq!(accessed_components::<Q>().len(), 3);
        assert!(Q::is_closed_set());
    }

    #[test]
    fn test_constants() {
        assert!(!All::is_closed_set());
        assert!(Nothing::is_closed_set());
        assert!(accessed_components::<All>().is_empty());
    }

    #[test]
    fn test_matches_and_fetch() {
        let mut reg = Registry::new();
        let both = reg.create_entity();
        reg.emplace(both, A(1));
        reg.emplace(both, B(2));
        let only_a = reg.create_entity();
        reg.emplace(only_a, A(3));

        assert!(And::<Has<A>, Has<B>>::matches(&reg, both));
        assert!(!And::<Has<A>, Has<B>>::matches(&reg, only_a));
        assert!(Or::<Has<A>, Has<B>>::matches(&reg, only_a));
        assert!(Not::<Has<B>>::matches(&reg, only_a));

        let (a, b) = And::<Has<A>, Has<B>>::fetch(&reg, both).unwrap();
        assert_eq!(a.0, 1);
        assert_eq!(b.0, 2);
        assert!(And::<Has<A>, Has<B>>::fetch(&reg, only_a).is_none());

        let (a, b) = Or::<Has<A>, Has<B>>::fetch(&reg, only_a).unwrap();
        assert_eq!(a.map(|v| v.0), Some(3));
        assert!(b.is_none());
    }
}
