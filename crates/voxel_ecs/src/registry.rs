//! The registry: entity store plus a type-keyed map of component pools.
//!
//! Invariants maintained here rather than in the pools:
//!
//! - any entity present in any pool is alive in the entity store;
//! - destroying an entity removes it from every pool before tombstoning it.
//!
//! Pools are stored behind the type-erased [`AnyPool`] vtable so that
//! whole-registry operations (destroy-everywhere) and the replication layer
//! (serialize/apply by [`ComponentTypeId`]) can reach them without knowing
//! the concrete component type.

use std::any::Any;
use std::collections::HashMap;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::lifetime::EntityLifetimes;
use crate::pool::ComponentPool;
use crate::sparse_set::SparseSet;

/// Type-erased view of a [`ComponentPool`].
pub trait AnyPool: Send + Sync {
    /// The stored component's type ID.
    fn component_type(&self) -> ComponentTypeId;
    /// Number of entities in the pool.
    fn len(&self) -> usize;
    /// Index+version membership test.
    fn contains(&self, entity: Entity) -> bool;
    /// Erases the entity's value; returns whether one was removed.
    fn erase(&mut self, entity: Entity) -> bool;
    /// Removes every value.
    fn clear(&mut self);
    /// The entity set recording membership.
    fn entity_set(&self) -> &SparseSet;
    /// Serializes the entity's value to MessagePack, if present.
    fn serialize_value(&self, entity: Entity) -> Result<Option<Vec<u8>>, EcsError>;
    /// Decodes a MessagePack value and inserts or replaces it for the
    /// entity.
    fn apply_serialized(&mut self, entity: Entity, bytes: &[u8]) -> Result<(), EcsError>;
    /// Upcast for concrete downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for concrete downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> AnyPool for ComponentPool<C> {
    fn component_type(&self) -> ComponentTypeId {
        ComponentTypeId::of::<C>()
    }

    fn len(&self) -> usize {
        ComponentPool::len(self)
    }

    fn contains(&self, entity: Entity) -> bool {
        ComponentPool::contains(self, entity)
    }

    fn erase(&mut self, entity: Entity) -> bool {
        ComponentPool::erase(self, entity)
    }

    fn clear(&mut self) {
        ComponentPool::clear(self);
    }

    fn entity_set(&self) -> &SparseSet {
        ComponentPool::entity_set(self)
    }

    fn serialize_value(&self, entity: Entity) -> Result<Option<Vec<u8>>, EcsError> {
        match self.find(entity) {
            Some(value) => Ok(Some(rmp_serde::to_vec_named(value)?)),
            None => Ok(None),
        }
    }

    fn apply_serialized(&mut self, entity: Entity, bytes: &[u8]) -> Result<(), EcsError> {
        let value: C = rmp_serde::from_slice(bytes)?;
        match self.find_mut(entity) {
            Some(slot) => *slot = value,
            None => {
                self.emplace(entity, value);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entity store plus component pools.
#[derive(Default)]
pub struct Registry {
    lifetimes: EntityLifetimes,
    pools: HashMap<ComponentTypeId, Box<dyn AnyPool>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entity.
    pub fn create_entity(&mut self) -> Entity {
        self.lifetimes.create()
    }

    /// Creates an entity with the given ID; see
    /// [`EntityLifetimes::create_with_id`].
    pub fn create_entity_with_id(&mut self, entity: Entity) -> bool {
        self.lifetimes.create_with_id(entity)
    }

    /// Destroys an entity, removing it from every pool first. Returns
    /// whether the entity was alive.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.lifetimes.is_alive(entity) {
            return false;
        }
        for pool in self.pools.values_mut() {
            pool.erase(entity);
        }
        self.lifetimes.destroy(entity)
    }

    /// Returns `true` if the exact entity is currently alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.lifetimes.is_alive(entity)
    }

    /// Returns `true` if the entity existed in the past but no longer does.
    #[must_use]
    pub fn is_dead(&self, entity: Entity) -> bool {
        self.lifetimes.is_dead(entity)
    }

    /// Returns `true` if the entity exists or has ever existed.
    #[must_use]
    pub fn has_existed(&self, entity: Entity) -> bool {
        self.lifetimes.has_existed(entity)
    }

    /// Number of currently alive entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.lifetimes.alive_count()
    }

    /// The set of alive entities.
    #[must_use]
    pub fn entities(&self) -> &SparseSet {
        self.lifetimes.alive()
    }

    /// The entity lifetime manager.
    #[must_use]
    pub fn lifetimes(&self) -> &EntityLifetimes {
        &self.lifetimes
    }

    /// Ensures a pool exists for the component type.
    pub fn register<C: Component>(&mut self) {
        self.pools
            .entry(ComponentTypeId::of::<C>())
            .or_insert_with(|| Box::new(ComponentPool::<C>::new()));
    }

    /// Returns the pool for a component type, if registered.
    #[must_use]
    pub fn pool<C: Component>(&self) -> Option<&ComponentPool<C>> {
        self.pools
            .get(&ComponentTypeId::of::<C>())
            .and_then(|p| p.as_any().downcast_ref())
    }

    /// Returns the mutable pool for a component type, if registered.
    #[must_use]
    pub fn pool_mut<C: Component>(&mut self) -> Option<&mut ComponentPool<C>> {
        self.pools
            .get_mut(&ComponentTypeId::of::<C>())
            .and_then(|p| p.as_any_mut().downcast_mut())
    }

    /// Attaches a component to an alive entity. The pool is registered on
    /// first use. Returns `false` if the entity is not alive or already has
    /// the component.
    pub fn emplace<C: Component>(&mut self, entity: Entity, value: C) -> bool {
        if !self.lifetimes.is_alive(entity) {
            debug_assert!(false, "emplace on dead entity {entity}");
            return false;
        }
        self.register::<C>();
        self.pool_mut::<C>()
            .map(|pool| pool.emplace(entity, value).1)
            .unwrap_or(false)
    }

    /// Detaches a component from an entity. Returns whether one was removed.
    pub fn erase<C: Component>(&mut self, entity: Entity) -> bool {
        self.pool_mut::<C>()
            .map(|pool| pool.erase(entity))
            .unwrap_or(false)
    }

    /// Returns a reference to an entity's component, if present.
    #[must_use]
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.pool::<C>()?.find(entity)
    }

    /// Returns a mutable reference to an entity's component, if present.
    #[must_use]
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        self.pool_mut::<C>()?.find_mut(entity)
    }

    /// Returns `true` if the entity has the component.
    #[must_use]
    pub fn contains<C: Component>(&self, entity: Entity) -> bool {
        self.pool::<C>().is_some_and(|pool| pool.contains(entity))
    }

    /// Returns `true` if the entity has the component type, by ID.
    #[must_use]
    pub fn contains_type(&self, type_id: ComponentTypeId, entity: Entity) -> bool {
        self.pools
            .get(&type_id)
            .is_some_and(|pool| pool.contains(entity))
    }

    /// Returns the type-erased pool for a component type ID.
    #[must_use]
    pub fn any_pool(&self, type_id: ComponentTypeId) -> Option<&dyn AnyPool> {
        self.pools.get(&type_id).map(|p| p.as_ref())
    }

    /// Returns the mutable type-erased pool for a component type ID.
    #[must_use]
    pub fn any_pool_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut (dyn AnyPool + '_)> {
        match self.pools.get_mut(&type_id) {
            Some(p) => Some(p.as_mut()),
            None => None,
        }
    }

    /// Iterates the IDs of all registered component types.
    pub fn registered_types(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.pools.keys().copied()
    }
}
