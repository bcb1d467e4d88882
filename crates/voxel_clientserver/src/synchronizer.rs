//! Whole-value component synchronization.
//!
//! The synchronizer replicates a chosen set of component types: each tick,
//! for each remote and each visible entity, a `SET_COMPONENT` update is
//! emitted when the serialized value differs from the last one sent to that
//! remote and the per-type sync rate allows it. Values applied from a
//! remote are recorded in the same cache so they are not immediately echoed
//! back to their source.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use voxel_ecs::{Component, ComponentTypeId, Entity, Registry};

use crate::instance::InstanceId;
use crate::messages::SetComponentBody;

/// Builder for the set of component types a synchronizer replicates, plus
/// an optional tag set restricting which entities participate.
///
/// Carrying the registration thunk per type lets the instance create the
/// concrete pools on both sides before any type-erased value arrives.
#[derive(Default, Clone)]
pub struct SyncedComponents {
    entries: Vec<(ComponentTypeId, fn(&mut Registry))>,
    tags: Vec<(ComponentTypeId, fn(&mut Registry))>,
}

impl SyncedComponents {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds component type `C` to the replicated set.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.entries
            .push((ComponentTypeId::of::<C>(), |registry| registry.register::<C>()));
        self
    }

    /// Restricts synchronization to entities carrying tag component `T`.
    /// Multiple tags require all of them.
    #[must_use]
    pub fn tagged<T: Component>(mut self) -> Self {
        self.tags
            .push((ComponentTypeId::of::<T>(), |registry| registry.register::<T>()));
        self
    }

    /// The type IDs in the replicated set.
    #[must_use]
    pub fn type_ids(&self) -> Vec<ComponentTypeId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// The type IDs of the restricting tags.
    #[must_use]
    pub fn tag_ids(&self) -> Vec<ComponentTypeId> {
        self.tags.iter().map(|(id, _)| *id).collect()
    }

    /// Registers every pool in the set, tags included.
    pub fn register_pools(&self, registry: &mut Registry) {
        for (_, register) in self.entries.iter().chain(&self.tags) {
            register(registry);
        }
    }
}

struct SendRecord {
    data: Vec<u8>,
    at: Instant,
}

/// Change cache and rate limits for one instance's synchronizer.
pub struct SynchronizerState {
    types: Vec<ComponentTypeId>,
    tags: Vec<ComponentTypeId>,
    rates: HashMap<ComponentTypeId, Duration>,
    last_sent: HashMap<(InstanceId, Entity, ComponentTypeId), SendRecord>,
}

impl SynchronizerState {
    /// Creates a synchronizer for the given component types; every type
    /// starts at rate zero (sync every tick). Entities participate only if
    /// they carry every tag type.
    #[must_use]
    pub fn new(types: Vec<ComponentTypeId>, tags: Vec<ComponentTypeId>) -> Self {
        Self {
            types,
            tags,
            rates: HashMap::new(),
            last_sent: HashMap::new(),
        }
    }

    /// The replicated component types.
    #[must_use]
    pub fn types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    /// Sets the minimum interval between sends of one component type.
    pub fn set_rate(&mut self, component: ComponentTypeId, rate: Duration) {
        self.rates.insert(component, rate);
    }

    fn rate(&self, component: ComponentTypeId) -> Duration {
        self.rates.get(&component).copied().unwrap_or(Duration::ZERO)
    }

    /// Collects the updates due for one remote over its visible entities.
    pub fn collect_updates(
        &mut self,
        registry: &Registry,
        remote: InstanceId,
        visible: &[Entity],
        now: Instant,
    ) -> Vec<SetComponentBody> {
        let mut updates = Vec::new();

        for &entity in visible {
            if !self
                .tags
                .iter()
                .all(|&tag| registry.contains_type(tag, entity))
            {
                continue;
            }
            for &component in &self.types {
                let Some(pool) = registry.any_pool(component) else {
                    continue;
                };
                let Ok(Some(data)) = pool.serialize_value(entity) else {
                    continue;
                };

                let key = (remote, entity, component);
                let rate = self.rate(component);
                let due = match self.last_sent.get(&key) {
                    Some(record) => {
                        record.data != data && now.duration_since(record.at) >= rate
                    }
                    None => true,
                };
                if !due {
                    continue;
                }

                self.last_sent.insert(
                    key,
                    SendRecord {
                        data: data.clone(),
                        at: now,
                    },
                );
                updates.push(SetComponentBody {
                    component_type: component,
                    entity,
                    data,
                });
            }
        }

        updates
    }

    /// Records a value applied *from* a remote so the next tick does not
    /// echo it straight back.
    pub fn note_applied(
        &mut self,
        remote: InstanceId,
        entity: Entity,
        component: ComponentTypeId,
        data: &[u8],
        now: Instant,
    ) {
        self.last_sent.insert(
            (remote, entity, component),
            SendRecord {
                data: data.to_vec(),
                at: now,
            },
        );
    }

    /// Drops all cache entries for a disconnected remote.
    pub fn forget_remote(&mut self, remote: InstanceId) {
        self.last_sent.retain(|(r, _, _), _| *r != remote);
    }

    /// Drops all cache entries for a destroyed entity.
    pub fn forget_entity(&mut self, entity: Entity) {
        self.last_sent.retain(|(_, e, _), _| *e != entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Health {
        value: i32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "synchronizer_test::Health"
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    struct Replicated;

    impl Component for Replicated {
        fn type_name() -> &'static str {
            "synchronizer_test::Replicated"
        }
        const ELUDE_STORAGE: bool = true;
    }

    fn setup() -> (Registry, Entity, SynchronizerState, InstanceId) {
        let mut registry = Registry::new();
        let entity = registry.create_entity();
        registry.emplace(entity, Health { value: 11 });
        let state = SynchronizerState::new(vec![Health::component_type_id()], Vec::new());
        (registry, entity, state, uuid::Uuid::new_v4())
    }

    #[test]
    fn test_first_sight_is_sent_then_cached() {
        let (registry, entity, mut state, remote) = setup();
        let now = Instant::now();

        let updates = state.collect_updates(&registry, remote, &[entity], now);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entity, entity);

        // Unchanged value: nothing to send.
        let updates = state.collect_updates(&registry, remote, &[entity], now);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_changed_value_is_sent() {
        let (mut registry, entity, mut state, remote) = setup();
        let now = Instant::now();
        state.collect_updates(&registry, remote, &[entity], now);

        registry.get_mut::<Health>(entity).unwrap().value = 22;
        let updates = state.collect_updates(&registry, remote, &[entity], now);
        assert_eq!(updates.len(), 1);
        let value: Health = rmp_serde::from_slice(&updates[0].data).unwrap();
        assert_eq!(value.value, 22);
    }

    #[test]
    fn test_sync_rate_limits_updates() {
        let (mut registry, entity, mut state, remote) = setup();
        state.set_rate(Health::component_type_id(), Duration::from_secs(1000));
        let now = Instant::now();

        state.collect_updates(&registry, remote, &[entity], now);
        registry.get_mut::<Health>(entity).unwrap().value = 22;

        // Changed, but the rate holds it back.
        let updates = state.collect_updates(&registry, remote, &[entity], now);
        assert!(updates.is_empty());

        // Once the interval elapses the change goes out.
        let later = now + Duration::from_secs(1001);
        let updates = state.collect_updates(&registry, remote, &[entity], later);
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn test_note_applied_suppresses_echo() {
        let (mut registry, entity, mut state, remote) = setup();
        let now = Instant::now();

        // A remote value arrives and is applied.
        registry.get_mut::<Health>(entity).unwrap().value = 42;
        let bytes = rmp_serde::to_vec_named(&Health { value: 42 }).unwrap();
        state.note_applied(remote, entity, Health::component_type_id(), &bytes, now);

        let updates = state.collect_updates(&registry, remote, &[entity], now);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_tag_filter_excludes_untagged_entities() {
        let mut registry = Registry::new();
        registry.register::<Replicated>();
        let tagged = registry.create_entity();
        registry.emplace(tagged, Health { value: 1 });
        registry.emplace(tagged, Replicated);
        let untagged = registry.create_entity();
        registry.emplace(untagged, Health { value: 2 });

        let mut state = SynchronizerState::new(
            vec![Health::component_type_id()],
            vec![Replicated::component_type_id()],
        );
        let remote = uuid::Uuid::new_v4();

        let updates =
            state.collect_updates(&registry, remote, &[tagged, untagged], Instant::now());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entity, tagged);
    }

    #[test]
    fn test_remotes_have_independent_caches() {
        let (registry, entity, mut state, remote_a) = setup();
        let remote_b = uuid::Uuid::new_v4();
        let now = Instant::now();

        assert_eq!(
            state.collect_updates(&registry, remote_a, &[entity], now).len(),
            1
        );
        assert_eq!(
            state.collect_updates(&registry, remote_b, &[entity], now).len(),
            1
        );
    }
}
