//! Remote initializers.
//!
//! When a mirror entity is created by an inbound `ADD_ENTITY`, components
//! that registered an initializer get a chance to set up receiving-side
//! state before the first `SET_COMPONENT` for that entity is processed.
//! `ADD_ENTITY` carries the component types attached on the authoritative
//! side, so the receiver knows which initializers apply.

use std::collections::HashMap;
use std::sync::Arc;

use voxel_ecs::{Component, ComponentTypeId, Entity, Registry};

use crate::instance::InstanceId;

type InitFn = Arc<dyn Fn(&mut Registry, Entity, InstanceId) + Send + Sync>;

/// Per-component-type initializers run on mirror creation.
#[derive(Default)]
pub struct RemoteInitRegistry {
    handlers: HashMap<ComponentTypeId, InitFn>,
}

impl RemoteInitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the initializer for component type `C`, replacing any
    /// previous one.
    pub fn register<C: Component>(
        &mut self,
        init: impl Fn(&mut Registry, Entity, InstanceId) + Send + Sync + 'static,
    ) {
        self.handlers
            .insert(ComponentTypeId::of::<C>(), Arc::new(init));
    }

    /// Returns `true` if an initializer exists for the type.
    #[must_use]
    pub fn has(&self, component: ComponentTypeId) -> bool {
        self.handlers.contains_key(&component)
    }

    /// Runs the initializers of every listed component type for a freshly
    /// created mirror.
    pub fn run(
        &self,
        registry: &mut Registry,
        entity: Entity,
        remote: InstanceId,
        components: &[ComponentTypeId],
    ) {
        for component in components {
            if let Some(init) = self.handlers.get(component) {
                init(registry, entity, remote);
            }
        }
    }
}
