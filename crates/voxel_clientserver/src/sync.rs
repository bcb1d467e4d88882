//! Shared state of the synchronization systems.
//!
//! The visibility and synchronizer systems run inside the scheduler like
//! any other system, but their outbound messages and per-remote state live
//! here, behind a handle both the systems and the owning instance share.
//! Systems fill the [`SyncState::outbox`]; the instance drains it into the
//! connections after the tick.

use std::time::Instant;

use tracing::warn;
use voxel_ecs::{ComponentTypeId, Entity, Registry};
use voxel_net::{kind, Message};

use crate::instance::InstanceId;
use crate::messages::{AddEntityBody, DelEntityBody, EntityInit};
use crate::synchronizer::SynchronizerState;
use crate::visibility::VisibilityState;

/// State shared between an instance and its synchronization systems.
#[derive(Default)]
pub struct SyncState {
    /// Remotes connected at the start of the current tick.
    pub remotes: Vec<InstanceId>,
    /// Entities destroyed since the last visibility evaluation.
    pub destroyed: Vec<Entity>,
    /// Visibility tracking, if a rule is installed.
    pub visibility: Option<VisibilityState>,
    /// Whole-value synchronization, if a synchronizer is installed.
    pub synchronizer: Option<SynchronizerState>,
    /// Messages produced by systems this tick, drained by the instance.
    pub outbox: Vec<(InstanceId, Message)>,
}

fn component_types_of(registry: &Registry, entity: Entity) -> Vec<ComponentTypeId> {
    registry
        .registered_types()
        .filter(|&type_id| registry.contains_type(type_id, entity))
        .collect()
}

impl SyncState {
    /// One visibility pass: updates per-remote status and batches
    /// `ADD_ENTITY` / `DEL_ENTITY` transitions into the outbox.
    pub fn run_visibility(&mut self, registry: &Registry) {
        let Self {
            remotes,
            destroyed,
            visibility,
            outbox,
            ..
        } = self;
        let Some(visibility) = visibility.as_mut() else {
            destroyed.clear();
            return;
        };

        for &remote in remotes.iter() {
            let (added, removed) = visibility.update_remote(registry, remote, destroyed);

            if !added.is_empty() {
                let body = AddEntityBody {
                    entities: added
                        .into_iter()
                        .map(|entity| EntityInit {
                            entity,
                            components: component_types_of(registry, entity),
                        })
                        .collect(),
                };
                match Message::new(kind::ADD_ENTITY, &body) {
                    Ok(message) => outbox.push((remote, message)),
                    Err(error) => warn!(%error, "failed to encode add_entity batch"),
                }
            }

            if !removed.is_empty() {
                let body = DelEntityBody { entities: removed };
                match Message::new(kind::DEL_ENTITY, &body) {
                    Ok(message) => outbox.push((remote, message)),
                    Err(error) => warn!(%error, "failed to encode del_entity batch"),
                }
            }
        }

        destroyed.clear();
    }

    /// One synchronizer pass: emits due `SET_COMPONENT` updates for every
    /// remote's visible entities.
    pub fn run_synchronizer(&mut self, registry: &Registry, now: Instant) {
        let Self {
            remotes,
            visibility,
            synchronizer,
            outbox,
            ..
        } = self;
        let (Some(visibility), Some(synchronizer)) =
            (visibility.as_ref(), synchronizer.as_mut())
        else {
            return;
        };

        for &remote in remotes.iter() {
            let visible = visibility.visible_entities(remote);
            for body in synchronizer.collect_updates(registry, remote, &visible, now) {
                match Message::new(kind::SET_COMPONENT, &body) {
                    Ok(message) => outbox.push((remote, message)),
                    Err(error) => warn!(%error, "failed to encode set_component"),
                }
            }
        }
    }

    /// Drops per-remote state on disconnect.
    pub fn forget_remote(&mut self, remote: InstanceId) {
        self.remotes.retain(|&r| r != remote);
        if let Some(visibility) = self.visibility.as_mut() {
            visibility.forget_remote(remote);
        }
        if let Some(synchronizer) = self.synchronizer.as_mut() {
            synchronizer.forget_remote(remote);
        }
    }

    /// Drops per-entity state on destruction and queues the entity for the
    /// next visibility pass.
    pub fn note_destroyed(&mut self, entity: Entity) {
        self.destroyed.push(entity);
        if let Some(synchronizer) = self.synchronizer.as_mut() {
            synchronizer.forget_entity(entity);
        }
    }
}
