//! Core message payload bodies.
//!
//! All bodies travel as named MessagePack inside the `[kind:u16][body]`
//! envelope of `voxel_net`. The engine-reserved kinds these correspond to
//! are listed in [`voxel_net::kind`].

use serde::{Deserialize, Serialize};
use voxel_ecs::{ComponentTypeId, Entity};

use crate::instance::InstanceId;
use crate::partial::MessageTypeId;

/// Body of the identity exchange, wrapped in an `IGNORE` message before any
/// handler is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBody {
    /// The sender's instance ID.
    pub instance_id: InstanceId,
}

/// One entity mirror to create, with the component types it carries on the
/// authoritative side so remote initializers can run before the first
/// component value arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInit {
    /// The entity ID to mirror.
    pub entity: Entity,
    /// Component types attached on the sending side.
    pub components: Vec<ComponentTypeId>,
}

/// Body of `ADD_ENTITY`: mirrors to create on the receiving side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntityBody {
    /// Entities that became visible this tick.
    pub entities: Vec<EntityInit>,
}

/// Body of `DEL_ENTITY`: mirrors to destroy on the receiving side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelEntityBody {
    /// Entities that went invisible (or were destroyed) this tick.
    pub entities: Vec<Entity>,
}

/// Body of `SET_COMPONENT`: replace one component value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetComponentBody {
    /// The component type being replaced.
    pub component_type: ComponentTypeId,
    /// The entity carrying the component.
    pub entity: Entity,
    /// MessagePack-encoded component value.
    pub data: Vec<u8>,
}

/// Body of `UNDO_COMPONENT`: authoritative revert after a forbidden edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoComponentBody {
    /// The component type being reverted.
    pub component_type: ComponentTypeId,
    /// The entity carrying the component.
    pub entity: Entity,
    /// MessagePack-encoded authoritative value.
    pub data: Vec<u8>,
}

/// Body of `PARTIAL_SYNC`: a component-specific message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSyncBody {
    /// The component type the message belongs to.
    pub component_type: ComponentTypeId,
    /// The registered message type within that component.
    pub message_type: MessageTypeId,
    /// The entity carrying the component.
    pub entity: Entity,
    /// MessagePack-encoded message payload.
    pub data: Vec<u8>,
}
