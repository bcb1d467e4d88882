//! Partial synchronization.
//!
//! Some components reject whole-value replication; instead the versions of
//! the component on different instances exchange component-specific
//! messages. A process-wide table maps `(component type, message type)` to a
//! type-erased handler that decodes the payload and invokes the component's
//! typed receive hook. Handlers are registered eagerly when the component
//! type is registered with an instance, so a receiver can never encounter an
//! unknown message type for a known component.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::sync::OnceLock;

use voxel_ecs::component::fnv1a_64;
use voxel_ecs::{Component, ComponentTypeId, Entity, Registry};

use crate::error::SyncError;
use crate::instance::InstanceId;

/// Stable identifier of a partial message type, hashed from its name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, PartialOrd, Ord,
)]
pub struct MessageTypeId(pub u64);

impl MessageTypeId {
    /// Computes the ID for a concrete message type.
    #[must_use]
    pub fn of<M: PartialMessage>() -> Self {
        Self(fnv1a_64(M::message_name()))
    }
}

/// A message exchanged between the instances of one component.
pub trait PartialMessage: Serialize + DeserializeOwned + Send + 'static {
    /// A process-independent name for this message type.
    fn message_name() -> &'static str;
}

/// Components that replicate through component-specific messages instead of
/// whole values.
pub trait PartiallySynchronizable: Component {
    /// Registers every `(component, message)` handler pair of this
    /// component. Invoked once, eagerly, when the component type is
    /// registered with an instance.
    fn register_messages();
}

type ErasedHandler =
    Arc<dyn Fn(&mut Registry, Entity, InstanceId, &[u8]) -> Result<(), SyncError> + Send + Sync>;

fn handler_table() -> &'static DashMap<(ComponentTypeId, MessageTypeId), ErasedHandler> {
    static TABLE: OnceLock<DashMap<(ComponentTypeId, MessageTypeId), ErasedHandler>> =
        OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// Registers the receive hook for message `M` on component `C`.
///
/// Registration is idempotent; the latest handler wins.
pub fn register_partial_message<C, M>(
    handler: impl Fn(&mut C, Entity, InstanceId, M) + Send + Sync + 'static,
) where
    C: PartiallySynchronizable,
    M: PartialMessage,
{
    let key = (ComponentTypeId::of::<C>(), MessageTypeId::of::<M>());
    let erased: ErasedHandler = Arc::new(move |registry, entity, remote, data| {
        let message: M = rmp_serde::from_slice(data)
            .map_err(|e| SyncError::Protocol(format!("bad partial payload: {e}")))?;
        let Some(component) = registry.get_mut::<C>(entity) else {
            // The mirror may not carry the component yet; drop quietly.
            return Ok(());
        };
        handler(component, entity, remote, message);
        Ok(())
    });
    handler_table().insert(key, erased);
}

/// Dispatches an inbound partial message through the process-wide table.
pub fn dispatch_partial_message(
    registry: &mut Registry,
    component: ComponentTypeId,
    message_type: MessageTypeId,
    entity: Entity,
    remote: InstanceId,
    data: &[u8],
) -> Result<(), SyncError> {
    let handler = handler_table()
        .get(&(component, message_type))
        .map(|entry| entry.value().clone())
        .ok_or(SyncError::UnknownPartialMessage {
            component,
            message_type,
        })?;
    handler(registry, entity, remote, data)
}
