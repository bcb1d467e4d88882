//! Client/server layer error types.

use voxel_ecs::{ComponentTypeId, EcsError};
use voxel_net::NetError;
use voxel_schedule::ScheduleError;

use crate::partial::MessageTypeId;

/// Errors surfaced by instances and the synchronization systems.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport failure.
    #[error(transparent)]
    Net(#[from] NetError),

    /// Component codec failure.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A system failed during the tick.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// A peer violated the protocol; its session is torn down.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A partial message arrived for a pair nobody registered.
    #[error("no handler for partial message {message_type:?} on component {component:?}")]
    UnknownPartialMessage {
        /// The component type named by the envelope.
        component: ComponentTypeId,
        /// The message type named by the envelope.
        message_type: MessageTypeId,
    },

    /// A send targeted a remote with no connection.
    #[error("no connection to remote {0}")]
    UnknownRemote(crate::instance::InstanceId),
}
