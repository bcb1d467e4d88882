//! # voxel_clientserver
//!
//! Client/server instances and replication for the voxel engine core.
//!
//! This crate provides:
//!
//! - [`Instance`] — a client, server or unified endpoint owning a registry,
//!   a scheduler, an event dispatcher and connections.
//! - [`connect_local`] / [`Instance::host`] / [`Instance::connect_to`] —
//!   in-process pairing and framed TCP sessions with identity exchange.
//! - [`VisibilityState`] — the per-(entity, remote) visibility predicate
//!   and its two-bit transition tracking.
//! - [`SynchronizerState`] — whole-value component replication with
//!   per-type sync rates and change detection.
//! - [`ChangeValidator`] — ALLOWED / FORBIDDEN / IGNORED policy for inbound
//!   edits, with `UNDO_COMPONENT` reverts.
//! - [`RemoteInitRegistry`] — receiving-side initializers run on mirror
//!   creation.
//! - [`partial`] — component-specific message replication, demonstrated by
//!   the [`chunk`] module's voxel chunk store.

pub mod chunk;
pub mod connect;
pub mod connection;
pub mod error;
pub mod instance;
pub mod messages;
pub mod partial;
pub mod remote_init;
pub mod sync;
pub mod synchronizer;
pub mod validator;
pub mod visibility;

pub use chunk::{Chunk, ChunkStore, LoadChunk, SetVoxel, UnloadChunk, CHUNK_EDGE, CHUNK_VOLUME};
pub use connect::{connect_local, disconnect_local};
pub use connection::{Connection, LocalConnection, RemoteConnection};
pub use error::SyncError;
pub use instance::{
    Instance, InstanceConfig, InstanceId, InstanceRole, RemoteConnectedEvent,
    RemoteDisconnectedEvent, SessionErrorEvent,
};
pub use messages::{
    AddEntityBody, DelEntityBody, EntityInit, IdentityBody, PartialSyncBody, SetComponentBody,
    UndoComponentBody,
};
pub use partial::{
    dispatch_partial_message, register_partial_message, MessageTypeId, PartialMessage,
    PartiallySynchronizable,
};
pub use remote_init::RemoteInitRegistry;
pub use sync::SyncState;
pub use synchronizer::{SyncedComponents, SynchronizerState};
pub use validator::{ChangeResult, ChangeValidator};
pub use visibility::{VisibilityRule, VisibilityState};
