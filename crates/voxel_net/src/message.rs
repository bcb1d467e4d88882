//! The message envelope and the engine-reserved kind range.
//!
//! A message is a `(kind, body)` pair; on the wire it is the body bytes
//! prefixed with the little-endian `u16` kind. Kinds below
//! [`kind::USER_START`] are engine-reserved and stable across versions;
//! everything above is user space.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::NetError;

/// Engine-reserved message kinds.
pub mod kind {
    /// No-op carrier; used for the identity exchange before handlers exist.
    pub const IGNORE: u16 = 0;
    /// Server tells a client to create local entity mirrors.
    pub const ADD_ENTITY: u16 = 1;
    /// Server tells a client to destroy local entity mirrors.
    pub const DEL_ENTITY: u16 = 2;
    /// Replace a component value on the receiving side.
    pub const SET_COMPONENT: u16 = 3;
    /// Authoritative revert of a rejected component edit.
    pub const UNDO_COMPONENT: u16 = 4;
    /// Component-specific message for partially synchronized components.
    pub const PARTIAL_SYNC: u16 = 5;
    /// Ordered batch of inner messages, processed atomically.
    pub const COMPOUND: u16 = 6;
    /// First kind available to user messages.
    pub const USER_START: u16 = 7;
}

/// A typed message: a kind discriminator plus a MessagePack body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind; see [`kind`].
    pub kind: u16,
    /// MessagePack-encoded body.
    pub body: Vec<u8>,
}

impl Message {
    /// Builds a message by encoding `body`.
    pub fn new<T: Serialize>(kind: u16, body: &T) -> Result<Self, NetError> {
        Ok(Self {
            kind,
            body: codec::encode(body)?,
        })
    }

    /// Decodes the body.
    pub fn decode_body<'a, T: Deserialize<'a>>(&'a self) -> Result<T, NetError> {
        codec::decode(&self.body)
    }

    /// Returns `true` for engine-reserved kinds.
    #[must_use]
    pub fn is_engine_kind(&self) -> bool {
        self.kind < kind::USER_START
    }

    /// Serializes the message for framing: `[kind:u16 LE][body]`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.body.len());
        bytes.extend_from_slice(&self.kind.to_le_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parses a framed message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetError> {
        if bytes.len() < 2 {
            return Err(NetError::MalformedFrame);
        }
        Ok(Self {
            kind: u16::from_le_bytes([bytes[0], bytes[1]]),
            body: bytes[2..].to_vec(),
        })
    }
}

/// Body of a [`kind::COMPOUND`] message: inner messages processed in order
/// as one atomic batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompoundBody {
    /// The inner messages.
    pub messages: Vec<Message>,
}
