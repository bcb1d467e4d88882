//! # voxel_net
//!
//! Session transport for the voxel engine core.
//!
//! This crate provides:
//!
//! - [`varint`] — the byte-reversed variable-length frame header.
//! - [`compress`](compress()) / [`decompress`](decompress()) — zlib frame
//!   payloads at the fastest level, with bounded inflation.
//! - [`codec`] — MessagePack body encoding.
//! - [`Message`] — the `[kind:u16][body]` envelope and the engine-reserved
//!   kind catalogue.
//! - [`Session`] — framed stream sessions with a writer-task strand, an
//!   ordered event queue and the `created → started → ended` lifecycle.
//! - [`SocketServer`] / [`SocketClient`] — endpoints owning a background
//!   runtime behind a synchronous surface.

pub mod codec;
pub mod compress;
pub mod error;
pub mod message;
pub mod session;
pub mod socket;
pub mod varint;

pub use compress::{compress, decompress};
pub use error::{NetError, SessionErrorKind};
pub use message::{kind, CompoundBody, Message};
pub use session::{EventQueue, Session, SessionConfig, SessionEvent, SessionId, SessionState};
pub use socket::{SocketClient, SocketServer};
