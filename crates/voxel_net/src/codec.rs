//! MessagePack codec helpers.
//!
//! Thin wrappers around `rmp-serde` for message bodies. All payloads use
//! **named** (map-style) MessagePack encoding, where struct fields are
//! serialised as string keys rather than positional arrays, keeping the
//! wire format self-describing.

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Encodes a value to named (map-style) MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(value).map_err(NetError::Encode)
}

/// Decodes a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}
