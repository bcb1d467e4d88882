//! Storage-layer error types.
//!
//! Storage operations with programmer-error failure modes (double destroy,
//! emplace on a present entity) report through booleans, matching the
//! contracts of the containers. Errors are reserved for the codec seam used
//! by replication.

/// Errors that can occur when moving component values across the
/// type-erased serialization seam.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// Failed to encode a component value to MessagePack.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a component value from MessagePack.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
