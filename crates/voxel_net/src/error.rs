//! Network-layer error types.

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message body to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message body from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Socket or compression I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A decoded frame exceeds the configured size limit.
    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageSize {
        /// Decoded (or declared) message size.
        size: u64,
        /// The configured limit.
        limit: u64,
    },

    /// A length header or message envelope could not be parsed.
    #[error("malformed frame")]
    MalformedFrame,
}

/// Compact error codes carried by session error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// A write was drained after the session ended.
    NotConnected,
    /// An inbound frame exceeded the message size limit.
    MessageSize,
    /// A frame or header failed to parse or decompress.
    MalformedFrame,
    /// The socket failed.
    Io,
}

impl SessionErrorKind {
    /// Classifies a [`NetError`] for event reporting.
    #[must_use]
    pub fn of(error: &NetError) -> Self {
        match error {
            NetError::MessageSize { .. } => Self::MessageSize,
            NetError::Decode(_) | NetError::MalformedFrame => Self::MalformedFrame,
            _ => Self::Io,
        }
    }
}
