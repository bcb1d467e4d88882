//! Frame payload compression.
//!
//! Payloads travel as zlib streams compressed at the fastest level; the
//! sessions are latency-bound, not bandwidth-bound. Decompression is bounded
//! by the session's message size limit so a malicious peer cannot inflate a
//! tiny frame into unbounded memory.

use std::io::Read;

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::error::NetError;

/// Compresses a payload. Empty input encodes to empty output.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, NetError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut encoder = ZlibEncoder::new(data, Compression::fast());
    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Decompresses a payload, failing with [`NetError::MessageSize`] if the
/// decoded size exceeds `limit`.
pub fn decompress(data: &[u8], limit: u64) -> Result<Vec<u8>, NetError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut decoder = ZlibDecoder::new(data).take(limit + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(NetError::MessageSize {
            size: out.len() as u64,
            limit,
        });
    }
    Ok(out)
}
