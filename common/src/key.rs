//! Wasm storage-key codec.
//!
//! Contract state keys are byte-strings composed of segments where every
//! segment except the last carries a 2-byte big-endian length prefix (the
//! CosmWasm `Map` layout). Map reads compose a prefix out of fully
//! length-prefixed segments and decode whatever trails it.

use thiserror::Error;

const SEGMENT_PREFIX_LEN: usize = 2;
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key segment of {0} bytes exceeds the 2-byte length prefix")]
    SegmentTooLong(usize),

    #[error("composed key requires at least one segment")]
    Empty,

    #[error("map key is not valid UTF-8")]
    InvalidUtf8,

    #[error("numeric map key must be 8 bytes, got {0}")]
    InvalidNumberWidth(usize),
}

/// How the trailing segment of a map entry is decoded into an output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKeyType {
    /// UTF-8 string
    String,
    /// 8-byte big-endian u64
    Number,
    /// Raw bytes, rendered as lowercase hex
    Raw,
}

/// Compose a full storage key: every segment but the last is
/// length-prefixed, the last is appended raw.
pub fn compose_key(segments: &[&[u8]]) -> Result<Vec<u8>, KeyError> {
    let (last, prefixed) = segments.split_last().ok_or(KeyError::Empty)?;
    let mut key = compose_key_prefix(prefixed)?;
    key.extend_from_slice(last);
    Ok(key)
}

/// Compose a key prefix: every segment is length-prefixed, so further
/// segments (or a raw tail) can follow. An empty slice is a valid
/// zero-length prefix matching everything under the subject.
pub fn compose_key_prefix(segments: &[&[u8]]) -> Result<Vec<u8>, KeyError> {
    let mut key = Vec::with_capacity(
        segments
            .iter()
            .map(|s| s.len() + SEGMENT_PREFIX_LEN)
            .sum(),
    );
    for segment in segments {
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(KeyError::SegmentTooLong(segment.len()));
        }
        key.extend_from_slice(&(segment.len() as u16).to_be_bytes());
        key.extend_from_slice(segment);
    }
    Ok(key)
}

/// The part of `key` that follows `prefix`, if `key` starts with it.
pub fn trailing_segment<'a>(key: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    key.strip_prefix(prefix)
}

/// Decode a trailing map segment into its output-key rendering.
pub fn decode_map_key(bytes: &[u8], key_type: MapKeyType) -> Result<String, KeyError> {
    match key_type {
        MapKeyType::String => String::from_utf8(bytes.to_vec()).map_err(|_| KeyError::InvalidUtf8),
        MapKeyType::Number => {
            let raw: [u8; 8] = bytes
                .try_into()
                .map_err(|_| KeyError::InvalidNumberWidth(bytes.len()))?;
            Ok(u64::from_be_bytes(raw).to_string())
        }
        MapKeyType::Raw => Ok(hex::encode(bytes)),
    }
}
