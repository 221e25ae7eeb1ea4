//! The structured serialization codec used for block envelopes and
//! block plaintext.

use crate::*;

/// Encode a value.
pub fn encode<T: serde::Serialize>(value: &T) -> BrResult<bytes::Bytes> {
    serde_json::to_vec(value)
        .map(bytes::Bytes::from)
        .map_err(|e| BrError::other_src("codec encode", e))
}

/// Decode a value.
pub fn decode<T: serde::de::DeserializeOwned>(buf: &[u8]) -> BrResult<T> {
    serde_json::from_slice(buf)
        .map_err(|e| BrError::other_src("codec decode", e))
}
