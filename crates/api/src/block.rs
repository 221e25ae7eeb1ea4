//! Decoded block types.

use crate::BlockPointer;
use std::collections::BTreeMap;

/// The capability set required of any value a block can be decoded into.
///
/// The retrieval queue allocates a fresh `Default` value per fetch, the
/// fetch pipeline deserializes the plaintext into it and records the
/// encoded size, and the worker clones the result into every subscriber.
pub trait Block:
    'static
    + Default
    + Clone
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
    /// The size of the encoded (encrypted, serialized) block, or zero if
    /// it has not been fetched.
    fn encoded_size(&self) -> u32;

    /// Record the size of the encoded block this value was decoded from.
    fn set_encoded_size(&mut self, size: u32);
}

/// A block holding a chunk of file contents.
#[derive(
    Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct FileBlock {
    /// Plaintext file contents.
    #[serde(with = "crate::serde_bytes_base64")]
    pub contents: bytes::Bytes,

    #[serde(skip)]
    encoded_size: u32,
}

impl FileBlock {
    /// Construct a direct file block holding `contents`.
    pub fn new(contents: bytes::Bytes) -> Self {
        Self {
            contents,
            ..Default::default()
        }
    }
}

impl Block for FileBlock {
    fn encoded_size(&self) -> u32 {
        self.encoded_size
    }

    fn set_encoded_size(&mut self, size: u32) {
        self.encoded_size = size;
    }
}

/// A block holding directory entries.
#[derive(
    Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct DirBlock {
    /// Entry name to the pointer of the entry's first block.
    pub children: BTreeMap<String, BlockPointer>,

    #[serde(skip)]
    encoded_size: u32,
}

impl Block for DirBlock {
    fn encoded_size(&self) -> u32 {
        self.encoded_size
    }

    fn set_encoded_size(&mut self, size: u32) {
        self.encoded_size = size;
    }
}
