//! Test utilities associated with ids.

use blockret_api::*;
use bytes::Bytes;

use crate::random_bytes;

/// Create a random id.
pub fn random_id() -> id::Id {
    id::Id(Bytes::from(random_bytes(32)))
}

/// Create a random block id.
pub fn random_block_id() -> BlockId {
    BlockId(random_id())
}

/// Create a random filesystem instance id.
pub fn random_tlf_id() -> TlfId {
    TlfId(random_id())
}

/// Create a random block pointer with a fresh context.
pub fn random_block_pointer() -> BlockPointer {
    BlockPointer {
        id: random_block_id(),
        key_gen: 1,
        data_ver: 1,
        context: BlockContext {
            creator: WriterId(random_id()),
            ref_nonce: 0,
        },
    }
}

/// Create `count` distinct random block pointers.
pub fn create_block_pointer_list(count: u16) -> Vec<BlockPointer> {
    (0..count).map(|_| random_block_pointer()).collect()
}

/// Create key metadata for a random filesystem instance.
pub fn random_key_metadata() -> KeyMetadata {
    KeyMetadata::new(random_tlf_id(), 1)
}
