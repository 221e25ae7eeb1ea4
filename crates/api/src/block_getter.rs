//! Block getter types.

use crate::*;
use std::sync::Arc;

/// Fetches, verifies and decrypts one block.
///
/// This is the capability the retrieval workers drive. It performs a
/// single attempt and never retries. Every error is returned as is.
pub trait BlockGetter<B: Block>: 'static + Send + Sync + std::fmt::Debug {
    /// Fetch the block at `ptr` and decode it into `block`.
    ///
    /// On success `block` holds the decoded value and its encoded size
    /// has been recorded. On error the contents of `block` are
    /// unspecified.
    fn get_block<'a>(
        &'a self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
        block: &'a mut B,
    ) -> BoxFut<'a, BrResult<()>>;
}

/// Trait-object [BlockGetter].
pub type DynBlockGetter<B> = Arc<dyn BlockGetter<B>>;
