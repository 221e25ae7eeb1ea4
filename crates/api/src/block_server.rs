//! Block server types.

use crate::*;
use std::sync::Arc;

/// A remote service storing encrypted blocks by content address.
///
/// Block servers never see plaintext or complete block keys, only the
/// encoded encrypted bytes and the server half of each block's key.
pub trait BlockServer: 'static + Send + Sync + std::fmt::Debug {
    /// Fetch the encoded bytes and server key half of a block.
    ///
    /// Implementations return [BrError::BadRequest] when they consider the
    /// request itself invalid, [BrError::NoSuchBlock] when nothing is
    /// stored under `id`, and any other error for transient failures.
    fn get(
        &self,
        ctx: RequestContext,
        tlf_id: TlfId,
        id: BlockId,
        context: BlockContext,
    ) -> BoxFut<'_, BrResult<(bytes::Bytes, BlockCryptKeyServerHalf)>>;

    /// Store the encoded bytes and server key half of a block.
    fn put(
        &self,
        ctx: RequestContext,
        tlf_id: TlfId,
        id: BlockId,
        context: BlockContext,
        buf: bytes::Bytes,
        server_half: BlockCryptKeyServerHalf,
    ) -> BoxFut<'_, BrResult<()>>;
}

/// Trait-object [BlockServer].
pub type DynBlockServer = Arc<dyn BlockServer>;

/// A factory for creating [BlockServer] instances.
pub trait BlockServerFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut Config) -> BrResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &Config) -> BrResult<()>;

    /// Construct a block server instance.
    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynBlockServer>>;
}

/// Trait-object [BlockServerFactory].
pub type DynBlockServerFactory = Arc<dyn BlockServerFactory>;
