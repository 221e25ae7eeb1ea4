//! Key manager types.

use crate::*;
use std::sync::Arc;

/// Looks up the filesystem-wide keys blocks were encrypted with.
///
/// Lookups may require a round trip to a key service, so they are async
/// and run under the caller's context.
pub trait KeyManager: 'static + Send + Sync + std::fmt::Debug {
    /// Get the [TlfCryptKey] needed to decrypt the block at `ptr`.
    fn get_tlf_crypt_key_for_block_decryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>>;

    /// Get the [TlfCryptKey] new blocks should be encrypted with.
    fn get_tlf_crypt_key_for_encryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>>;
}

/// Trait-object [KeyManager].
pub type DynKeyManager = Arc<dyn KeyManager>;

/// A factory for creating [KeyManager] instances.
pub trait KeyManagerFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut Config) -> BrResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &Config) -> BrResult<()>;

    /// Construct a key manager instance.
    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynKeyManager>>;
}

/// Trait-object [KeyManagerFactory].
pub type DynKeyManagerFactory = Arc<dyn KeyManagerFactory>;
