//! Block cryptography types.

use crate::*;
use std::sync::Arc;

/// The envelope an encoded block is stored in.
///
/// The block server stores the codec encoding of this struct, and the
/// [BlockId] of a block is the digest of that encoding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlock {
    /// Envelope format version.
    pub version: u8,

    /// The nonce the plaintext was sealed with.
    #[serde(with = "crate::serde_bytes_base64")]
    pub nonce: bytes::Bytes,

    /// The sealed plaintext, including the authentication tag.
    #[serde(with = "crate::serde_bytes_base64")]
    pub encrypted_data: bytes::Bytes,
}

/// The cryptographic operations needed to read and write blocks.
pub trait Crypto: 'static + Send + Sync + std::fmt::Debug {
    /// Compute the content address of encoded block bytes.
    fn make_block_id(&self, buf: &[u8]) -> BlockId;

    /// Check that `buf` hashes to `id`. Returns
    /// [BrError::BlockIdMismatch] otherwise.
    fn verify_block_id(&self, buf: &[u8], id: &BlockId) -> BrResult<()>;

    /// Generate a fresh random server half for a new block.
    fn make_random_block_crypt_key_server_half(
        &self,
    ) -> BrResult<BlockCryptKeyServerHalf>;

    /// Combine a server half with a [TlfCryptKey] into the key a block
    /// is encrypted with.
    fn unmask_block_crypt_key(
        &self,
        server_half: &BlockCryptKeyServerHalf,
        tlf_key: &TlfCryptKey,
    ) -> BrResult<BlockCryptKey>;

    /// Seal plaintext block bytes.
    fn encrypt_block(
        &self,
        plaintext: &[u8],
        key: &BlockCryptKey,
    ) -> BrResult<EncryptedBlock>;

    /// Open a sealed block, returning the plaintext bytes.
    fn decrypt_block(
        &self,
        block: &EncryptedBlock,
        key: &BlockCryptKey,
    ) -> BrResult<bytes::Bytes>;
}

/// Trait-object [Crypto].
pub type DynCrypto = Arc<dyn Crypto>;
