//! Preparing blocks for storage.
//!
//! This is the write-side mirror of [CoreBlockGetter](crate::factories::CoreBlockGetter):
//! a block readied here and put to a [BlockServer] can be fetched back
//! through the getter.

use blockret_api::*;

/// A block encoded, encrypted and addressed, ready to be put to a
/// [BlockServer].
#[derive(Debug, Clone)]
pub struct ReadyBlock {
    /// The content address of `buf`.
    pub id: BlockId,

    /// The encoded [EncryptedBlock] envelope.
    pub buf: bytes::Bytes,

    /// The server half of the key the block was encrypted with.
    pub server_half: BlockCryptKeyServerHalf,
}

/// Encode, encrypt and address `block` under `tlf_key`.
pub fn ready_block<B: Block>(
    crypto: &dyn Crypto,
    tlf_key: &TlfCryptKey,
    block: &B,
) -> BrResult<ReadyBlock> {
    let plaintext = codec::encode(block)?;
    let server_half = crypto.make_random_block_crypt_key_server_half()?;
    let block_key = crypto.unmask_block_crypt_key(&server_half, tlf_key)?;
    let encrypted = crypto.encrypt_block(&plaintext, &block_key)?;
    let buf = codec::encode(&encrypted)?;
    let id = crypto.make_block_id(&buf);
    Ok(ReadyBlock {
        id,
        buf,
        server_half,
    })
}

/// Ready `block` with the current key of `kmd` and put it to
/// `block_server`, returning a pointer through which it can be fetched.
pub async fn put_block<B: Block>(
    ctx: RequestContext,
    crypto: &dyn Crypto,
    key_manager: &dyn KeyManager,
    block_server: &dyn BlockServer,
    kmd: KeyMetadata,
    creator: WriterId,
    block: &B,
) -> BrResult<BlockPointer> {
    let tlf_key = key_manager
        .get_tlf_crypt_key_for_encryption(ctx.clone(), kmd.clone())
        .await?;
    let ReadyBlock {
        id,
        buf,
        server_half,
    } = ready_block(crypto, &tlf_key, block)?;

    let ptr = BlockPointer {
        id,
        key_gen: kmd.latest_key_gen,
        data_ver: 1,
        context: BlockContext {
            creator,
            ref_nonce: 0,
        },
    };
    block_server
        .put(
            ctx,
            kmd.tlf_id,
            ptr.id.clone(),
            ptr.context.clone(),
            buf,
            server_half,
        )
        .await?;
    tracing::debug!(%ptr, "put block");
    Ok(ptr)
}
