//! The production [BlockGetter].
//!
//! Fetching one block is a pipeline where every step can fail:
//!
//! 1. Get the encoded bytes and the server key half from the [BlockServer].
//! 2. Check the bytes hash to the requested [BlockId].
//! 3. Get the [TlfCryptKey] for the block's key generation from the
//!    [KeyManager].
//! 4. Unmask the block crypt key from the server half and the TLF key.
//! 5. Decode the bytes into an [EncryptedBlock] envelope.
//! 6. Decrypt the envelope and decode the plaintext into the destination.
//! 7. Record the encoded size on the destination.
//!
//! Errors are returned as is and nothing is retried. The one exception is
//! a [BrError::BadRequest] from the block server: the pointer was built by
//! this system, so the server rejecting it is a bug elsewhere. It is
//! logged and returned as a fatal [BrError::ProtocolViolation].

use blockret_api::*;
use std::sync::Arc;

/// Fetches blocks through a [BlockServer], [KeyManager] and [Crypto].
#[derive(Debug)]
pub struct CoreBlockGetter {
    block_server: DynBlockServer,
    key_manager: DynKeyManager,
    crypto: DynCrypto,
}

impl CoreBlockGetter {
    /// Construct a CoreBlockGetter from its collaborators.
    pub fn new(
        block_server: DynBlockServer,
        key_manager: DynKeyManager,
        crypto: DynCrypto,
    ) -> Self {
        Self {
            block_server,
            key_manager,
            crypto,
        }
    }

    /// Construct a CoreBlockGetter with collaborators created by the
    /// builder's factories.
    pub fn create(
        builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<Arc<CoreBlockGetter>>> {
        Box::pin(async move {
            let block_server =
                builder.block_server.create(builder.clone()).await?;
            let key_manager =
                builder.key_manager.create(builder.clone()).await?;
            Ok(Arc::new(Self::new(
                block_server,
                key_manager,
                builder.crypto.clone(),
            )))
        })
    }

    async fn fetch<B: Block>(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
        block: &mut B,
    ) -> BrResult<()> {
        let (buf, server_half) = match self
            .block_server
            .get(
                ctx.clone(),
                kmd.tlf_id.clone(),
                ptr.id.clone(),
                ptr.context.clone(),
            )
            .await
        {
            Ok(r) => r,
            Err(err @ BrError::BadRequest { .. }) => {
                tracing::error!(
                    %ptr,
                    ?err,
                    "block server rejected a request for a pointer built by this system",
                );
                return Err(BrError::protocol_violation(&ptr, err));
            }
            Err(err) => return Err(err),
        };

        self.crypto.verify_block_id(&buf, &ptr.id)?;

        let tlf_key = self
            .key_manager
            .get_tlf_crypt_key_for_block_decryption(ctx, kmd, ptr)
            .await?;

        let block_key =
            self.crypto.unmask_block_crypt_key(&server_half, &tlf_key)?;

        let encrypted: EncryptedBlock = codec::decode(&buf)?;

        let plaintext = self.crypto.decrypt_block(&encrypted, &block_key)?;
        *block = codec::decode(&plaintext)?;

        let encoded_size = u32::try_from(buf.len()).map_err(|_| {
            BrError::other(format!("encoded block too large: {}", buf.len()))
        })?;
        block.set_encoded_size(encoded_size);

        Ok(())
    }
}

impl<B: Block> BlockGetter<B> for CoreBlockGetter {
    fn get_block<'a>(
        &'a self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
        block: &'a mut B,
    ) -> BoxFut<'a, BrResult<()>> {
        Box::pin(async move {
            let run_ctx = ctx.clone();
            run_ctx.run(self.fetch(ctx, kmd, ptr, block)).await
        })
    }
}
