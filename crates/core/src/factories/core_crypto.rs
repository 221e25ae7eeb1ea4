//! The production [Crypto] implementation.
//!
//! - Block ids are the SHA-256 digest of the encoded block.
//! - A block crypt key is the XOR of the server half and the TLF crypt key,
//!   so neither the block server nor the key manager alone can decrypt.
//! - Blocks are sealed with AES-256-GCM under a random 12-byte nonce.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use blockret_api::*;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// The only [EncryptedBlock] version this implementation reads or writes.
pub const ENCRYPTED_BLOCK_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;

/// The production [Crypto] implementation.
#[derive(Debug, Default)]
pub struct CoreCrypto;

impl CoreCrypto {
    /// Construct a new CoreCrypto.
    pub fn create() -> DynCrypto {
        Arc::new(Self)
    }
}

impl Crypto for CoreCrypto {
    fn make_block_id(&self, buf: &[u8]) -> BlockId {
        BlockId::from(bytes::Bytes::from(Sha256::digest(buf).to_vec()))
    }

    fn verify_block_id(&self, buf: &[u8], id: &BlockId) -> BrResult<()> {
        let actual = self.make_block_id(buf);
        if &actual != id {
            return Err(BrError::BlockIdMismatch {
                expected: id.to_string().into(),
                actual: actual.to_string().into(),
            });
        }
        Ok(())
    }

    fn make_random_block_crypt_key_server_half(
        &self,
    ) -> BrResult<BlockCryptKeyServerHalf> {
        let mut bytes = [0; KEY_LEN];
        rand::thread_rng()
            .try_fill_bytes(&mut bytes)
            .map_err(|e| BrError::other_src("generate server half", e))?;
        Ok(BlockCryptKeyServerHalf::new(bytes))
    }

    fn unmask_block_crypt_key(
        &self,
        server_half: &BlockCryptKeyServerHalf,
        tlf_key: &TlfCryptKey,
    ) -> BrResult<BlockCryptKey> {
        let mut out = [0; KEY_LEN];
        for (o, (s, t)) in out
            .iter_mut()
            .zip(server_half.as_bytes().iter().zip(tlf_key.as_bytes()))
        {
            *o = s ^ t;
        }
        Ok(BlockCryptKey::new(out))
    }

    fn encrypt_block(
        &self,
        plaintext: &[u8],
        key: &BlockCryptKey,
    ) -> BrResult<EncryptedBlock> {
        let cipher =
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let mut nonce = [0; NONCE_LEN];
        rand::thread_rng()
            .try_fill_bytes(&mut nonce)
            .map_err(|e| BrError::other_src("generate nonce", e))?;
        let encrypted_data = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| BrError::other(format!("block encryption: {e}")))?;
        Ok(EncryptedBlock {
            version: ENCRYPTED_BLOCK_VERSION,
            nonce: bytes::Bytes::copy_from_slice(&nonce),
            encrypted_data: encrypted_data.into(),
        })
    }

    fn decrypt_block(
        &self,
        block: &EncryptedBlock,
        key: &BlockCryptKey,
    ) -> BrResult<bytes::Bytes> {
        if block.version != ENCRYPTED_BLOCK_VERSION {
            return Err(BrError::other(format!(
                "unsupported encrypted block version {}",
                block.version
            )));
        }
        if block.nonce.len() != NONCE_LEN {
            return Err(BrError::other(format!(
                "invalid nonce length {}",
                block.nonce.len()
            )));
        }
        let cipher =
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        cipher
            .decrypt(Nonce::from_slice(&block.nonce), &block.encrypted_data[..])
            .map(Into::into)
            .map_err(|e| BrError::other(format!("block decryption: {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(b: u8) -> BlockCryptKey {
        BlockCryptKey::new([b; KEY_LEN])
    }

    #[test]
    fn block_id_is_sha256() {
        let id = CoreCrypto.make_block_id(b"abc");
        assert_eq!("ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0", id.to_string());
    }

    #[test]
    fn verify_block_id_detects_mismatch() {
        let id = CoreCrypto.make_block_id(b"abc");
        CoreCrypto.verify_block_id(b"abc", &id).unwrap();
        assert!(matches!(
            CoreCrypto.verify_block_id(b"abd", &id),
            Err(BrError::BlockIdMismatch { .. })
        ));
    }

    #[test]
    fn unmask_inverts_mask() {
        let server_half =
            CoreCrypto.make_random_block_crypt_key_server_half().unwrap();
        let tlf_key = TlfCryptKey::new([0x5a; KEY_LEN]);
        let block_key = CoreCrypto
            .unmask_block_crypt_key(&server_half, &tlf_key)
            .unwrap();
        assert_ne!(block_key.as_bytes(), server_half.as_bytes());

        // xor-ing the block key with the tlf key yields the server half
        let again = CoreCrypto
            .unmask_block_crypt_key(
                &BlockCryptKeyServerHalf::new(*block_key.as_bytes()),
                &tlf_key,
            )
            .unwrap();
        assert_eq!(again.as_bytes(), server_half.as_bytes());
    }

    #[test]
    fn encrypt_then_decrypt() {
        let sealed = CoreCrypto.encrypt_block(b"plaintext", &key(1)).unwrap();
        assert_eq!(ENCRYPTED_BLOCK_VERSION, sealed.version);
        assert_ne!(b"plaintext".as_slice(), &sealed.encrypted_data[..]);

        let opened = CoreCrypto.decrypt_block(&sealed, &key(1)).unwrap();
        assert_eq!(b"plaintext".as_slice(), &opened[..]);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let sealed = CoreCrypto.encrypt_block(b"plaintext", &key(1)).unwrap();
        assert!(CoreCrypto.decrypt_block(&sealed, &key(2)).is_err());
    }

    #[test]
    fn decrypt_rejects_unknown_version() {
        let mut sealed =
            CoreCrypto.encrypt_block(b"plaintext", &key(1)).unwrap();
        sealed.version = 2;
        assert!(CoreCrypto.decrypt_block(&sealed, &key(1)).is_err());
    }
}
