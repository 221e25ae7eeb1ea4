//! An in-memory [KeyManager] that derives TLF crypt keys from per-instance
//! root secrets.

use blockret_api::*;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Salt for TLF crypt key derivation (domain separation).
const HKDF_SALT: &[u8] = b"blockret-tlf-crypt-key-v1";

/// A factory for creating an in-memory [KeyManager].
#[derive(Debug)]
pub struct MemKeyManagerFactory {}

impl MemKeyManagerFactory {
    /// Construct a new MemKeyManagerFactory.
    pub fn create() -> DynKeyManagerFactory {
        let out: DynKeyManagerFactory = Arc::new(Self {});
        out
    }
}

impl KeyManagerFactory for MemKeyManagerFactory {
    fn default_config(&self, _config: &mut Config) -> BrResult<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &Config) -> BrResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynKeyManager>> {
        Box::pin(async move {
            let out: DynKeyManager = Arc::new(MemKeyManager::default());
            Ok(out)
        })
    }
}

/// Holds one random root secret per filesystem instance, created on first
/// use, and derives the [TlfCryptKey] of each key generation from it with
/// HKDF-SHA256.
#[derive(Default)]
pub struct MemKeyManager {
    roots: Mutex<HashMap<TlfId, TlfCryptKey>>,
}

impl std::fmt::Debug for MemKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemKeyManager").finish()
    }
}

impl MemKeyManager {
    fn derive(&self, tlf_id: &TlfId, key_gen: KeyGen) -> BrResult<TlfCryptKey> {
        let root = {
            let mut lock = self
                .roots
                .lock()
                .expect("MemKeyManager inner Mutex is poisoned");
            match lock.get(tlf_id) {
                Some(root) => root.clone(),
                None => {
                    let mut bytes = [0; KEY_LEN];
                    rand::thread_rng().try_fill_bytes(&mut bytes).map_err(
                        |e| BrError::other_src("generate root secret", e),
                    )?;
                    let root = TlfCryptKey::new(bytes);
                    lock.insert(tlf_id.clone(), root.clone());
                    root
                }
            }
        };

        let mut info = tlf_id.to_vec();
        info.extend_from_slice(&key_gen.to_le_bytes());

        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), root.as_bytes());
        let mut okm = [0; KEY_LEN];
        hk.expand(&info, &mut okm)
            .map_err(|e| BrError::other(format!("derive tlf key: {e}")))?;
        Ok(TlfCryptKey::new(okm))
    }
}

impl KeyManager for MemKeyManager {
    fn get_tlf_crypt_key_for_block_decryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>> {
        Box::pin(async move {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            if ptr.key_gen == 0 || ptr.key_gen > kmd.latest_key_gen {
                return Err(BrError::other(format!(
                    "invalid key generation {} for {} (latest {})",
                    ptr.key_gen, kmd.tlf_id, kmd.latest_key_gen,
                )));
            }
            self.derive(&kmd.tlf_id, ptr.key_gen)
        })
    }

    fn get_tlf_crypt_key_for_encryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>> {
        Box::pin(async move {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            if kmd.latest_key_gen == 0 {
                return Err(BrError::other(format!(
                    "{} has no key generations",
                    kmd.tlf_id
                )));
            }
            self.derive(&kmd.tlf_id, kmd.latest_key_gen)
        })
    }
}
