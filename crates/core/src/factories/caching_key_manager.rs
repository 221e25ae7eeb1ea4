//! A [KeyManager] wrapper that caches TLF crypt keys in memory for a
//! limited idle time.
//!
//! Each cached key records when it was last accessed, read from an injected
//! [Clock](crate::clock::Clock). Keys idle for longer than
//! `keyCacheTimeoutMs` are no longer served and are dropped by
//! [CachingKeyManager::sweep]. When built through the factory, a background
//! task calls `sweep` every `keyCacheSweepIntervalMs`.

use crate::clock::{DynClock, SystemClock};
use blockret_api::*;
use key_cache::KeyCache;
use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};
use tokio::task::AbortHandle;

mod key_cache;

/// CachingKeyManager configuration types.
mod config {
    /// Configuration parameters for [CachingKeyManagerFactory](super::CachingKeyManagerFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct CachingKeyManagerConfig {
        /// How long a cached key may go unused before it is dropped.
        /// Default: 15 min.
        pub key_cache_timeout_ms: u32,

        /// How often expired keys are swept from the cache.
        /// Default: 1 min.
        pub key_cache_sweep_interval_ms: u32,
    }

    impl Default for CachingKeyManagerConfig {
        fn default() -> Self {
            Self {
                key_cache_timeout_ms: 1000 * 60 * 15,
                key_cache_sweep_interval_ms: 1000 * 60,
            }
        }
    }

    /// Module-level configuration for CachingKeyManager.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CachingKeyManagerModConfig {
        /// CachingKeyManager configuration.
        #[serde(default)]
        pub caching_key_manager: CachingKeyManagerConfig,
    }
}

pub use config::*;

/// A factory wrapping the key managers of another factory in a
/// [CachingKeyManager].
#[derive(Debug)]
pub struct CachingKeyManagerFactory {
    inner: DynKeyManagerFactory,
}

impl CachingKeyManagerFactory {
    /// Construct a new CachingKeyManagerFactory around `inner`.
    pub fn create(inner: DynKeyManagerFactory) -> DynKeyManagerFactory {
        let out: DynKeyManagerFactory = Arc::new(Self { inner });
        out
    }
}

impl KeyManagerFactory for CachingKeyManagerFactory {
    fn default_config(&self, config: &mut Config) -> BrResult<()> {
        config.set_module_config(&CachingKeyManagerModConfig::default())?;
        self.inner.default_config(config)
    }

    fn validate_config(&self, config: &Config) -> BrResult<()> {
        let config: CachingKeyManagerModConfig = config.get_module_config()?;
        let config = config.caching_key_manager;
        if config.key_cache_timeout_ms == 0 {
            return Err(BrError::other("keyCacheTimeoutMs must be > 0"));
        }
        if config.key_cache_sweep_interval_ms == 0 {
            return Err(BrError::other("keyCacheSweepIntervalMs must be > 0"));
        }
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynKeyManager>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let config: CachingKeyManagerModConfig =
                builder.config.get_module_config()?;
            let config = config.caching_key_manager;
            let inner = inner.create(builder).await?;
            let out = Arc::new(CachingKeyManager::new(
                inner,
                Duration::from_millis(config.key_cache_timeout_ms as u64),
                SystemClock::create(),
            ));
            out.spawn_sweeper(Duration::from_millis(
                config.key_cache_sweep_interval_ms as u64,
            ));
            let out: DynKeyManager = out;
            Ok(out)
        })
    }
}

type CacheKey = (TlfId, KeyGen);

/// Caches the keys an inner [KeyManager] hands out.
#[derive(Debug)]
pub struct CachingKeyManager {
    inner: DynKeyManager,
    cache: Mutex<KeyCache<CacheKey, TlfCryptKey>>,
    sweeper: Mutex<Option<AbortHandle>>,
}

impl CachingKeyManager {
    /// Construct a CachingKeyManager. No sweeping happens until
    /// [CachingKeyManager::sweep] is called.
    pub fn new(inner: DynKeyManager, timeout: Duration, clock: DynClock) -> Self {
        Self {
            inner,
            cache: Mutex::new(KeyCache::new(timeout, clock)),
            sweeper: Mutex::new(None),
        }
    }

    /// Drop every cached key that has been idle longer than the timeout.
    /// Returns how many keys were dropped.
    pub fn sweep(&self) -> usize {
        let swept = self.lock_cache().sweep();
        if swept > 0 {
            tracing::debug!(swept, "swept idle tlf crypt keys");
        }
        swept
    }

    /// Drop every cached key, e.g. on logout.
    pub fn clear(&self) {
        tracing::debug!("clearing cached tlf crypt keys");
        self.lock_cache().clear();
    }

    /// The number of keys currently held, including expired ones not yet
    /// swept.
    pub fn cached_key_count(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, KeyCache<CacheKey, TlfCryptKey>> {
        self.cache
            .lock()
            .expect("CachingKeyManager cache Mutex is poisoned")
    }

    fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let this: Weak<Self> = Arc::downgrade(self);
        let task = tokio::task::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                ticker.tick().await;
                match this.upgrade() {
                    Some(this) => {
                        this.sweep();
                    }
                    None => break,
                }
            }
        });
        *self
            .sweeper
            .lock()
            .expect("CachingKeyManager sweeper Mutex is poisoned") =
            Some(task.abort_handle());
    }

    async fn cached_or_fetch<F>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> BrResult<TlfCryptKey>
    where
        F: std::future::Future<Output = BrResult<TlfCryptKey>>,
    {
        let found = self.lock_cache().get(&key);
        if let Some(found) = found {
            return Ok(found);
        }
        let fetched = fetch.await?;
        self.lock_cache().insert(key, fetched.clone());
        Ok(fetched)
    }
}

impl Drop for CachingKeyManager {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(task) = sweeper.take() {
                task.abort();
            }
        }
    }
}

impl KeyManager for CachingKeyManager {
    fn get_tlf_crypt_key_for_block_decryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>> {
        Box::pin(async move {
            let key = (kmd.tlf_id.clone(), ptr.key_gen);
            self.cached_or_fetch(
                key,
                self.inner
                    .get_tlf_crypt_key_for_block_decryption(ctx, kmd, ptr),
            )
            .await
        })
    }

    fn get_tlf_crypt_key_for_encryption(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
    ) -> BoxFut<'_, BrResult<TlfCryptKey>> {
        Box::pin(async move {
            let key = (kmd.tlf_id.clone(), kmd.latest_key_gen);
            self.cached_or_fetch(
                key,
                self.inner.get_tlf_crypt_key_for_encryption(ctx, kmd),
            )
            .await
        })
    }
}
