//! Block retrieval is the module that turns block requests into fetches.
//!
//! It consists of two parts:
//! - A queue that maps each [BlockPointer] to at most one in-flight
//!   retrieval
//! - Worker tasks that fetch queued retrievals and deliver the outcome
//!
//! ### Queue
//!
//! - Exposes [BlockRetrievalQueue::submit], which takes a request context,
//!   key metadata and a block pointer.
//! - If a retrieval for the pointer exists, the request is appended to its
//!   subscribers. Otherwise a retrieval is created with the request as its
//!   only subscriber, and the pointer is sent down a channel that acts as
//!   the work queue.
//! - Retrievals stay in the registry until a worker finalizes them, so
//!   requests keep joining while the fetch is in flight.
//!
//! ### Worker tasks
//!
//! A configurable number of tasks run in parallel. Each one:
//!
//! - Awaits the next pointer from the work queue and claims its retrieval.
//! - Checks that at least one subscribed request is neither canceled nor
//!   expired. If there is none, the retrieval resolves with
//!   [BrError::Canceled] and no fetch is made.
//! - Fetches and decodes the block with the [BlockGetter] under a context
//!   of its own. That context is only canceled once every subscribed
//!   request, including ones joining mid-fetch, is canceled or expired.
//!   One caller giving up never aborts the fetch for the others.
//! - Escalates fatal errors to the [FatalErrorHandler].
//! - Finalizes the retrieval, which removes it from the registry and hands
//!   back its subscribers at that instant, then sends every subscriber its
//!   own copy of the outcome.
//!
//! Requests submitted after finalize create a new retrieval and a new fetch.
//!
//! Shutdown stops workers from claiming more work. Retrievals already
//! claimed run to completion, unclaimed ones fail.

use blockret_api::*;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

mod queue;
mod worker;

pub use queue::*;

/// CoreBlockRetrieval configuration types.
pub mod config {
    /// Configuration parameters for [CoreBlockRetrieval](super::CoreBlockRetrieval).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct CoreBlockRetrievalConfig {
        /// How many blocks can be fetched in parallel. Default: 10.
        pub worker_count: u8,
    }

    impl Default for CoreBlockRetrievalConfig {
        fn default() -> Self {
            Self { worker_count: 10 }
        }
    }

    /// Module-level configuration for CoreBlockRetrieval.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CoreBlockRetrievalModConfig {
        /// CoreBlockRetrieval configuration.
        #[serde(default)]
        pub core_block_retrieval: CoreBlockRetrievalConfig,
    }
}

pub use config::*;

/// The production [BlockRetrieval] module.
#[derive(Debug)]
pub struct CoreBlockRetrieval<B: Block> {
    queue: Arc<BlockRetrievalQueue<B>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: Block> CoreBlockRetrieval<B> {
    /// Add the default module config to `config`.
    pub fn default_config(config: &Config) -> BrResult<()> {
        config.set_module_config(&CoreBlockRetrievalModConfig::default())
    }

    /// Validate the module config in `config`.
    pub fn validate_config(config: &Config) -> BrResult<()> {
        let config: CoreBlockRetrievalModConfig = config.get_module_config()?;
        if config.core_block_retrieval.worker_count == 0 {
            return Err(BrError::other("workerCount must be > 0"));
        }
        Ok(())
    }

    /// Construct a block retrieval module configured by `builder`, which
    /// fetches blocks with `getter`.
    pub fn create(
        builder: Arc<Builder>,
        getter: DynBlockGetter<B>,
    ) -> BrResult<DynBlockRetrieval<B>> {
        Self::validate_config(&builder.config)?;
        let config: CoreBlockRetrievalModConfig =
            builder.config.get_module_config()?;
        let out: DynBlockRetrieval<B> = Arc::new(Self::new(
            config.core_block_retrieval,
            getter,
            builder.fatal_error_handler.clone(),
        ));
        Ok(out)
    }

    /// Construct a block retrieval module configured by `builder`, which
    /// fetches blocks with a [CoreBlockGetter](super::CoreBlockGetter)
    /// whose collaborators are created by the builder's factories.
    pub fn create_with_core_getter(
        builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynBlockRetrieval<B>>> {
        Box::pin(async move {
            let getter: DynBlockGetter<B> =
                super::CoreBlockGetter::create(builder.clone()).await?;
            Self::create(builder, getter)
        })
    }

    /// Spawn the worker tasks. Must be called within a tokio runtime.
    pub fn new(
        config: CoreBlockRetrievalConfig,
        getter: DynBlockGetter<B>,
        fatal_error_handler: DynFatalErrorHandler,
    ) -> Self {
        let queue = Arc::new(BlockRetrievalQueue::new());

        let mut workers = Vec::with_capacity(config.worker_count as usize);
        for worker_id in 0..config.worker_count as usize {
            workers.push(tokio::task::spawn(worker::worker_task(
                worker_id,
                queue.clone(),
                getter.clone(),
                fatal_error_handler.clone(),
            )));
        }

        Self {
            queue,
            workers: Mutex::new(workers),
        }
    }

    /// The queue backing this module.
    pub fn queue(&self) -> &Arc<BlockRetrievalQueue<B>> {
        &self.queue
    }
}

impl<B: Block> BlockRetrieval<B> for CoreBlockRetrieval<B> {
    fn request(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> PendingBlock<B> {
        self.queue.submit(ctx, kmd, ptr)
    }

    fn shutdown(&self) -> BoxFut<'_, ()> {
        Box::pin(async move {
            self.queue.shutdown();
            let workers = std::mem::take(
                &mut *self
                    .workers
                    .lock()
                    .expect("CoreBlockRetrieval workers Mutex is poisoned"),
            );
            for res in futures::future::join_all(workers).await {
                if let Err(err) = res {
                    tracing::warn!(?err, "block retrieval worker failed");
                }
            }
        })
    }
}

impl<B: Block> Drop for CoreBlockRetrieval<B> {
    fn drop(&mut self) {
        // Workers exit on their own once their current retrieval is done.
        self.queue.shutdown();
    }
}
