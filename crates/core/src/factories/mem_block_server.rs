//! An in-memory [BlockServer] implementation.

use blockret_api::*;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// A factory for creating an in-memory [BlockServer].
#[derive(Debug)]
pub struct MemBlockServerFactory {}

impl MemBlockServerFactory {
    /// Construct a new MemBlockServerFactory.
    pub fn create() -> DynBlockServerFactory {
        let out: DynBlockServerFactory = Arc::new(Self {});
        out
    }
}

impl BlockServerFactory for MemBlockServerFactory {
    fn default_config(&self, _config: &mut Config) -> BrResult<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &Config) -> BrResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
    ) -> BoxFut<'static, BrResult<DynBlockServer>> {
        Box::pin(async move {
            let out: DynBlockServer = Arc::new(MemBlockServer::default());
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct StoredBlock {
    buf: bytes::Bytes,
    server_half: BlockCryptKeyServerHalf,
    refs: HashSet<BlockContext>,
}

/// Stores blocks in memory, keyed by filesystem instance and block id.
///
/// A block can only be fetched through a [BlockContext] it was put with.
/// Fetching a stored block through any other context is rejected as a
/// bad request, the same way a remote block server rejects references it
/// never recorded.
#[derive(Default)]
pub struct MemBlockServer {
    blocks: Mutex<HashMap<(TlfId, BlockId), StoredBlock>>,
    get_count: AtomicUsize,
}

impl std::fmt::Debug for MemBlockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemBlockServer").finish()
    }
}

impl MemBlockServer {
    /// The number of `get` calls this server has handled.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }
}

impl BlockServer for MemBlockServer {
    fn get(
        &self,
        ctx: RequestContext,
        tlf_id: TlfId,
        id: BlockId,
        context: BlockContext,
    ) -> BoxFut<'_, BrResult<(bytes::Bytes, BlockCryptKeyServerHalf)>> {
        Box::pin(async move {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            self.get_count.fetch_add(1, Ordering::SeqCst);

            let lock = self
                .blocks
                .lock()
                .expect("MemBlockServer inner Mutex is poisoned");
            let Some(stored) = lock.get(&(tlf_id, id.clone())) else {
                return Err(BrError::NoSuchBlock {
                    id: id.to_string().into(),
                });
            };
            if !stored.refs.contains(&context) {
                return Err(BrError::bad_request(format!(
                    "no reference to block {id} for creator {} nonce {}",
                    context.creator, context.ref_nonce,
                )));
            }
            Ok((stored.buf.clone(), stored.server_half.clone()))
        })
    }

    fn put(
        &self,
        ctx: RequestContext,
        tlf_id: TlfId,
        id: BlockId,
        context: BlockContext,
        buf: bytes::Bytes,
        server_half: BlockCryptKeyServerHalf,
    ) -> BoxFut<'_, BrResult<()>> {
        Box::pin(async move {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let mut lock = self
                .blocks
                .lock()
                .expect("MemBlockServer inner Mutex is poisoned");
            let stored =
                lock.entry((tlf_id, id.clone())).or_insert_with(|| {
                    StoredBlock {
                        buf: buf.clone(),
                        server_half: server_half.clone(),
                        refs: HashSet::new(),
                    }
                });
            if stored.buf != buf || stored.server_half != server_half {
                return Err(BrError::other(format!(
                    "block {id} already stored with different contents"
                )));
            }
            stored.refs.insert(context);
            Ok(())
        })
    }
}
