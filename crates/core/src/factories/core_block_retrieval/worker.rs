use super::queue::{BlockRetrievalQueue, ClaimedRetrieval};
use blockret_api::*;
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};

pub(super) async fn worker_task<B: Block>(
    worker_id: usize,
    queue: Arc<BlockRetrievalQueue<B>>,
    getter: DynBlockGetter<B>,
    fatal_error_handler: DynFatalErrorHandler,
) {
    tracing::debug!(worker_id, "block retrieval worker started");
    while let Some(claimed) = queue.claim_next().await {
        handle_retrieval(&queue, &getter, &fatal_error_handler, claimed).await;
    }
    tracing::debug!(worker_id, "block retrieval worker stopped");
}

pub(super) async fn handle_retrieval<B: Block>(
    queue: &BlockRetrievalQueue<B>,
    getter: &DynBlockGetter<B>,
    fatal_error_handler: &DynFatalErrorHandler,
    claimed: ClaimedRetrieval,
) {
    let ClaimedRetrieval { ptr, kmd } = claimed;

    let result = if queue.live_contexts(&ptr).is_empty() {
        tracing::debug!(%ptr, "every request was canceled, not fetching");
        Err(BrError::Canceled)
    } else {
        let mut block = B::default();
        let fetch_ctx = RequestContext::new();
        let res = {
            let fetch = AssertUnwindSafe(getter.get_block(
                fetch_ctx.clone(),
                kmd,
                ptr.clone(),
                &mut block,
            ))
            .catch_unwind();
            tokio::pin!(fetch);

            tokio::select! {
                biased;
                res = &mut fetch => res,
                _ = cancel_when_abandoned(queue, &ptr, &fetch_ctx) => {
                    fetch.await
                }
            }
        };
        match res {
            Ok(r) => r.map(|()| block),
            Err(_) => Err(BrError::other("block getter panicked")),
        }
    };

    if let Err(err) = &result {
        if err.is_fatal() {
            fatal_error_handler.fatal_error(&ptr, err);
        }
    }

    match queue.finalize(&ptr) {
        Some(completed) => completed.fan_out(result),
        None => tracing::warn!(%ptr, "claimed retrieval missing at finalize"),
    }
}

/// Cancel `fetch_ctx` once no request subscribed to `ptr` is live.
///
/// Requests joining during the fetch count as well, so the fetch is only
/// abandoned when nobody is left waiting for it.
async fn cancel_when_abandoned<B: Block>(
    queue: &BlockRetrievalQueue<B>,
    ptr: &BlockPointer,
    fetch_ctx: &RequestContext,
) {
    loop {
        let live = queue.live_contexts(ptr);
        if live.is_empty() {
            tracing::debug!(%ptr, "every request was canceled mid-fetch");
            fetch_ctx.cancel();
            return;
        }
        futures::future::select_all(live.iter().map(|ctx| Box::pin(ctx.done())))
            .await;
    }
}
