//! Block retrieval types.

use crate::*;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// The single-fire completion signal of one subscribed request.
pub type BlockResponder<B> = oneshot::Sender<BrResult<B>>;

/// The caller's side of one subscribed request.
///
/// Resolves exactly once with either the decoded block or the error the
/// retrieval resolved with.
#[derive(Debug)]
pub struct PendingBlock<B: Block>(oneshot::Receiver<BrResult<B>>);

impl<B: Block> PendingBlock<B> {
    /// Create a connected responder / pending block pair.
    pub fn channel() -> (BlockResponder<B>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// A pending block that resolves immediately with `err`.
    pub fn failed(err: BrError) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(Err(err));
        pending
    }
}

impl<B: Block> std::future::Future for PendingBlock<B> {
    type Output = BrResult<B>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|r| match r {
            Ok(r) => r,
            Err(_) => Err(BrError::other(
                "block retrieval dropped request before responding",
            )),
        })
    }
}

/// Deduplicating block retrieval.
///
/// Any number of concurrent requests for the same [BlockPointer] are
/// coalesced into a single fetch, and every request receives the outcome
/// of that fetch.
pub trait BlockRetrieval<B: Block>: 'static + Send + Sync + std::fmt::Debug {
    /// Request the block at `ptr`.
    ///
    /// The returned future resolves once the retrieval the request was
    /// joined to resolves. Canceling `ctx` does not remove the request and
    /// does not abort the fetch while other requests for `ptr` are live.
    /// The fetch is only abandoned once every request for `ptr` is done.
    fn request(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> PendingBlock<B>;

    /// Request the block at `ptr` and write it into `block`.
    fn request_into<'a>(
        &'a self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
        block: &'a mut B,
    ) -> BoxFut<'a, BrResult<()>> {
        let pending = self.request(ctx, kmd, ptr);
        Box::pin(async move {
            *block = pending.await?;
            Ok(())
        })
    }

    /// Stop claiming new work. Retrievals already claimed by a worker run
    /// to completion before this resolves. Requests made after shutdown
    /// fail.
    fn shutdown(&self) -> BoxFut<'_, ()>;
}

/// Trait-object [BlockRetrieval].
pub type DynBlockRetrieval<B> = Arc<dyn BlockRetrieval<B>>;

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn pending_block_resolves_with_sent_value() {
        let (tx, rx) = PendingBlock::<FileBlock>::channel();
        tx.send(Ok(FileBlock::new(bytes::Bytes::from_static(b"a"))))
            .unwrap();
        assert_eq!(b"a".as_slice(), &rx.await.unwrap().contents[..]);
    }

    #[tokio::test]
    async fn dropped_responder_is_an_error() {
        let (tx, rx) = PendingBlock::<FileBlock>::channel();
        drop(tx);
        assert!(matches!(rx.await, Err(BrError::Other { .. })));
    }

    #[tokio::test]
    async fn failed_resolves_with_error() {
        let rx = PendingBlock::<FileBlock>::failed(BrError::Canceled);
        assert!(matches!(rx.await, Err(BrError::Canceled)));
    }
}
