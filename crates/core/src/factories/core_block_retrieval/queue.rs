//! The deduplicating registry of in-flight retrievals.

use blockret_api::*;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Mutex,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    /// Waiting for a worker to claim it.
    Queued,
    /// A worker is fetching it. New requests still join it.
    Claimed,
    /// Taken out of the registry with its final subscriber list, the
    /// outcome is being delivered.
    Completed,
    /// No retrieval exists. The next request creates a new one.
    Removed,
}

/// One request subscribed to a retrieval.
#[derive(Debug)]
pub struct Subscriber<B: Block> {
    ctx: RequestContext,
    responder: BlockResponder<B>,
}

#[derive(Debug)]
struct Retrieval<B: Block> {
    kmd: KeyMetadata,
    subscribers: Vec<Subscriber<B>>,
    state: RetrievalState,
}

/// A retrieval handed to a worker by [BlockRetrievalQueue::claim_next].
#[derive(Debug, Clone)]
pub struct ClaimedRetrieval {
    /// The block to fetch.
    pub ptr: BlockPointer,

    /// Key metadata supplied by the request that created the retrieval.
    pub kmd: KeyMetadata,
}

/// A retrieval removed from the registry by [BlockRetrievalQueue::finalize],
/// holding every request that must receive its outcome.
#[derive(Debug)]
pub struct CompletedRetrieval<B: Block> {
    ptr: BlockPointer,
    subscribers: Vec<Subscriber<B>>,
}

impl<B: Block> CompletedRetrieval<B> {
    /// The number of requests that will receive the outcome.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `result` to every subscribed request.
    ///
    /// Each request gets its own copy. Sending never waits on the receiving
    /// side, so one slow caller cannot hold up the others.
    pub fn fan_out(self, result: BrResult<B>) {
        let Self { ptr, subscribers } = self;
        tracing::debug!(
            %ptr,
            subscribers = subscribers.len(),
            ok = result.is_ok(),
            "delivering retrieval outcome",
        );
        for Subscriber { responder, .. } in subscribers {
            if responder.send(result.clone()).is_err() {
                tracing::debug!(%ptr, "requester dropped before delivery");
            }
        }
    }
}

#[derive(Debug)]
struct Registry<B: Block> {
    retrievals: HashMap<BlockPointer, Retrieval<B>>,
    is_shut_down: bool,
}

/// Maps each [BlockPointer] to at most one in-flight retrieval.
///
/// - [submit](Self::submit) joins a request to the retrieval for its
///   pointer, creating and queueing the retrieval if there is none.
/// - [claim_next](Self::claim_next) hands queued retrievals to workers in
///   submission order.
/// - [finalize](Self::finalize) removes a retrieval and returns the
///   requests subscribed to it at that instant.
///
/// All three take the registry lock, so a request is either part of the
/// subscriber list `finalize` returns, or it creates a new retrieval.
#[derive(Debug)]
pub struct BlockRetrievalQueue<B: Block> {
    registry: Mutex<Registry<B>>,
    work_tx: UnboundedSender<BlockPointer>,
    work_rx: tokio::sync::Mutex<UnboundedReceiver<BlockPointer>>,
    shutdown: CancellationToken,
}

impl<B: Block> Default for BlockRetrievalQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Block> BlockRetrievalQueue<B> {
    /// Construct an empty queue.
    pub fn new() -> Self {
        let (work_tx, work_rx) = unbounded_channel();
        Self {
            registry: Mutex::new(Registry {
                retrievals: HashMap::new(),
                is_shut_down: false,
            }),
            work_tx,
            work_rx: tokio::sync::Mutex::new(work_rx),
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<B>> {
        self.registry
            .lock()
            .expect("BlockRetrievalQueue registry Mutex is poisoned")
    }

    /// Subscribe a request for `ptr`.
    ///
    /// `kmd` is only used if this request creates the retrieval. Requests
    /// joining an existing retrieval are assumed to carry the same key
    /// metadata.
    pub fn submit(
        &self,
        ctx: RequestContext,
        kmd: KeyMetadata,
        ptr: BlockPointer,
    ) -> PendingBlock<B> {
        let (responder, pending) = PendingBlock::channel();
        let subscriber = Subscriber { ctx, responder };

        let mut lock = self.lock();
        if lock.is_shut_down {
            return PendingBlock::failed(BrError::other(
                "block retrieval queue is shut down",
            ));
        }

        match lock.retrievals.entry(ptr) {
            Entry::Occupied(mut o) => {
                tracing::trace!(ptr = %o.key(), "joining retrieval");
                o.get_mut().subscribers.push(subscriber);
            }
            Entry::Vacant(v) => {
                // Only fails if the receiver is gone, which it never is
                // while self is alive.
                if self.work_tx.send(v.key().clone()).is_err() {
                    return PendingBlock::failed(BrError::other(
                        "block retrieval work queue closed",
                    ));
                }
                tracing::trace!(ptr = %v.key(), "queueing retrieval");
                v.insert(Retrieval {
                    kmd,
                    subscribers: vec![subscriber],
                    state: RetrievalState::Queued,
                });
            }
        }

        pending
    }

    /// Wait for a queued retrieval and mark it claimed.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn claim_next(&self) -> Option<ClaimedRetrieval> {
        loop {
            let ptr = {
                let mut work_rx = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return None,
                    work_rx = self.work_rx.lock() => work_rx,
                };
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return None,
                    ptr = work_rx.recv() => ptr?,
                }
            };

            let claimed = {
                let mut lock = self.lock();
                match lock.retrievals.get_mut(&ptr) {
                    Some(r) if r.state == RetrievalState::Queued => {
                        r.state = RetrievalState::Claimed;
                        Some(ClaimedRetrieval {
                            ptr: ptr.clone(),
                            kmd: r.kmd.clone(),
                        })
                    }
                    _ => None,
                }
            };
            match claimed {
                Some(claimed) => return Some(claimed),
                // Failed by shutdown between queueing and claiming.
                None => {
                    tracing::debug!(%ptr, "skipping retrieval no longer queued")
                }
            }
        }
    }

    /// The contexts of every subscribed request that is neither canceled
    /// nor past its deadline, in subscription order.
    ///
    /// Empty if there is no retrieval for `ptr`.
    pub fn live_contexts(&self, ptr: &BlockPointer) -> Vec<RequestContext> {
        self.lock()
            .retrievals
            .get(ptr)
            .map(|r| {
                r.subscribers
                    .iter()
                    .filter(|s| !s.ctx.is_done())
                    .map(|s| s.ctx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove the retrieval for `ptr` and return it with every request
    /// subscribed to it so far.
    ///
    /// This is the snapshot point of a retrieval: any request submitted
    /// after this call creates a new retrieval. Returns `None` if there is
    /// no retrieval for `ptr`, so calling it twice is harmless.
    pub fn finalize(&self, ptr: &BlockPointer) -> Option<CompletedRetrieval<B>> {
        let mut retrieval = self.lock().retrievals.remove(ptr)?;
        retrieval.state = RetrievalState::Completed;
        tracing::debug!(
            %ptr,
            state = ?retrieval.state,
            subscribers = retrieval.subscribers.len(),
            "finalized retrieval",
        );
        Some(CompletedRetrieval {
            ptr: ptr.clone(),
            subscribers: retrieval.subscribers,
        })
    }

    /// The current lifecycle state of the retrieval for `ptr`.
    pub fn state(&self, ptr: &BlockPointer) -> RetrievalState {
        self.lock()
            .retrievals
            .get(ptr)
            .map(|r| r.state)
            .unwrap_or(RetrievalState::Removed)
    }

    /// The number of requests currently subscribed to the retrieval for
    /// `ptr`.
    pub fn subscriber_count(&self, ptr: &BlockPointer) -> usize {
        self.lock()
            .retrievals
            .get(ptr)
            .map(|r| r.subscribers.len())
            .unwrap_or(0)
    }

    /// The number of retrievals in the registry.
    pub fn len(&self) -> usize {
        self.lock().retrievals.len()
    }

    /// True if no retrieval is in the registry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse new requests, wake every waiting [claim_next](Self::claim_next)
    /// and fail every retrieval that has not been claimed yet.
    ///
    /// Claimed retrievals are left alone so their workers can finalize them.
    pub fn shutdown(&self) {
        let unclaimed = {
            let mut lock = self.lock();
            if lock.is_shut_down {
                return;
            }
            lock.is_shut_down = true;

            let unclaimed = lock
                .retrievals
                .iter()
                .filter(|(_, r)| r.state == RetrievalState::Queued)
                .map(|(ptr, _)| ptr.clone())
                .collect::<Vec<_>>();
            unclaimed
                .into_iter()
                .filter_map(|ptr| {
                    lock.retrievals.remove(&ptr).map(|r| CompletedRetrieval {
                        ptr,
                        subscribers: r.subscribers,
                    })
                })
                .collect::<Vec<_>>()
        };
        self.shutdown.cancel();

        for completed in unclaimed {
            completed.fan_out(Err(BrError::other(
                "block retrieval queue shut down before the block was fetched",
            )));
        }
    }
}
