use crate::factories::{
    core_block_retrieval::{
        CoreBlockRetrieval, CoreBlockRetrievalConfig,
        CoreBlockRetrievalModConfig, RetrievalState,
    },
    FakeBlockGetter,
};
use blockret_api::*;
use blockret_test_utils::{
    enable_tracing,
    id::{create_block_pointer_list, random_block_pointer, random_key_metadata},
    iter_check,
};
use bytes::Bytes;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Default)]
struct RecordingFatalErrorHandler(Mutex<Vec<(BlockPointer, BrError)>>);

impl RecordingFatalErrorHandler {
    fn recorded(&self) -> Vec<(BlockPointer, BrError)> {
        self.0.lock().unwrap().clone()
    }
}

impl FatalErrorHandler for RecordingFatalErrorHandler {
    fn fatal_error(&self, ptr: &BlockPointer, err: &BrError) {
        self.0.lock().unwrap().push((ptr.clone(), err.clone()));
    }
}

struct TestCase {
    retrieval: CoreBlockRetrieval<FileBlock>,
    getter: Arc<FakeBlockGetter<FileBlock>>,
    fatal: Arc<RecordingFatalErrorHandler>,
    kmd: KeyMetadata,
}

fn setup(worker_count: u8) -> TestCase {
    enable_tracing();
    let getter = FakeBlockGetter::<FileBlock>::create();
    let fatal = Arc::new(RecordingFatalErrorHandler::default());
    let retrieval = CoreBlockRetrieval::new(
        CoreBlockRetrievalConfig { worker_count },
        getter.clone(),
        fatal.clone(),
    );
    TestCase {
        retrieval,
        getter,
        fatal,
        kmd: random_key_metadata(),
    }
}

impl TestCase {
    fn request(
        &self,
        ctx: RequestContext,
        ptr: &BlockPointer,
    ) -> PendingBlock<FileBlock> {
        self.retrieval.request(ctx, self.kmd.clone(), ptr.clone())
    }

    async fn wait_for_calls(&self, ptr: &BlockPointer, count: usize) {
        iter_check!({
            if self.getter.call_count(ptr) == count {
                break;
            }
        });
    }
}

fn block(contents: &'static [u8]) -> FileBlock {
    FileBlock::new(Bytes::from_static(contents))
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_requests_share_one_fetch() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    let gate = tc.getter.set_block_to_return(ptr.clone(), block(b"hello"));

    let a = tc.request(RequestContext::new(), &ptr);
    let b = tc.request(RequestContext::new(), &ptr);
    tc.wait_for_calls(&ptr, 1).await;
    gate.release();

    let (a, b) = futures::join!(a, b);
    assert_eq!(b"hello".as_slice(), &a.unwrap().contents[..]);
    assert_eq!(b"hello".as_slice(), &b.unwrap().contents[..]);
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn request_into_writes_destination() {
    let tc = setup(2);
    let ptr = random_block_pointer();
    tc.getter
        .set_block_to_return(ptr.clone(), block(b"into"))
        .release();

    let mut dest = FileBlock::default();
    tc.retrieval
        .request_into(RequestContext::new(), tc.kmd.clone(), ptr, &mut dest)
        .await
        .unwrap();
    assert_eq!(b"into".as_slice(), &dest.contents[..]);
}

#[tokio::test(flavor = "multi_thread")]
async fn canceled_lone_request_is_never_fetched() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    tc.getter
        .set_block_to_return(ptr.clone(), block(b"unused"))
        .release();

    let ctx = RequestContext::new();
    ctx.cancel();
    let res = tc.request(ctx, &ptr).await;
    assert!(matches!(res, Err(BrError::Canceled)));
    assert_eq!(0, tc.getter.call_count(&ptr));
    assert_eq!(RetrievalState::Removed, tc.retrieval.queue().state(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_lone_request_is_never_fetched() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    tc.getter
        .set_block_to_return(ptr.clone(), block(b"unused"))
        .release();

    let res = tc
        .request(RequestContext::with_timeout(Duration::ZERO), &ptr)
        .await;
    assert!(matches!(res, Err(BrError::Canceled)));
    assert_eq!(0, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn canceled_requester_still_receives_outcome() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    let gate = tc.getter.set_block_to_return(ptr.clone(), block(b"kept"));

    let ctx_a = RequestContext::new();
    let a = tc.request(ctx_a.clone(), &ptr);
    let b = tc.request(RequestContext::new(), &ptr);
    tc.wait_for_calls(&ptr, 1).await;

    ctx_a.cancel();
    gate.release();

    assert_eq!(b"kept".as_slice(), &a.await.unwrap().contents[..]);
    assert_eq!(b"kept".as_slice(), &b.await.unwrap().contents[..]);
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn canceled_before_claim_still_receives_outcome() {
    let tc = setup(1);

    // keep the only worker busy so both requests are queued before a claim
    let busy = random_block_pointer();
    let busy_gate = tc.getter.set_block_to_return(busy.clone(), block(b"busy"));
    let busy_req = tc.request(RequestContext::new(), &busy);
    tc.wait_for_calls(&busy, 1).await;

    let ptr = random_block_pointer();
    tc.getter
        .set_block_to_return(ptr.clone(), block(b"driven"))
        .release();

    let canceled = RequestContext::new();
    canceled.cancel();
    let a = tc.request(canceled.clone(), &ptr);
    let b = tc.request(RequestContext::new(), &ptr);
    assert_eq!(RetrievalState::Queued, tc.retrieval.queue().state(&ptr));

    busy_gate.release();
    busy_req.await.unwrap();

    assert_eq!(b"driven".as_slice(), &a.await.unwrap().contents[..]);
    assert_eq!(b"driven".as_slice(), &b.await.unwrap().contents[..]);
    assert!(canceled.is_done());
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_submitters_share_one_fetch() {
    const SUBMITTERS: usize = 32;

    let tc = Arc::new(setup(4));
    let ptr = random_block_pointer();
    let gate = tc.getter.set_block_to_return(ptr.clone(), block(b"same"));
    let barrier = Arc::new(tokio::sync::Barrier::new(SUBMITTERS));

    let tasks = (0..SUBMITTERS)
        .map(|_| {
            let tc = tc.clone();
            let ptr = ptr.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                tc.request(RequestContext::new(), &ptr).await
            })
        })
        .collect::<Vec<_>>();

    iter_check!({
        if tc.retrieval.queue().subscriber_count(&ptr) == SUBMITTERS {
            break;
        }
    });
    assert_eq!(1, tc.retrieval.queue().len());
    gate.release();

    for res in futures::future::join_all(tasks).await {
        assert_eq!(b"same".as_slice(), &res.unwrap().unwrap().contents[..]);
    }
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn integrity_error_reaches_all_and_is_not_cached() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    let gate = tc.getter.set_error_to_return(
        ptr.clone(),
        BrError::BlockIdMismatch {
            expected: "a".into(),
            actual: "b".into(),
        },
    );

    let a = tc.request(RequestContext::new(), &ptr);
    let b = tc.request(RequestContext::new(), &ptr);
    tc.wait_for_calls(&ptr, 1).await;
    gate.release();

    assert!(matches!(a.await, Err(BrError::BlockIdMismatch { .. })));
    assert!(matches!(b.await, Err(BrError::BlockIdMismatch { .. })));
    assert_eq!(RetrievalState::Removed, tc.retrieval.queue().state(&ptr));
    assert!(tc.fatal.recorded().is_empty());

    // a new request fetches again
    let c = tc.request(RequestContext::new(), &ptr);
    assert!(matches!(c.await, Err(BrError::BlockIdMismatch { .. })));
    assert_eq!(2, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn late_joiner_before_finalize_shares_fetch() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    let gate = tc.getter.set_block_to_return(ptr.clone(), block(b"v1"));

    let a = tc.request(RequestContext::new(), &ptr);
    tc.wait_for_calls(&ptr, 1).await;
    assert_eq!(RetrievalState::Claimed, tc.retrieval.queue().state(&ptr));

    let b = tc.request(RequestContext::new(), &ptr);
    assert_eq!(2, tc.retrieval.queue().subscriber_count(&ptr));
    gate.release();

    assert_eq!(b"v1".as_slice(), &a.await.unwrap().contents[..]);
    assert_eq!(b"v1".as_slice(), &b.await.unwrap().contents[..]);
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn request_after_completion_fetches_again() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    tc.getter
        .set_block_to_return(ptr.clone(), block(b"v1"))
        .release();

    let a = tc.request(RequestContext::new(), &ptr).await.unwrap();
    assert_eq!(b"v1".as_slice(), &a.contents[..]);

    tc.getter
        .set_block_to_return(ptr.clone(), block(b"v2"))
        .release();
    let b = tc.request(RequestContext::new(), &ptr).await.unwrap();
    assert_eq!(b"v2".as_slice(), &b.contents[..]);
    assert_eq!(2, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_error_is_escalated_then_delivered() {
    let tc = setup(1);
    let ptr = random_block_pointer();
    tc.getter
        .set_error_to_return(
            ptr.clone(),
            BrError::protocol_violation(&ptr, BrError::bad_request("bad")),
        )
        .release();

    let a = tc.request(RequestContext::new(), &ptr).await;
    assert!(matches!(a, Err(BrError::ProtocolViolation { .. })));

    let recorded = tc.fatal.recorded();
    assert_eq!(1, recorded.len());
    assert_eq!(ptr, recorded[0].0);
    assert!(recorded[0].1.is_fatal());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_block_error_is_delivered() {
    let tc = setup(1);
    let ptr = random_block_pointer();

    let res = tc.request(RequestContext::new(), &ptr).await;
    assert!(matches!(res, Err(BrError::Other { .. })));
    assert_eq!(1, tc.getter.call_count(&ptr));
}

#[tokio::test(flavor = "multi_thread")]
async fn workers_fetch_in_parallel() {
    let tc = setup(4);
    let ptrs = create_block_pointer_list(4);
    let gates = ptrs
        .iter()
        .map(|ptr| tc.getter.set_block_to_return(ptr.clone(), block(b"p")))
        .collect::<Vec<_>>();

    let pending = ptrs
        .iter()
        .map(|ptr| tc.request(RequestContext::new(), ptr))
        .collect::<Vec<_>>();

    // every fetch is in flight at once
    iter_check!({
        if tc.getter.total_call_count() == 4 {
            break;
        }
    });

    gates.iter().for_each(|g| g.release());
    for res in futures::future::join_all(pending).await {
        assert_eq!(b"p".as_slice(), &res.unwrap().contents[..]);
    }
    assert!(tc.retrieval.queue().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_completes_in_flight_and_fails_queued() {
    let tc = Arc::new(setup(1));
    let in_flight = random_block_pointer();
    let queued = random_block_pointer();
    let gate = tc
        .getter
        .set_block_to_return(in_flight.clone(), block(b"finish"));
    tc.getter
        .set_block_to_return(queued.clone(), block(b"never"))
        .release();

    let a = tc.request(RequestContext::new(), &in_flight);
    tc.wait_for_calls(&in_flight, 1).await;
    let b = tc.request(RequestContext::new(), &queued);

    let shutdown = tokio::spawn({
        let tc = tc.clone();
        async move { tc.retrieval.shutdown().await }
    });

    assert!(matches!(b.await, Err(BrError::Other { .. })));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!shutdown.is_finished());

    gate.release();
    assert_eq!(b"finish".as_slice(), &a.await.unwrap().contents[..]);
    shutdown.await.unwrap();

    assert_eq!(0, tc.getter.call_count(&queued));
    let after = tc.request(RequestContext::new(), &in_flight).await;
    assert!(matches!(after, Err(BrError::Other { .. })));
}

#[derive(Debug)]
struct PanickingGetter;

impl BlockGetter<FileBlock> for PanickingGetter {
    #[allow(unreachable_code)]
    fn get_block<'a>(
        &'a self,
        _ctx: RequestContext,
        _kmd: KeyMetadata,
        _ptr: BlockPointer,
        _block: &'a mut FileBlock,
    ) -> BoxFut<'a, BrResult<()>> {
        Box::pin(async move {
            let res: BrResult<()> = panic!("getter bug");
            res
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn getter_panic_is_delivered_as_error() {
    let retrieval = CoreBlockRetrieval::<FileBlock>::new(
        CoreBlockRetrievalConfig { worker_count: 1 },
        Arc::new(PanickingGetter),
        Arc::new(RecordingFatalErrorHandler::default()),
    );
    let ptr = random_block_pointer();
    let kmd = random_key_metadata();

    let res = retrieval
        .request(RequestContext::new(), kmd.clone(), ptr.clone())
        .await;
    assert!(matches!(res, Err(BrError::Other { .. })));

    // the worker survived
    let res = retrieval.request(RequestContext::new(), kmd, ptr).await;
    assert!(matches!(res, Err(BrError::Other { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn create_from_builder_config() {
    let builder = crate::default_builder().with_default_config().unwrap();
    CoreBlockRetrieval::<FileBlock>::default_config(&builder.config).unwrap();
    let config: CoreBlockRetrievalModConfig =
        builder.config.get_module_config().unwrap();
    assert_eq!(10, config.core_block_retrieval.worker_count);

    let retrieval =
        CoreBlockRetrieval::<FileBlock>::create_with_core_getter(Arc::new(
            builder,
        ))
        .await
        .unwrap();
    retrieval.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_workers_is_rejected() {
    let builder = crate::default_builder().with_default_config().unwrap();
    builder
        .config
        .set_module_config(&CoreBlockRetrievalModConfig {
            core_block_retrieval: CoreBlockRetrievalConfig { worker_count: 0 },
        })
        .unwrap();

    assert!(CoreBlockRetrieval::<FileBlock>::create(
        Arc::new(builder),
        FakeBlockGetter::<FileBlock>::create(),
    )
    .is_err());
}
