//! A [BlockGetter] test double returning canned outcomes.
//!
//! Each registered pointer has a gate. [FakeBlockGetter::get_block] waits
//! for the gate to be released before it returns, which lets tests hold a
//! fetch in flight while they submit, cancel or shut down around it.

use blockret_api::*;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};
use tokio::sync::watch;

/// Releases a fetch held by a [FakeBlockGetter].
#[derive(Debug)]
pub struct BlockGate(watch::Sender<bool>);

impl BlockGate {
    /// Let every current and future fetch of the gated pointer complete.
    pub fn release(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug)]
struct BlockReturner<B: Block> {
    outcome: BrResult<B>,
    gate: watch::Receiver<bool>,
}

/// A [BlockGetter] that returns canned blocks or errors.
#[derive(Debug)]
pub struct FakeBlockGetter<B: Block> {
    blocks: RwLock<HashMap<BlockPointer, BlockReturner<B>>>,
    calls: Mutex<HashMap<BlockPointer, usize>>,
}

impl<B: Block> Default for FakeBlockGetter<B> {
    fn default() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<B: Block> FakeBlockGetter<B> {
    /// Construct a new FakeBlockGetter.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fetches of `ptr` return `block` once the returned gate is released.
    pub fn set_block_to_return(&self, ptr: BlockPointer, block: B) -> BlockGate {
        self.set_outcome(ptr, Ok(block))
    }

    /// Fetches of `ptr` fail with `err` once the returned gate is released.
    pub fn set_error_to_return(
        &self,
        ptr: BlockPointer,
        err: BrError,
    ) -> BlockGate {
        self.set_outcome(ptr, Err(err))
    }

    /// How many times `ptr` has been fetched.
    pub fn call_count(&self, ptr: &BlockPointer) -> usize {
        self.calls
            .lock()
            .expect("FakeBlockGetter calls Mutex is poisoned")
            .get(ptr)
            .copied()
            .unwrap_or(0)
    }

    /// How many fetches have been made across all pointers.
    pub fn total_call_count(&self) -> usize {
        self.calls
            .lock()
            .expect("FakeBlockGetter calls Mutex is poisoned")
            .values()
            .sum()
    }

    fn set_outcome(&self, ptr: BlockPointer, outcome: BrResult<B>) -> BlockGate {
        let (tx, gate) = watch::channel(false);
        self.blocks
            .write()
            .expect("FakeBlockGetter blocks RwLock is poisoned")
            .insert(ptr, BlockReturner { outcome, gate });
        BlockGate(tx)
    }
}

impl<B: Block> BlockGetter<B> for FakeBlockGetter<B> {
    fn get_block<'a>(
        &'a self,
        _ctx: RequestContext,
        _kmd: KeyMetadata,
        ptr: BlockPointer,
        block: &'a mut B,
    ) -> BoxFut<'a, BrResult<()>> {
        Box::pin(async move {
            *self
                .calls
                .lock()
                .expect("FakeBlockGetter calls Mutex is poisoned")
                .entry(ptr.clone())
                .or_default() += 1;

            let returner = self
                .blocks
                .read()
                .expect("FakeBlockGetter blocks RwLock is poisoned")
                .get(&ptr)
                .map(|r| (r.outcome.clone(), r.gate.clone()));
            let Some((outcome, mut gate)) = returner else {
                return Err(BrError::other(
                    "block doesn't exist in fake block map",
                ));
            };

            gate.wait_for(|released| *released).await.map_err(|_| {
                BrError::other("fake block gate dropped without release")
            })?;

            *block = outcome?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use blockret_test_utils::id::{random_block_pointer, random_key_metadata};
    use std::time::Duration;

    #[tokio::test]
    async fn fetch_waits_for_gate() {
        let getter = FakeBlockGetter::<FileBlock>::create();
        let ptr = random_block_pointer();
        let gate = getter.set_block_to_return(
            ptr.clone(),
            FileBlock::new(bytes::Bytes::from_static(b"canned")),
        );

        let task = tokio::spawn({
            let getter = getter.clone();
            let ptr = ptr.clone();
            async move {
                let mut block = FileBlock::default();
                getter
                    .get_block(
                        RequestContext::new(),
                        random_key_metadata(),
                        ptr,
                        &mut block,
                    )
                    .await
                    .map(|_| block)
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        assert_eq!(1, getter.call_count(&ptr));

        gate.release();
        let block = task.await.unwrap().unwrap();
        assert_eq!(b"canned".as_slice(), &block.contents[..]);
    }

    #[tokio::test]
    async fn unknown_pointer_is_an_error() {
        let getter = FakeBlockGetter::<FileBlock>::create();
        let mut block = FileBlock::default();
        assert!(getter
            .get_block(
                RequestContext::new(),
                random_key_metadata(),
                random_block_pointer(),
                &mut block,
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn canned_error_is_returned() {
        let getter = FakeBlockGetter::<FileBlock>::create();
        let ptr = random_block_pointer();
        getter
            .set_error_to_return(ptr.clone(), BrError::bad_request("nope"))
            .release();

        let mut block = FileBlock::default();
        let res = getter
            .get_block(
                RequestContext::new(),
                random_key_metadata(),
                ptr,
                &mut block,
            )
            .await;
        assert!(matches!(res, Err(BrError::BadRequest { .. })));
    }
}
