//! Cancellable request contexts.

use crate::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The cancellation scope of one caller's request.
///
/// A context is done once its token is canceled or its deadline passed.
/// Cloning a context shares the cancellation state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never done unless explicitly canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that becomes done at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context that becomes done after `timeout`.
    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// `Some` with the reason if this context is done.
    pub fn err(&self) -> Option<BrError> {
        if self.token.is_cancelled() {
            return Some(BrError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(BrError::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// True if this context is canceled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves with the reason once this context is done.
    pub async fn done(&self) -> BrError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => BrError::Canceled,
                _ = tokio::time::sleep_until(deadline) => {
                    BrError::DeadlineExceeded
                }
            },
            None => {
                self.token.cancelled().await;
                BrError::Canceled
            }
        }
    }

    /// Run `fut` under this context, resolving with the context error if
    /// the context is done first.
    pub async fn run<T, F>(&self, fut: F) -> BrResult<T>
    where
        F: std::future::Future<Output = BrResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}
