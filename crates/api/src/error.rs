//! Block retrieval error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The block retrieval error type.
///
/// This type is required to implement `Clone` because a single fetch
/// outcome is delivered to every request subscribed to that retrieval.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrError {
    /// The request context was canceled, or every request that could have
    /// driven a retrieval was canceled before it was fetched.
    #[error("request canceled")]
    Canceled,

    /// The request context deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The fetched bytes do not hash to the requested block id.
    /// Block bytes are stable for an id, so this is never retried.
    #[error("block id mismatch: expected {expected}, got {actual}")]
    BlockIdMismatch {
        /// The id that was requested.
        expected: Arc<str>,

        /// The id the fetched bytes actually hash to.
        actual: Arc<str>,
    },

    /// The block server has no block stored under this id.
    #[error("no such block: {id}")]
    NoSuchBlock {
        /// The requested block id.
        id: Arc<str>,
    },

    /// The block server rejected the request as malformed.
    #[error("block server rejected request: {ctx}")]
    BadRequest {
        /// The reason given by the block server.
        ctx: Arc<str>,
    },

    /// A request this layer believed well-formed was rejected by the
    /// block server. This points at a bug in pointer construction and
    /// must be escalated, see [crate::FatalErrorHandler].
    #[error("protocol violation fetching {ptr}: {src}")]
    ProtocolViolation {
        /// The offending block pointer.
        ptr: Arc<str>,

        /// The block server error.
        #[source]
        src: DynInnerError,
    },

    /// Generic block retrieval internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl BrError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a "bad request" error as a block server would.
    pub fn bad_request<C: std::fmt::Display>(ctx: C) -> Self {
        Self::BadRequest {
            ctx: ctx.to_string().into_boxed_str().into(),
        }
    }

    /// Promote a block server error for `ptr` into a protocol violation.
    pub fn protocol_violation<P: std::fmt::Display>(
        ptr: P,
        src: BrError,
    ) -> Self {
        Self::ProtocolViolation {
            ptr: ptr.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// True if this error indicates a logic bug that must be escalated
    /// rather than merely returned to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    /// True if this error was produced by request cancellation or an
    /// expired deadline.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

/// The block retrieval result type.
pub type BrResult<T> = Result<T, BrError>;
