//! Escalation of fatal errors.

use crate::*;
use std::sync::Arc;

/// Receives every fatal error (see [BrError::is_fatal]) a retrieval
/// resolves with, before that error is delivered to the requests.
///
/// Fatal errors point at a logic bug elsewhere in the system. A handler
/// may log, alert or abort, but it must not ignore them.
pub trait FatalErrorHandler: 'static + Send + Sync + std::fmt::Debug {
    /// Handle a fatal error encountered while fetching `ptr`.
    fn fatal_error(&self, ptr: &BlockPointer, err: &BrError);
}

/// Trait-object [FatalErrorHandler].
pub type DynFatalErrorHandler = Arc<dyn FatalErrorHandler>;
