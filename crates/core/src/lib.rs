#![deny(missing_docs)]
//! Block retrieval core: the deduplicating retrieval queue, its worker pool
//! and in-memory implementations of every collaborator module.

use blockret_api::*;
use std::sync::Arc;

/// A [FatalErrorHandler] that logs every fatal error.
#[derive(Debug)]
pub struct LogFatalErrorHandler;

impl FatalErrorHandler for LogFatalErrorHandler {
    fn fatal_error(&self, ptr: &BlockPointer, err: &BrError) {
        tracing::error!(%ptr, ?err, "fatal block retrieval error");
    }
}

/// Construct a default builder.
///
/// - `crypto` - The default crypto is [factories::CoreCrypto].
/// - `fatal_error_handler` - The default handler is [LogFatalErrorHandler].
/// - `block_server` - The default block server is
///   [factories::MemBlockServerFactory].
/// - `key_manager` - The default key manager is
///   [factories::CachingKeyManagerFactory] wrapping
///   [factories::MemKeyManagerFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        crypto: factories::CoreCrypto::create(),
        fatal_error_handler: Arc::new(LogFatalErrorHandler),
        block_server: factories::MemBlockServerFactory::create(),
        key_manager: factories::CachingKeyManagerFactory::create(
            factories::MemKeyManagerFactory::create(),
        ),
    }
}

pub mod clock;
pub mod factories;
pub mod ready_block;
