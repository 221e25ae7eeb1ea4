//! Factories for generating instances of block retrieval modules.

mod core_crypto;
pub use core_crypto::*;

pub mod mem_block_server;
pub use mem_block_server::{MemBlockServer, MemBlockServerFactory};

mod mem_key_manager;
pub use mem_key_manager::*;

pub mod caching_key_manager;
pub use caching_key_manager::{CachingKeyManager, CachingKeyManagerFactory};

mod core_block_getter;
pub use core_block_getter::*;

pub mod core_block_retrieval;
pub use core_block_retrieval::CoreBlockRetrieval;

mod fake_block_getter;
pub use fake_block_getter::*;
