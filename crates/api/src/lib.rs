#![deny(missing_docs)]
//! Block retrieval api contains the module traits and the basic types
//! required to define the api of those traits.
//!
//! The retrieval engine turns many concurrent "give me this block" requests
//! into a minimal set of fetches from a remote block server, verifies and
//! decrypts what comes back and fans each outcome out to every request.
//!
//! If you want working implementations, please see the blockret_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub(crate) mod serde_bytes_base64 {
    pub fn serialize<S>(
        b: &bytes::Bytes,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use base64::prelude::*;
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(b))
    }

    pub fn deserialize<'de, D, T: From<bytes::Bytes>>(
        deserializer: D,
    ) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use base64::prelude::*;
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map(|v| bytes::Bytes::from(v).into())
            .map_err(serde::de::Error::custom)
    }
}

mod error;
pub use error::*;

pub mod id;
pub use id::{BlockContext, BlockId, BlockPointer, KeyGen, TlfId, WriterId};

mod block;
pub use block::*;

mod key;
pub use key::*;

mod context;
pub use context::*;

pub mod codec;

mod config;
pub use config::*;

mod crypto;
pub use crypto::*;

mod block_server;
pub use block_server::*;

mod key_manager;
pub use key_manager::*;

mod block_getter;
pub use block_getter::*;

mod retrieval;
pub use retrieval::*;

mod fatal;
pub use fatal::*;

mod builder;
pub use builder::*;
