//! Key material types.
//!
//! None of the secret types here print their bytes in `Debug` output, and
//! all of them are zeroized on drop.

use crate::*;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes of every symmetric key in this module.
pub const KEY_LEN: usize = 32;

macro_rules! imp_secret {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            /// Wrap raw key bytes.
            pub fn new(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            /// Access the raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

imp_secret!(
    /// The filesystem-wide key for one key generation of a [TlfId].
    TlfCryptKey
);

imp_secret!(
    /// The block server's half of a block crypt key. Combined with a
    /// [TlfCryptKey] it yields the [BlockCryptKey].
    BlockCryptKeyServerHalf
);

imp_secret!(
    /// The symmetric key one block was encrypted with.
    BlockCryptKey
);

/// The metadata needed to find the keys a filesystem instance's blocks
/// were encrypted with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyMetadata {
    /// The filesystem instance.
    pub tlf_id: TlfId,

    /// The most recent key generation of the instance.
    pub latest_key_gen: KeyGen,
}

impl KeyMetadata {
    /// Construct key metadata for `tlf_id`.
    pub fn new(tlf_id: TlfId, latest_key_gen: KeyGen) -> Self {
        Self {
            tlf_id,
            latest_key_gen,
        }
    }
}
