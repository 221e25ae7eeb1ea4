//! Types dealing with block identity.

macro_rules! imp_deref {
    ($i:ty, $t:ty) => {
        impl std::ops::Deref for $i {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! imp_from {
    ($a:ty, $b:ty, $i:ident => $e:expr) => {
        impl From<$b> for $a {
            fn from($i: $b) -> Self {
                $e
            }
        }
    };
}

/// Base data identity type meant for newtyping.
/// You probably want [BlockId] or [TlfId].
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Id(#[serde(with = "crate::serde_bytes_base64")] pub bytes::Bytes);

imp_deref!(Id, bytes::Bytes);
imp_from!(Id, bytes::Bytes, b => Id(b));

/// Ids are displayed as url-safe base64.
/// This makes debugging so much easier than rust's default of decimal array.
fn display(b: &bytes::Bytes, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use base64::prelude::*;
    f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(b))
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display(&self.0, f)
    }
}

macro_rules! imp_id {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Id);

        imp_deref!($name, Id);
        imp_from!($name, bytes::Bytes, b => $name(Id(b)));
        imp_from!($name, Id, b => $name(b));

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                display(&self.0 .0, f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                display(&self.0 .0, f)
            }
        }
    };
}

imp_id!(
    /// Content address of one stored encrypted block.
    ///
    /// These bytes are the SHA-256 digest of the encoded block exactly
    /// as the block server stores it.
    BlockId
);

imp_id!(
    /// Identifies one filesystem instance (top-level folder). Block
    /// servers namespace blocks by this id and key managers derive
    /// keys per instance.
    TlfId
);

imp_id!(
    /// Identifies the device or user that wrote a block reference.
    WriterId
);

/// The key generation a block was encrypted under.
pub type KeyGen = u32;

/// Describes how a block reference was written.
///
/// Two pointers with the same [BlockId] but different contexts are
/// different references to the same stored bytes.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    /// Who created the block.
    pub creator: WriterId,

    /// Zero for the first reference, unique per additional reference.
    pub ref_nonce: u64,
}

/// A content pointer to one encrypted block: the dedup key used by the
/// retrieval queue.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BlockPointer {
    /// Content address of the encrypted block.
    pub id: BlockId,

    /// Key generation the block was encrypted under.
    pub key_gen: KeyGen,

    /// Version of the block data encoding.
    pub data_ver: u32,

    /// How this reference to the block was written.
    pub context: BlockContext,
}

impl std::fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlockPointer{{id: {}, keyGen: {}, dataVer: {}, creator: {}, refNonce: {}}}",
            self.id,
            self.key_gen,
            self.data_ver,
            self.context.creator,
            self.context.ref_nonce,
        )
    }
}
