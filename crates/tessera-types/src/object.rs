use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of bytes in an [`ObjectId`].
pub const OBJECT_ID_LEN: usize = 32;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the BLAKE3 digest of an object's canonical encoding.
/// Identical content always produces the same `ObjectId`, making objects
/// deduplicatable and verifiable. Ordering is lexicographic on the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// The null object ID (all zeros). Represents "no object".
    pub const NULL: Self = Self([0u8; OBJECT_ID_LEN]);

    /// Compute an `ObjectId` from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create an `ObjectId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; OBJECT_ID_LEN]) -> Self {
        Self(hash)
    }

    /// The null object ID.
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OBJECT_ID_LEN]
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// The byte at position `n` of the digest.
    pub fn byte_n(&self, n: usize) -> u8 {
        self.0[n]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Returns `true` if the hex form of this id starts with `prefix`.
    ///
    /// The prefix may have an odd number of characters; comparison is
    /// case-insensitive.
    pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
        if prefix.len() > OBJECT_ID_LEN * 2 {
            return false;
        }
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }

    /// Parse from a full-length hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != OBJECT_ID_LEN {
            return Err(TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OBJECT_ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OBJECT_ID_LEN] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}
