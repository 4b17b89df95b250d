//! Content-addressed hashing primitives
//!
//! Provides [`ContentHash`], the 32-byte identity of an artifact set. The
//! hash is the cache key for everything the spec cache stores, so it must
//! never depend on the order in which artifacts were discovered.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Length of a [`ContentHash`] in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte content hash (Blake3)
///
/// Immutable and cheap to clone (Copy). Renders as 64 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Compute Blake3 hash of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Compute the hash of a sequence of blobs fed into one digest context.
    ///
    /// Callers are responsible for the order; [`crate::ArtifactSet::content_hash`]
    /// always passes artifacts sorted by name.
    #[must_use]
    pub fn compute_all<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self::new(*hasher.finalize().as_bytes())
    }

    /// Hex prefix used in progress logs ("Unpacking (3fa9c1)")
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..3])
    }

    /// Full hex identifier, the form used in cache URLs.
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8; HASH_LEN]> for ContentHash {
    fn as_ref(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
