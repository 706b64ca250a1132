//! Fixed-size hash types and byte helpers shared across the engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StateError, StateResult};

/// Size of a content hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Size of an account key hash in bytes.
pub const PKHASH_SIZE: usize = 20;

/// A 32-byte content hash (trie roots, code hashes, action hashes).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    /// The all-zero hash.
    pub const fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Wraps a raw 32-byte array.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a hash from a byte slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> StateResult<Self> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            StateError::serialization(format!("expected {} hash bytes, got {}", HASH_SIZE, bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// True for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte public-key hash; the trie key for an account.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PKHash([u8; PKHASH_SIZE]);

impl PKHash {
    /// Wraps a raw 20-byte array.
    pub const fn new(bytes: [u8; PKHASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a key hash from a byte slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> StateResult<Self> {
        let arr: [u8; PKHASH_SIZE] = bytes.try_into().map_err(|_| {
            StateError::serialization(format!(
                "expected {} key-hash bytes, got {}",
                PKHASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PKHASH_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for PKHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for PKHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sha256 of `data`.
pub fn hash256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    Hash256(digest.into())
}

/// Derives a 20-byte key hash from public-key bytes.
pub fn pkhash_of(public_key: &[u8]) -> PKHash {
    let digest = Sha256::digest(public_key);
    let mut out = [0u8; PKHASH_SIZE];
    out.copy_from_slice(&digest[..PKHASH_SIZE]);
    PKHash(out)
}

/// Encodes a height as 8 big-endian bytes, the wire key for snapshots.
pub fn u64_to_bytes(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_roundtrip() {
        let h = hash256(b"hello");
        let parsed = Hash256::from_slice(h.as_bytes()).unwrap();
        assert_eq!(h, parsed);
        assert!(!h.is_zero());
        assert!(Hash256::zero().is_zero());
    }

    #[test]
    fn test_hash256_rejects_wrong_length() {
        assert!(Hash256::from_slice(&[1, 2, 3]).is_err());
        assert!(PKHash::from_slice(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_pkhash_of_is_stable() {
        let a = pkhash_of(b"pubkey");
        let b = pkhash_of(b"pubkey");
        assert_eq!(a, b);
        assert_ne!(a, pkhash_of(b"other"));
    }

    #[test]
    fn test_u64_big_endian() {
        assert_eq!(u64_to_bytes(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(u64_to_bytes(0x0102030405060708), [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
