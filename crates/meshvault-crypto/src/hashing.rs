//! SHA-256 content hashing
//!
//! `ChunkHash` and `FileID` in the wider system are both SHA-256 digests of
//! plaintext bytes (§3, §6 of the specification). This module provides a
//! `Copy` newtype wrapper plus an incremental hasher for streaming use.

use crate::{CryptoError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a SHA-256 digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Raw digest bytes
pub type DigestBytes = [u8; DIGEST_SIZE];

/// A SHA-256 digest, used as both `ChunkHash` and `FileID`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Digest(#[serde(with = "hex_serde")] DigestBytes);

impl Sha256Digest {
    /// Wrap raw digest bytes
    pub fn new(bytes: DigestBytes) -> Self {
        Self(bytes)
    }

    /// Parse a lowercase hex digest
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.len() != DIGEST_SIZE {
            return Err(CryptoError::InvalidDigestLength {
                expected: DIGEST_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &DigestBytes {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The SHA-256 digest of the empty byte string
    pub fn of_empty() -> Self {
        hash(&[])
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self.to_hex())
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Sha256Digest {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<DigestBytes> for Sha256Digest {
    fn from(bytes: DigestBytes) -> Self {
        Self(bytes)
    }
}

mod hex_serde {
    use super::{DigestBytes, DIGEST_SIZE};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &DigestBytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DigestBytes, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != DIGEST_SIZE {
            return Err(serde::de::Error::custom(format!(
                "expected {} byte digest, got {}",
                DIGEST_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; DIGEST_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

/// Hash a single byte slice
pub fn hash(data: &[u8]) -> Sha256Digest {
    let digest = Sha256::digest(data);
    let mut bytes = [0u8; DIGEST_SIZE];
    bytes.copy_from_slice(&digest);
    Sha256Digest(bytes)
}

/// An incremental SHA-256 hasher for streaming a whole file through without
/// buffering it, used to compute `FileID` while chunks are being produced.
pub struct IncrementalHasher {
    hasher: Sha256,
    bytes_processed: u64,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes_processed: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    pub fn finalize(self) -> Sha256Digest {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes.copy_from_slice(&digest);
        Sha256Digest(bytes)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_hash_matches_known_value() {
        // SHA-256("") — a fixed, well-known constant.
        assert_eq!(
            Sha256Digest::of_empty().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello\nworld";
        assert_eq!(hash(data), hash(data));
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = IncrementalHasher::new();
        h.update(b"hello, ");
        h.update(b"world!");
        assert_eq!(h.finalize(), hash(b"hello, world!"));
    }

    #[test]
    fn hex_roundtrip() {
        let d = hash(b"roundtrip me");
        let parsed = Sha256Digest::from_hex(&d.to_hex()).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Sha256Digest::from_hex("abcd").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let d = hash(b"serde");
        let json = serde_json::to_string(&d).unwrap();
        let back: Sha256Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
