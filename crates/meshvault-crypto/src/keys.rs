//! Password-based key derivation
//!
//! The reference crate derives symmetric keys from asymmetric key-exchange
//! output (X25519 + HPKE). This workspace has no peer key-exchange layer, so
//! chunk encryption keys are derived directly from an operator-supplied
//! password via HKDF-SHA256, matching the "password-derived key" requirement
//! in §4.1 step 4 of the specification.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Domain-separation string mixed into every derivation so this key material
/// can never collide with a key derived for an unrelated purpose from the
/// same password.
const HKDF_INFO: &[u8] = b"meshvault-chunk-encryption-key-v1";

/// Length in bytes of a ChaCha20-Poly1305 key.
pub const KEY_LEN: usize = 32;

/// A derived 256-bit encryption key. Zeroized on drop so it doesn't linger
/// in process memory after the pipeline is done with it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DekKey([u8; KEY_LEN]);

impl DekKey {
    /// Derive a key from a password and a fixed salt.
    ///
    /// The salt is not secret — it exists so that the same password used
    /// against two different stores (or rotated) produces unrelated keys.
    /// Callers should pass a per-store salt persisted alongside the store,
    /// not regenerate one per file.
    pub fn derive(password: &[u8], salt: &[u8]) -> Result<Self> {
        if password.is_empty() {
            return Err(CryptoError::InvalidKey("password must not be empty".into()));
        }
        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut out = [0u8; KEY_LEN];
        hk.expand(HKDF_INFO, &mut out)
            .map_err(|_| CryptoError::InvalidKey("HKDF expand failed".into()))?;
        Ok(Self(out))
    }

    /// Wrap raw key bytes directly (used in tests and when a key was
    /// persisted out-of-band rather than re-derived from a password).
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DekKey(REDACTED)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = DekKey::derive(b"hunter2", b"salt").unwrap();
        let b = DekKey::derive(b"hunter2", b"salt").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_passwords_differ() {
        let a = DekKey::derive(b"hunter2", b"salt").unwrap();
        let b = DekKey::derive(b"hunter3", b"salt").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salts_differ() {
        let a = DekKey::derive(b"hunter2", b"salt-a").unwrap();
        let b = DekKey::derive(b"hunter2", b"salt-b").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rejects_empty_password() {
        assert!(DekKey::derive(b"", b"salt").is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let k = DekKey::derive(b"hunter2", b"salt").unwrap();
        assert_eq!(format!("{:?}", k), "DekKey(REDACTED)");
    }
}
