//! ChaCha20-Poly1305 AEAD encryption for chunk plaintext
//!
//! Wire format matches §6: a 12-byte random nonce prefixed directly to the
//! ciphertext, with the Poly1305 tag appended by the cipher itself. No
//! additional authenticated data is used; chunk identity is the hash of the
//! *plaintext*, computed separately, so AAD binding isn't needed here.

use chacha20poly1305::aead::{Aead as _, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce as ChaChaNonce};
use rand::rngs::OsRng;

use crate::keys::DekKey;
use crate::{CryptoError, Result};

/// Length in bytes of the random nonce prefixed to every ciphertext.
pub const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext || tag`.
pub fn encrypt(key: &DekKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt`]. Any of a wrong key, wrong nonce,
/// or tampered ciphertext surfaces as the same [`CryptoError::Decryption`] —
/// AEAD gives no way to distinguish them, by design.
pub fn decrypt(key: &DekKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::Decryption("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = ChaChaNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}
