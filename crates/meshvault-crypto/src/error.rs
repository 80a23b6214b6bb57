//! Error types for the meshvault-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during chunk-level cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD authentication/decryption failed (wrong key, wrong nonce, or
    /// tampered ciphertext — these are indistinguishable to the cipher)
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A key or nonce had the wrong length
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A hex string failed to decode
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A digest was the wrong length for its type
    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },
}
