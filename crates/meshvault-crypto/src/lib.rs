//! Chunk-level cryptographic primitives.
//!
//! ```text
//! plaintext chunk
//!   -> compression::compress   (skipped for incompressible extensions)
//!   -> symmetric::encrypt      (ChaCha20-Poly1305, password-derived key)
//!   -> hashing::hash           (ChunkHash = SHA-256 of plaintext, computed
//!                               before compress/encrypt, not after)
//! ```
//!
//! The inverse path (`symmetric::decrypt` then `compression::decompress`)
//! lives next to each primitive; orchestration across a whole file lives in
//! `meshvault-blockstore`'s `pipeline` module, which calls into this crate
//! chunk by chunk.

mod compression;
mod error;
mod hashing;
mod keys;
mod symmetric;

pub use compression::{compress, decompress, is_incompressible, INCOMPRESSIBLE_EXTENSIONS};
pub use error::{CryptoError, Result};
pub use hashing::{hash, DigestBytes, IncrementalHasher, Sha256Digest, DIGEST_SIZE};
pub use keys::{DekKey, KEY_LEN};
pub use symmetric::{decrypt, encrypt, NONCE_LEN};
