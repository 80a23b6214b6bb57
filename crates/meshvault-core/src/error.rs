//! Top-level error taxonomy (§7), aggregating every crate's error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeshvaultError>;

/// The taxonomy of error kinds in §7. Each crate defines its own
/// `thiserror`-derived enum for the errors it can produce; this type is
/// what the Supervisor's public API surfaces, folding every lower-level
/// error into one of these kinds via `#[from]`.
#[derive(Error, Debug)]
pub enum MeshvaultError {
    /// A file, chunk, or node lookup found nothing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Recomputed hash didn't match the recorded one.
    #[error("chunk {chunk_index} corrupt: expected {expected}, got {actual}")]
    Corrupt {
        chunk_index: u32,
        expected: String,
        actual: String,
    },

    /// AEAD tag invalid — almost always a wrong password.
    #[error("decryption failed for chunk {chunk_index}")]
    DecryptionError { chunk_index: u32 },

    /// Placement could not satisfy the desired replica count.
    #[error("insufficient replicas for chunk {chunk_hash}: have {have}, need {need}")]
    InsufficientReplicas {
        chunk_hash: String,
        have: usize,
        need: usize,
    },

    /// Every replica of a chunk failed to yield a valid copy.
    #[error("chunk {chunk_index} unrecoverable: all replicas exhausted")]
    UnrecoverableChunk { chunk_index: u32 },

    /// Transport-level failure reaching a node. Informational — callers
    /// retry against a different node rather than surfacing this raw.
    #[error("node {0} unreachable")]
    NodeUnreachable(String),

    /// A chain-rule or consistency check failed. Always a bug; fatal to
    /// the operation but never crashes the process.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Cooperative cancellation requested by the caller.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Crypto(#[from] meshvault_crypto::CryptoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl MeshvaultError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
