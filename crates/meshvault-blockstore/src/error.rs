//! Error types for the meshvault-blockstore crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockStoreError>;

#[derive(Error, Debug)]
pub enum BlockStoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the chunk pipeline (§7's `Corrupt` / `DecryptionError`
/// surfaced at the per-chunk level, before they're aggregated into
/// [`meshvault_core::MeshvaultError`] at the Supervisor boundary).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("decryption failed for chunk {0}")]
    DecryptionError(u32),

    #[error("chunk {chunk_index} corrupt: expected {expected}, got {actual}")]
    Corrupt {
        chunk_index: u32,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Crypto(#[from] meshvault_crypto::CryptoError),

    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for meshvault_core::MeshvaultError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::DecryptionError(chunk_index) => {
                meshvault_core::MeshvaultError::DecryptionError { chunk_index }
            }
            PipelineError::Corrupt {
                chunk_index,
                expected,
                actual,
            } => meshvault_core::MeshvaultError::Corrupt {
                chunk_index,
                expected,
                actual,
            },
            PipelineError::Crypto(e) => meshvault_core::MeshvaultError::Crypto(e),
            PipelineError::BlockStore(BlockStoreError::NotFound(id)) => {
                meshvault_core::MeshvaultError::not_found("blob", id)
            }
            PipelineError::BlockStore(BlockStoreError::Io(e)) => {
                meshvault_core::MeshvaultError::Io(e)
            }
            PipelineError::Io(e) => meshvault_core::MeshvaultError::Io(e),
        }
    }
}
