//! Error types for the meshvault-reassembler crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReassemblyError>;

#[derive(Error, Debug)]
pub enum ReassemblyError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("chunk {0} could not be recovered from any replica")]
    UnrecoverableChunk(u32),

    #[error("decryption failed for chunk {0} on every replica — wrong password?")]
    DecryptionError(u32),

    #[error("reassembled file hash does not match FileID: expected {expected}, got {actual}")]
    FileHashMismatch { expected: String, actual: String },

    #[error("job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] meshvault_core::MeshvaultError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ReassemblyError> for meshvault_core::MeshvaultError {
    fn from(err: ReassemblyError) -> Self {
        use meshvault_core::MeshvaultError;
        match err {
            ReassemblyError::FileNotFound(id) => MeshvaultError::not_found("file", id),
            ReassemblyError::UnrecoverableChunk(index) => MeshvaultError::UnrecoverableChunk { chunk_index: index },
            ReassemblyError::DecryptionError(index) => MeshvaultError::DecryptionError { chunk_index: index },
            ReassemblyError::FileHashMismatch { expected, actual } => {
                MeshvaultError::Corrupt {
                    chunk_index: u32::MAX,
                    expected,
                    actual,
                }
            }
            ReassemblyError::Cancelled => MeshvaultError::Cancelled,
            ReassemblyError::Core(e) => e,
            ReassemblyError::Io(e) => e.into(),
        }
    }
}
