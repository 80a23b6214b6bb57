//! Error types for the meshvault-replica crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplicaError>;

#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("replica record not found for chunk {0}")]
    NotFound(String),

    #[error("insufficient replicas for chunk {chunk_hash}: have {have}, need {need}")]
    InsufficientReplicas {
        chunk_hash: String,
        have: usize,
        need: usize,
    },

    #[error(transparent)]
    Core(#[from] meshvault_core::MeshvaultError),

    #[error(transparent)]
    Transport(#[from] meshvault_transport::TransportError),
}

impl From<ReplicaError> for meshvault_core::MeshvaultError {
    fn from(err: ReplicaError) -> Self {
        match err {
            ReplicaError::NotFound(id) => meshvault_core::MeshvaultError::not_found("replica", id),
            ReplicaError::InsufficientReplicas {
                chunk_hash,
                have,
                need,
            } => meshvault_core::MeshvaultError::InsufficientReplicas {
                chunk_hash,
                have,
                need,
            },
            ReplicaError::Core(e) => e,
            ReplicaError::Transport(e) => e.into(),
        }
    }
}
