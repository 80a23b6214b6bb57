//! Error types for the meshvault-transport crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("node {0} unreachable")]
    Unreachable(String),

    #[error("call to node {node} timed out after {timeout_secs}s")]
    Timeout { node: String, timeout_secs: u64 },

    #[error("blob not found on node {node}: {key}")]
    NotFound { node: String, key: String },
}

impl From<TransportError> for meshvault_core::MeshvaultError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unreachable(node) | TransportError::Timeout { node, .. } => {
                meshvault_core::MeshvaultError::NodeUnreachable(node)
            }
            TransportError::NotFound { key, .. } => {
                meshvault_core::MeshvaultError::not_found("blob", key)
            }
        }
    }
}
