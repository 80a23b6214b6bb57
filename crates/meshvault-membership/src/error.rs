//! Error types for the meshvault-membership crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MembershipError>;

#[derive(Error, Debug)]
pub enum MembershipError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
}

impl From<MembershipError> for meshvault_core::MeshvaultError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::NodeNotFound(id) => meshvault_core::MeshvaultError::not_found("node", id),
        }
    }
}
