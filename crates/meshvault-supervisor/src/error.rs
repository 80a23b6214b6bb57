//! Supervisor-level errors: mostly a thin pass-through of
//! `meshvault_core::MeshvaultError`, plus a couple of wiring-only failures
//! that don't belong to any single component.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Core(#[from] meshvault_core::MeshvaultError),

    #[error(transparent)]
    Pipeline(#[from] meshvault_blockstore::PipelineError),

    #[error(transparent)]
    BlockStore(#[from] meshvault_blockstore::BlockStoreError),

    #[error(transparent)]
    Replica(#[from] meshvault_replica::ReplicaError),

    #[error(transparent)]
    Reassembly(#[from] meshvault_reassembler::ReassemblyError),

    #[error(transparent)]
    Crypto(#[from] meshvault_crypto::CryptoError),

    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
