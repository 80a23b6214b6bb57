//! Shared types for meshvault: the File/Chunk/Replica/Node data model, the
//! Metadata Store abstraction, and the top-level error taxonomy that every
//! other crate's errors fold into.

mod error;
pub mod metadata;
pub mod model;

pub use error::{MeshvaultError, Result};
pub use model::{
    validate_chunk_chain, ChunkHash, ChunkRecord, FileId, FileRecord, IsCompressed, NodeId,
    NodeRecord, NodeStatus, ReplicaNodeHealth, ReplicaRecord,
};
pub use metadata::{InMemoryKvStore, KvStore, KvWrite, ListFilesFilter, MetadataStore};
