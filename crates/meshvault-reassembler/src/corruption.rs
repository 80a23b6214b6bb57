//! Feedback hook into the Replica Manager (§4.5: "mark that replica as
//! corrupted"). The reassembler has no direct handle on a
//! `ReplicaManager` — wiring one in here would pull a whole extra crate
//! dependency graph into something that only needs to report one fact.
//! The Supervisor wires a concrete reporter in at construction time.

use async_trait::async_trait;
use meshvault_core::{ChunkHash, NodeId};

#[async_trait]
pub trait CorruptionReporter: Send + Sync {
    async fn report_corrupt(&self, chunk_hash: ChunkHash, node_id: NodeId);
}

/// Used by tests and standalone reassembler construction where no Replica
/// Manager is wired in.
pub struct NoopCorruptionReporter;

#[async_trait]
impl CorruptionReporter for NoopCorruptionReporter {
    async fn report_corrupt(&self, chunk_hash: ChunkHash, node_id: NodeId) {
        tracing::warn!(chunk_hash = %chunk_hash, node_id = %node_id, "corrupt replica observed, no reporter wired");
    }
}
