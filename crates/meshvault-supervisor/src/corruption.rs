//! Bridges the Reassembler's `CorruptionReporter` callback into a concrete
//! `ReplicaManager` (§4.5: "mark that replica as corrupted"). Lives here
//! rather than in `meshvault-reassembler` so that crate never needs to
//! depend on `meshvault-replica`.

use std::sync::Arc;

use async_trait::async_trait;
use meshvault_core::{ChunkHash, NodeId};
use meshvault_reassembler::CorruptionReporter;
use meshvault_replica::ReplicaManager;

pub struct ReplicaManagerCorruptionReporter {
    manager: Arc<ReplicaManager>,
}

impl ReplicaManagerCorruptionReporter {
    pub fn new(manager: Arc<ReplicaManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CorruptionReporter for ReplicaManagerCorruptionReporter {
    async fn report_corrupt(&self, chunk_hash: ChunkHash, node_id: NodeId) {
        if let Err(e) = self.manager.report_corrupt_replica(chunk_hash, node_id.clone()).await {
            tracing::warn!(chunk_hash = %chunk_hash, node_id = %node_id, error = %e, "failed to record corrupt replica");
        }
    }
}
