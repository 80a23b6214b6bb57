//! Replica Manager (§4.4): registers chunks, recovers from node failure,
//! verifies stored replicas, and rebalances toward better-scoring nodes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meshvault_blockstore::BlobStore;
use meshvault_core::{ChunkHash, FileId, ListFilesFilter, MetadataStore, NodeId, ReplicaNodeHealth, ReplicaRecord};
use meshvault_crypto::hash;
use meshvault_membership::{
    average_score, clears_rebalance_bar, needs_rebalance, select_replica_nodes, MembershipTable,
    Strategy,
};
use meshvault_transport::TransportAdapter;
use tracing::instrument;

use crate::error::{ReplicaError, Result};
use crate::locks::StripedLocks;

/// Default desired replica count for a newly registered chunk (§4.4).
pub const DEFAULT_REPLICA_COUNT: u32 = 3;
/// Retry attempts for a single replica-creation before giving up (§4.4).
pub const DEFAULT_RETRY_CAP: u32 = 3;
/// `verify()` ticker interval (§4.4).
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// How stale `LastVerified` must be before a chunk is re-verified (§4.4).
pub const DEFAULT_VERIFY_STALENESS: Duration = Duration::from_secs(30 * 60);
/// `rebalance()` ticker interval (§4.4).
pub const DEFAULT_REBALANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Per-call chunk transfer timeout, matching the Transport Adapter
/// contract's default (§4.6).
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ReplicaManagerConfig {
    pub default_replica_count: u32,
    pub retry_cap: u32,
    pub verify_staleness: Duration,
    pub placement_strategy: Strategy,
}

impl Default for ReplicaManagerConfig {
    fn default() -> Self {
        Self {
            default_replica_count: DEFAULT_REPLICA_COUNT,
            retry_cap: DEFAULT_RETRY_CAP,
            verify_staleness: DEFAULT_VERIFY_STALENESS,
            placement_strategy: Strategy::Balanced,
        }
    }
}

pub struct ReplicaManager {
    metadata: MetadataStore,
    blob_store: Arc<dyn BlobStore>,
    membership: MembershipTable,
    transport: Arc<dyn TransportAdapter>,
    locks: StripedLocks,
    config: ReplicaManagerConfig,
}

impl ReplicaManager {
    pub fn new(
        metadata: MetadataStore,
        blob_store: Arc<dyn BlobStore>,
        membership: MembershipTable,
        transport: Arc<dyn TransportAdapter>,
        config: ReplicaManagerConfig,
    ) -> Self {
        Self {
            metadata,
            blob_store,
            membership,
            transport,
            locks: StripedLocks::default(),
            config,
        }
    }

    /// Initialize a Replica record for a newly-ingested chunk (§4.4).
    #[instrument(skip(self, initial_nodes))]
    pub async fn register(
        &self,
        chunk_hash: ChunkHash,
        _file_id: FileId,
        initial_nodes: Vec<NodeId>,
    ) -> Result<()> {
        let _guard = self.locks.lock(&chunk_hash).await;
        let replica = ReplicaRecord::new(chunk_hash, self.config.default_replica_count, initial_nodes);
        self.metadata.put_replica(&replica).await?;
        Ok(())
    }

    /// Remove a chunk's Replica record; request Blob Store deletion once
    /// no file still references the chunk (§3: "removed only when
    /// RefCount=0 AND no replica targets it").
    #[instrument(skip(self))]
    pub async fn unregister(&self, chunk_hash: ChunkHash) -> Result<()> {
        let _guard = self.locks.lock(&chunk_hash).await;
        self.metadata.delete_replica(&chunk_hash).await?;

        if self.reference_count(&chunk_hash).await? == 0 {
            if let Some(chunk) = self.metadata.get_chunk(&chunk_hash).await? {
                self.blob_store.delete(&chunk.stored_key).await.ok();
            }
        }
        Ok(())
    }

    async fn reference_count(&self, chunk_hash: &ChunkHash) -> Result<usize> {
        let files = self.metadata.list_files(&ListFilesFilter::default()).await?;
        Ok(files
            .iter()
            .filter(|f| f.chunk_hashes.contains(chunk_hash))
            .count())
    }

    /// Handle a `NodeFailure` event (§4.4): drop the node from every
    /// chunk it held, then top each one back up to its desired count.
    /// Idempotent — safe to call twice for the same node, per §5's
    /// at-least-once delivery guarantee.
    #[instrument(skip(self))]
    pub async fn on_node_failure(&self, node_id: NodeId) -> Result<()> {
        let replicas = self.metadata.list_replicas().await?;
        for replica in replicas {
            if !replica.current_nodes.contains(&node_id) {
                continue;
            }
            let chunk_hash = replica.chunk_hash;
            let _guard = self.locks.lock(&chunk_hash).await;
            if let Some(mut replica) = self.metadata.get_replica(&chunk_hash).await? {
                replica.remove_node(&node_id);
                self.metadata.put_replica(&replica).await?;
            }
            drop(_guard);
            self.ensure_desired_count(chunk_hash).await?;
        }
        Ok(())
    }

    /// Top a chunk's replica set back up to its `DesiredCount` by placing
    /// it on additional healthy nodes (§4.4).
    #[instrument(skip(self))]
    pub async fn ensure_desired_count(&self, chunk_hash: ChunkHash) -> Result<()> {
        let replica = self
            .metadata
            .get_replica(&chunk_hash)
            .await?
            .ok_or_else(|| ReplicaError::NotFound(chunk_hash.to_hex()))?;

        if replica.current_nodes.len() >= replica.desired_count as usize {
            return Ok(());
        }
        let needed = replica.desired_count as usize - replica.current_nodes.len();

        let candidates: Vec<_> = self
            .membership
            .healthy_nodes()
            .into_iter()
            .filter(|n| !replica.current_nodes.contains(&n.node_id))
            .collect();

        let selected = select_replica_nodes(&candidates, self.config.placement_strategy, needed, Utc::now());

        for node_id in selected {
            if let Err(e) = self.create_replica_on_node(chunk_hash, node_id.clone()).await {
                tracing::warn!(chunk_hash = %chunk_hash, node_id = %node_id, error = %e, "replica creation failed");
            }
        }
        Ok(())
    }

    /// Place a copy of `chunk_hash` onto `node_id`, retrying transport
    /// failures up to `retry_cap` times. Idempotent: a second attempt to
    /// place a chunk a node already holds is a no-op (§4.4).
    #[instrument(skip(self))]
    pub async fn create_replica_on_node(&self, chunk_hash: ChunkHash, node_id: NodeId) -> Result<()> {
        let chunk = self
            .metadata
            .get_chunk(&chunk_hash)
            .await?
            .ok_or_else(|| ReplicaError::NotFound(chunk_hash.to_hex()))?;

        {
            let existing = self.metadata.get_replica(&chunk_hash).await?;
            if existing
                .as_ref()
                .map(|r| r.current_nodes.contains(&node_id))
                .unwrap_or(false)
            {
                return Ok(()); // already holds it — idempotent no-op
            }
        }

        let bytes = self.blob_store.get(&chunk.stored_key).await.map_err(|e| {
            ReplicaError::Core(meshvault_core::MeshvaultError::not_found("blob", e.to_string()))
        })?;

        let mut last_err = None;
        for attempt in 1..=self.config.retry_cap {
            match self
                .transport
                .put_chunk(&node_id, &chunk.stored_key, &bytes, TRANSFER_TIMEOUT)
                .await
            {
                Ok(()) => {
                    let _guard = self.locks.lock(&chunk_hash).await;
                    let mut replica = self
                        .metadata
                        .get_replica(&chunk_hash)
                        .await?
                        .unwrap_or_else(|| ReplicaRecord::new(chunk_hash, self.config.default_replica_count, vec![]));
                    replica.add_node(node_id.clone());
                    self.metadata.put_replica(&replica).await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(chunk_hash = %chunk_hash, node_id = %node_id, attempt, cap = self.config.retry_cap, "replica put failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap().into())
    }

    /// Confirm every holding node still has a valid copy of each
    /// sufficiently-stale chunk (§4.4), demoting mismatches to
    /// `corrupted` and topping back up if the healthy count drops below
    /// `DesiredCount`.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<()> {
        let now = Utc::now();
        let replicas = self.metadata.list_replicas().await?;

        for replica in replicas {
            let stale = replica
                .last_verified
                .map(|t| now.signed_duration_since(t).num_seconds() as u64 > self.config.verify_staleness.as_secs())
                .unwrap_or(true);
            if !stale {
                continue;
            }
            self.verify_one(replica.chunk_hash).await?;
        }
        Ok(())
    }

    async fn verify_one(&self, chunk_hash: ChunkHash) -> Result<()> {
        let replica = match self.metadata.get_replica(&chunk_hash).await? {
            Some(r) => r,
            None => return Ok(()),
        };
        let chunk = match self.metadata.get_chunk(&chunk_hash).await? {
            Some(c) => c,
            None => return Ok(()),
        };

        // Fetch confirmations outside any lock — no component may hold a
        // lock across a Transport call (§5).
        let mut confirmations = Vec::with_capacity(replica.current_nodes.len());
        for node_id in &replica.current_nodes {
            let outcome = self
                .transport
                .get_chunk(node_id, &chunk.stored_key, TRANSFER_TIMEOUT)
                .await;
            let health = match outcome {
                Ok(bytes) if hash(&bytes).to_hex() == chunk.stored_key => ReplicaNodeHealth::Healthy,
                _ => ReplicaNodeHealth::Corrupted,
            };
            confirmations.push((node_id.clone(), health));
        }

        let _guard = self.locks.lock(&chunk_hash).await;
        if let Some(mut replica) = self.metadata.get_replica(&chunk_hash).await? {
            for (node_id, health) in &confirmations {
                replica.per_node_health.insert(node_id.clone(), *health);
                if *health == ReplicaNodeHealth::Corrupted {
                    tracing::warn!(chunk_hash = %chunk_hash, node_id = %node_id, "replica marked corrupted by verify");
                }
            }
            replica.last_verified = Some(Utc::now());
            let needs_more = replica.healthy_count() < replica.desired_count as usize;
            self.metadata.put_replica(&replica).await?;
            drop(_guard);
            if needs_more {
                self.ensure_desired_count(chunk_hash).await?;
            }
        }
        Ok(())
    }

    /// Mark a single node's copy of a chunk corrupted, as reported by a
    /// reader that fetched it and found the bytes didn't hash back to the
    /// expected `StoredKey` (§4.5's reassembly recovery path feeds this
    /// back here rather than duplicating verification logic).
    #[instrument(skip(self))]
    pub async fn report_corrupt_replica(&self, chunk_hash: ChunkHash, node_id: NodeId) -> Result<()> {
        let _guard = self.locks.lock(&chunk_hash).await;
        let needs_more = if let Some(mut replica) = self.metadata.get_replica(&chunk_hash).await? {
            replica.per_node_health.insert(node_id.clone(), ReplicaNodeHealth::Corrupted);
            let needs_more = replica.healthy_count() < replica.desired_count as usize;
            self.metadata.put_replica(&replica).await?;
            needs_more
        } else {
            false
        };
        drop(_guard);
        if needs_more {
            self.ensure_desired_count(chunk_hash).await?;
        }
        Ok(())
    }

    /// Walk every chunk and migrate replicas toward better-scoring nodes
    /// where the 1.2x improvement bar is cleared (§4.3, §4.4).
    #[instrument(skip(self))]
    pub async fn rebalance(&self) -> Result<()> {
        let now = Utc::now();
        let replicas = self.metadata.list_replicas().await?;

        for replica in replicas {
            let current_nodes: Vec<_> = replica
                .current_nodes
                .iter()
                .filter_map(|id| self.membership.snapshot(id))
                .collect();

            if !needs_rebalance(&current_nodes, replica.desired_count as usize) {
                continue;
            }

            let candidates: Vec<_> = self
                .membership
                .healthy_nodes()
                .into_iter()
                .filter(|n| !replica.current_nodes.contains(&n.node_id))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let proposed_ids = select_replica_nodes(
                &candidates,
                self.config.placement_strategy,
                replica.desired_count as usize,
                now,
            );
            let proposed: Vec<_> = candidates
                .into_iter()
                .filter(|n| proposed_ids.contains(&n.node_id))
                .collect();

            if !clears_rebalance_bar(&current_nodes, &proposed, self.config.placement_strategy, now) {
                continue;
            }

            tracing::info!(
                chunk_hash = %replica.chunk_hash,
                from_avg = average_score(&current_nodes, self.config.placement_strategy, now),
                to_avg = average_score(&proposed, self.config.placement_strategy, now),
                "rebalancing chunk"
            );

            for node in proposed {
                if let Err(e) = self.create_replica_on_node(replica.chunk_hash, node.node_id.clone()).await {
                    tracing::warn!(chunk_hash = %replica.chunk_hash, node_id = %node.node_id, error = %e, "rebalance placement failed");
                }
            }
        }
        Ok(())
    }
}
