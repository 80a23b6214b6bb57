//! Replica Manager: registration, node-failure recovery, verification and
//! rebalance, all serialized per-chunk via a striped lock table.

mod error;
mod locks;
mod manager;
mod tickers;

pub use error::{ReplicaError, Result};
pub use locks::{StripedLocks, DEFAULT_STRIPE_COUNT};
pub use manager::{
    ReplicaManager, ReplicaManagerConfig, DEFAULT_REBALANCE_INTERVAL, DEFAULT_REPLICA_COUNT,
    DEFAULT_RETRY_CAP, DEFAULT_VERIFY_INTERVAL, DEFAULT_VERIFY_STALENESS,
};
pub use tickers::{spawn_rebalance_ticker, spawn_verify_ticker};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshvault_blockstore::{BlobStore, MemoryBlobStore};
    use meshvault_core::{ChunkRecord, FileRecord, InMemoryKvStore, MetadataStore, NodeId};
    use meshvault_crypto::hash;
    use meshvault_membership::MembershipTable;
    use meshvault_transport::{LoopbackTransport, NodeBehavior, TransportAdapter};
    use std::sync::Arc;
    use std::time::Duration;

    /// Seed a one-chunk file directly into `metadata`/`blob_store`,
    /// bypassing the Chunk Pipeline since this crate only needs a chunk
    /// to already exist, not to re-derive ingest from plaintext.
    async fn seed_chunk(
        metadata: &MetadataStore,
        blob_store: &Arc<dyn BlobStore>,
    ) -> meshvault_core::ChunkHash {
        let chunk_hash = hash(b"chunk-payload");
        let stored_key = blob_store.put(b"ciphertext-bytes").await.unwrap();
        let chunk = ChunkRecord {
            chunk_hash,
            file_id: hash(b"file"),
            index: 0,
            offset: 0,
            prev_index: -1,
            next_index: -1,
            total_chunks: 1,
            stored_key,
            stored_size: 16,
            is_compressed: false,
        };
        let file = FileRecord {
            file_id: chunk.file_id,
            name: "f.bin".into(),
            size: 16,
            chunk_size: 1024,
            chunk_count: 1,
            chunk_hashes: vec![chunk_hash],
            created_at: Utc::now(),
            owner_id: "owner".into(),
            tombstoned: false,
        };
        metadata.put_file_batch(&file, &[chunk]).await.unwrap();
        chunk_hash
    }

    fn three_node_membership() -> MembershipTable {
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        MembershipTable::new(tx)
    }

    async fn registered_three_nodes(membership: &MembershipTable) {
        for (id, addr) in [("n1", "10.0.0.1"), ("n2", "10.0.0.2"), ("n3", "10.0.0.3")] {
            membership.register(NodeId::from(id), addr.to_string(), 9000);
            membership.record_probe_result(&NodeId::from(id), true, 0.01).await;
        }
    }

    #[tokio::test]
    async fn register_then_ensure_desired_count_places_additional_replicas() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;

        let membership = three_node_membership();
        registered_three_nodes(&membership).await;
        let transport = Arc::new(LoopbackTransport::new());

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store,
            membership,
            transport as Arc<dyn TransportAdapter>,
            ReplicaManagerConfig::default(),
        );

        manager
            .register(chunk_hash, hash(b"file"), vec![NodeId::from("n1")])
            .await
            .unwrap();
        manager.ensure_desired_count(chunk_hash).await.unwrap();

        let replica = metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
        assert_eq!(replica.current_nodes.len(), 3, "should top up to the default desired count");
    }

    #[tokio::test]
    async fn unregister_deletes_blob_when_unreferenced() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;
        let stored_key = metadata.get_chunk(&chunk_hash).await.unwrap().unwrap().stored_key;

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store.clone(),
            three_node_membership(),
            Arc::new(LoopbackTransport::new()),
            ReplicaManagerConfig::default(),
        );
        manager.register(chunk_hash, hash(b"file"), vec![]).await.unwrap();

        manager.unregister(chunk_hash).await.unwrap();
        assert!(metadata.get_replica(&chunk_hash).await.unwrap().is_none());
        assert!(!blob_store.contains(&stored_key).await.unwrap());
    }

    #[tokio::test]
    async fn unregister_keeps_blob_while_a_file_still_references_the_chunk() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;
        let stored_key = metadata.get_chunk(&chunk_hash).await.unwrap().unwrap().stored_key;

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store.clone(),
            three_node_membership(),
            Arc::new(LoopbackTransport::new()),
            ReplicaManagerConfig::default(),
        );
        manager.register(chunk_hash, hash(b"file"), vec![]).await.unwrap();

        // seed_chunk already wrote a FileRecord referencing chunk_hash, so
        // unregister must not delete the still-referenced blob.
        manager.unregister(chunk_hash).await.unwrap();
        assert!(blob_store.contains(&stored_key).await.unwrap());
    }

    #[tokio::test]
    async fn node_failure_recovery_restores_replica_count() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;

        let membership = three_node_membership();
        registered_three_nodes(&membership).await;
        let transport = Arc::new(LoopbackTransport::new());

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store,
            membership,
            transport,
            ReplicaManagerConfig::default(),
        );

        manager
            .register(chunk_hash, hash(b"file"), vec![NodeId::from("n1"), NodeId::from("n2")])
            .await
            .unwrap();

        manager.on_node_failure(NodeId::from("n1")).await.unwrap();

        let replica = metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
        assert!(!replica.current_nodes.contains(&NodeId::from("n1")));
        assert!(replica.current_nodes.len() <= 3);
        assert!(
            replica.current_nodes.contains(&NodeId::from("n3")),
            "the only remaining healthy candidate should have been added"
        );
    }

    #[tokio::test]
    async fn unreachable_node_during_placement_surfaces_error_after_retry_cap() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;

        let membership = three_node_membership();
        membership.register(NodeId::from("n1"), "10.0.0.1".into(), 9000);
        membership.record_probe_result(&NodeId::from("n1"), true, 0.01).await;

        let transport = Arc::new(LoopbackTransport::new());
        transport.set_behavior(
            NodeId::from("n1"),
            NodeBehavior {
                latency: Duration::from_millis(1),
                reachable: false,
            },
        );

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store,
            membership,
            transport,
            ReplicaManagerConfig {
                retry_cap: 1,
                ..ReplicaManagerConfig::default()
            },
        );

        manager.register(chunk_hash, hash(b"file"), vec![]).await.unwrap();
        let result = manager.create_replica_on_node(chunk_hash, NodeId::from("n1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn verify_marks_tampered_replica_corrupted() {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let chunk_hash = seed_chunk(&metadata, &blob_store).await;
        let chunk = metadata.get_chunk(&chunk_hash).await.unwrap().unwrap();

        let membership = three_node_membership();
        registered_three_nodes(&membership).await;
        let transport = Arc::new(LoopbackTransport::new());

        // Node A holds a tampered copy — its bytes don't hash back to the
        // StoredKey the rest of the system expects.
        transport
            .put_chunk(&NodeId::from("n1"), &chunk.stored_key, b"tampered-bytes", Duration::from_secs(1))
            .await
            .unwrap();
        transport
            .put_chunk(&NodeId::from("n2"), &chunk.stored_key, b"ciphertext-bytes", Duration::from_secs(1))
            .await
            .unwrap();

        let manager = ReplicaManager::new(
            metadata.clone(),
            blob_store,
            membership,
            transport,
            ReplicaManagerConfig::default(),
        );
        manager
            .register(chunk_hash, hash(b"file"), vec![NodeId::from("n1"), NodeId::from("n2")])
            .await
            .unwrap();

        manager.verify().await.unwrap();

        let replica = metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
        assert_eq!(
            replica.per_node_health.get(&NodeId::from("n1")),
            Some(&meshvault_core::ReplicaNodeHealth::Corrupted)
        );
        assert_eq!(
            replica.per_node_health.get(&NodeId::from("n2")),
            Some(&meshvault_core::ReplicaNodeHealth::Healthy)
        );
    }
}
