//! End-to-end tests across the full crate stack: ingest through the Chunk
//! Pipeline, place replicas via the Replica Manager and Placement Policy,
//! survive a node failure, and reassemble back to the original bytes.
//! Mirrors the concrete scenarios in the specification's testable
//! properties table.

use std::sync::Arc;
use std::time::Duration;

use meshvault_blockstore::{BlobStore, ChunkPipeline, MemoryBlobStore};
use meshvault_core::{InMemoryKvStore, MetadataStore, NodeId};
use meshvault_crypto::DekKey;
use meshvault_membership::MembershipTable;
use meshvault_reassembler::{JobPhase, NoopCorruptionReporter, Reassembler};
use meshvault_replica::{ReplicaManager, ReplicaManagerConfig};
use meshvault_transport::{LoopbackTransport, NodeBehavior, TransportAdapter};
use tokio::sync::mpsc;

fn key() -> DekKey {
    DekKey::derive(b"correct horse battery staple", b"end-to-end-test-salt").unwrap()
}

struct Cluster {
    metadata: MetadataStore,
    blob_store: Arc<dyn BlobStore>,
    membership: MembershipTable,
    replica_manager: Arc<ReplicaManager>,
    transport: Arc<LoopbackTransport>,
    failure_rx: mpsc::Receiver<meshvault_membership::NodeFailureEvent>,
}

fn three_node_cluster() -> Cluster {
    let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
    let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let (failure_tx, failure_rx) = mpsc::channel(16);
    let membership = MembershipTable::new(failure_tx);
    let transport = Arc::new(LoopbackTransport::new());

    for id in ["n1", "n2", "n3"] {
        membership.register(NodeId::from(id), format!("10.0.0.{id}", id = &id[1..]), 9000);
    }

    let replica_manager = Arc::new(ReplicaManager::new(
        metadata.clone(),
        blob_store.clone(),
        membership.clone(),
        transport.clone() as Arc<dyn TransportAdapter>,
        ReplicaManagerConfig::default(),
    ));

    Cluster {
        metadata,
        blob_store,
        membership,
        replica_manager,
        transport,
        failure_rx,
    }
}

async fn mark_all_online(cluster: &Cluster) {
    for id in ["n1", "n2", "n3"] {
        cluster.membership.record_probe_result(&NodeId::from(id), true, 0.01).await;
    }
}

#[tokio::test]
async fn ingest_replicate_and_reassemble_round_trips() {
    let cluster = three_node_cluster();
    mark_all_online(&cluster).await;

    let pipeline = ChunkPipeline::new(cluster.blob_store.clone());
    let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(200);
    let out = pipeline
        .ingest("fox.bin", "owner-1", &plaintext, &key(), 4096)
        .await
        .unwrap();
    cluster.metadata.put_file_batch(&out.file, &out.chunks).await.unwrap();

    let mut registered = std::collections::HashSet::new();
    for chunk in &out.chunks {
        if !registered.insert(chunk.chunk_hash) {
            continue;
        }
        cluster
            .replica_manager
            .register(chunk.chunk_hash, out.file.file_id, vec![])
            .await
            .unwrap();
        cluster
            .replica_manager
            .ensure_desired_count(chunk.chunk_hash)
            .await
            .unwrap();
    }

    for chunk_hash in registered {
        let replica = cluster.metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
        assert_eq!(replica.current_nodes.len(), 3, "every chunk should reach the default replica count");
    }

    let reassembler = Reassembler::new(
        cluster.metadata.clone(),
        cluster.blob_store.clone(),
        cluster.transport.clone() as Arc<dyn TransportAdapter>,
        Arc::new(NoopCorruptionReporter),
    );
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("fox.out");
    let handle = reassembler.start_job(out.file.file_id, out_path.clone(), key());

    let progress = wait_for_terminal(&handle).await;
    assert_eq!(progress.phase, JobPhase::Completed);
    assert_eq!(tokio::fs::read(&out_path).await.unwrap(), plaintext);
}

#[tokio::test]
async fn node_failure_is_recovered_within_one_cycle_and_reassembly_still_succeeds() {
    let mut cluster = three_node_cluster();
    mark_all_online(&cluster).await;

    let pipeline = ChunkPipeline::new(cluster.blob_store.clone());
    let plaintext = b"resilience test payload".repeat(500);
    let out = pipeline
        .ingest("resilience.bin", "owner-1", &plaintext, &key(), 8192)
        .await
        .unwrap();
    cluster.metadata.put_file_batch(&out.file, &out.chunks).await.unwrap();

    let mut chunk_hashes = std::collections::HashSet::new();
    for chunk in &out.chunks {
        if !chunk_hashes.insert(chunk.chunk_hash) {
            continue;
        }
        cluster
            .replica_manager
            .register(chunk.chunk_hash, out.file.file_id, vec![])
            .await
            .unwrap();
        cluster
            .replica_manager
            .ensure_desired_count(chunk.chunk_hash)
            .await
            .unwrap();
    }

    // Kill n1: three consecutive failed probes crosses the failure threshold.
    for _ in 0..3 {
        cluster.membership.record_probe_result(&NodeId::from("n1"), false, 0.0).await;
    }
    let event = cluster.failure_rx.try_recv().expect("expected a NodeFailureEvent for n1");
    assert_eq!(event.node_id, NodeId::from("n1"));

    cluster.replica_manager.on_node_failure(event.node_id).await.unwrap();

    for chunk_hash in &chunk_hashes {
        let replica = cluster.metadata.get_replica(chunk_hash).await.unwrap().unwrap();
        assert!(!replica.current_nodes.contains(&NodeId::from("n1")));
        assert_eq!(
            replica.current_nodes.len(),
            3,
            "losing a node should trigger exactly enough new placements to restore the desired count"
        );
    }

    let reassembler = Reassembler::new(
        cluster.metadata.clone(),
        cluster.blob_store.clone(),
        cluster.transport.clone() as Arc<dyn TransportAdapter>,
        Arc::new(NoopCorruptionReporter),
    );
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("resilience.out");
    let handle = reassembler.start_job(out.file.file_id, out_path.clone(), key());
    let progress = wait_for_terminal(&handle).await;
    assert_eq!(progress.phase, JobPhase::Completed);
    assert_eq!(tokio::fs::read(&out_path).await.unwrap(), plaintext);
}

#[tokio::test]
async fn corrupted_replica_is_quarantined_and_reader_falls_back_to_a_good_copy() {
    let cluster = three_node_cluster();
    mark_all_online(&cluster).await;

    let pipeline = ChunkPipeline::new(cluster.blob_store.clone());
    let plaintext = b"single chunk of data that will be corrupted on one node";
    let out = pipeline.ingest("c.bin", "owner-1", plaintext, &key(), 1_048_576).await.unwrap();
    cluster.metadata.put_file_batch(&out.file, &out.chunks).await.unwrap();

    let chunk_hash = out.chunks[0].chunk_hash;
    cluster.replica_manager.register(chunk_hash, out.file.file_id, vec![]).await.unwrap();
    cluster.replica_manager.ensure_desired_count(chunk_hash).await.unwrap();

    let replica = cluster.metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
    let tampered_node = replica.current_nodes[0].clone();
    let good_nodes: Vec<_> = replica.current_nodes[1..].to_vec();

    // Corrupt the ciphertext held by `tampered_node` only.
    let chunk = cluster.metadata.get_chunk(&chunk_hash).await.unwrap().unwrap();
    cluster
        .transport
        .put_chunk(&tampered_node, &chunk.stored_key, b"not the real ciphertext at all", Duration::from_secs(1))
        .await
        .unwrap();

    cluster.replica_manager.verify().await.unwrap();

    let replica = cluster.metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
    assert_eq!(
        replica.per_node_health.get(&tampered_node),
        Some(&meshvault_core::ReplicaNodeHealth::Corrupted)
    );
    for node in &good_nodes {
        assert_ne!(replica.per_node_health.get(node), Some(&meshvault_core::ReplicaNodeHealth::Corrupted));
    }

    // Reassembly must still recover the chunk from an uncorrupted replica
    // even though the local Blob Store copy is absent (reassembler falls
    // back to peers in `current_nodes` order, which may try the tampered
    // node first).
    cluster.blob_store.delete(&chunk.stored_key).await.unwrap();
    let reassembler = Reassembler::new(
        cluster.metadata.clone(),
        cluster.blob_store.clone(),
        cluster.transport.clone() as Arc<dyn TransportAdapter>,
        Arc::new(NoopCorruptionReporter),
    );
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("c.out");
    let handle = reassembler.start_job(out.file.file_id, out_path.clone(), key());
    let progress = wait_for_terminal(&handle).await;
    assert_eq!(progress.phase, JobPhase::Completed);
    assert_eq!(tokio::fs::read(&out_path).await.unwrap(), plaintext);
}

#[tokio::test]
async fn unreachable_node_does_not_block_placement_on_the_remaining_healthy_nodes() {
    let cluster = three_node_cluster();
    mark_all_online(&cluster).await;
    cluster.transport.set_behavior(
        NodeId::from("n2"),
        NodeBehavior {
            latency: Duration::from_millis(1),
            reachable: false,
        },
    );

    let pipeline = ChunkPipeline::new(cluster.blob_store.clone());
    let out = pipeline.ingest("u.bin", "owner-1", b"payload", &key(), 1024).await.unwrap();
    cluster.metadata.put_file_batch(&out.file, &out.chunks).await.unwrap();

    let chunk_hash = out.chunks[0].chunk_hash;
    cluster.replica_manager.register(chunk_hash, out.file.file_id, vec![]).await.unwrap();
    cluster.replica_manager.ensure_desired_count(chunk_hash).await.unwrap();

    let replica = cluster.metadata.get_replica(&chunk_hash).await.unwrap().unwrap();
    assert!(!replica.current_nodes.contains(&NodeId::from("n2")));
    assert_eq!(replica.current_nodes.len(), 2, "only the two reachable nodes should hold a copy");
}

async fn wait_for_terminal(handle: &meshvault_reassembler::JobHandle) -> meshvault_reassembler::ReassemblyProgress {
    for _ in 0..200 {
        let progress = handle.progress();
        if progress.phase.is_terminal() {
            return progress;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached a terminal state", handle.job_id());
}
