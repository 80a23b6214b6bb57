//! The Supervisor (§2 item 9, §4 "Supervisor" expansion): wires every
//! component together and exposes the §6 Public API as plain async
//! methods. No HTTP framework lives here — these methods are the natural
//! handlers an HTTP layer would call, but pulling one in is an explicit
//! non-goal.

use std::path::Path;
use std::sync::Arc;

use meshvault_blockstore::{BlobStore, ChunkPipeline, FilesystemBlobStore, MemoryBlobStore};
use meshvault_core::{
    FileId, FileRecord, InMemoryKvStore, ListFilesFilter, MetadataStore, NodeId, ReplicaRecord,
};
use meshvault_crypto::DekKey;
use meshvault_membership::{spawn_heartbeat_ticker, MembershipTable};
use meshvault_reassembler::{JobHandle, Reassembler};
use meshvault_replica::{spawn_rebalance_ticker, spawn_verify_ticker, ReplicaManager, ReplicaManagerConfig};
use meshvault_transport::{LoopbackTransport, TransportAdapter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::SupervisorConfig;
use crate::corruption::ReplicaManagerCorruptionReporter;
use crate::error::Result;
use crate::stats::SystemStats;

/// Fixed per-store salt for [`DekKey::derive`]. Per that function's own
/// guidance, the salt isn't secret and shouldn't vary per file — it only
/// needs to be stable for the life of one store so the same password
/// always re-derives the same chunk-encryption key.
const STORE_SALT: &[u8] = b"meshvault-supervisor-store-salt-v1";

/// Owns every component instance and the background tasks that drive
/// them. Dropping a `Supervisor` does not stop its tickers — call
/// [`Supervisor::shutdown`] explicitly (§9 Design Notes: "never as
/// free-running loops without a stop signal").
pub struct Supervisor {
    config: SupervisorConfig,
    metadata: MetadataStore,
    blob_store: Arc<dyn BlobStore>,
    membership: MembershipTable,
    replica_manager: Arc<ReplicaManager>,
    pipeline: ChunkPipeline,
    reassembler: Reassembler,
    shutdown: CancellationToken,
    ticker_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Supervisor {
    /// Construct every component and start the background tickers
    /// (heartbeat, verify, rebalance, and the node-failure forwarder).
    #[instrument(skip(config))]
    pub async fn new(config: SupervisorConfig) -> Result<Self> {
        let metadata = MetadataStore::new(Arc::new(InMemoryKvStore::new()));
        let blob_store: Arc<dyn BlobStore> = if config.memory_store {
            Arc::new(MemoryBlobStore::new())
        } else {
            Arc::new(FilesystemBlobStore::open(&config.data_dir).await?)
        };
        let transport: Arc<dyn TransportAdapter> = Arc::new(LoopbackTransport::new());

        let (failure_tx, mut failure_rx) = mpsc::channel(256);
        let membership = MembershipTable::new(failure_tx);

        let replica_config = ReplicaManagerConfig {
            default_replica_count: config.default_replica_count,
            retry_cap: config.retry_cap,
            verify_staleness: config.verify_staleness(),
            placement_strategy: config.placement_strategy,
        };
        let replica_manager = Arc::new(ReplicaManager::new(
            metadata.clone(),
            blob_store.clone(),
            membership.clone(),
            transport.clone(),
            replica_config,
        ));

        let pipeline = ChunkPipeline::new(blob_store.clone());

        let corruption = Arc::new(ReplicaManagerCorruptionReporter::new(replica_manager.clone()));
        let reassembler = Reassembler::new(metadata.clone(), blob_store.clone(), transport.clone(), corruption)
            .with_max_fetchers(config.reassembly_max_fetchers)
            .with_history_cap(config.reassembly_history_cap);

        let shutdown = CancellationToken::new();
        let mut ticker_handles = Vec::new();

        ticker_handles.push(spawn_heartbeat_ticker(
            membership.clone(),
            transport.clone(),
            config.heartbeat_interval(),
            config.node_timeout(),
            shutdown.clone(),
        ));
        ticker_handles.push(spawn_verify_ticker(
            replica_manager.clone(),
            config.verify_interval(),
            shutdown.clone(),
        ));
        ticker_handles.push(spawn_rebalance_ticker(
            replica_manager.clone(),
            config.rebalance_interval(),
            shutdown.clone(),
        ));

        let failure_handler = replica_manager.clone();
        let failure_shutdown = shutdown.clone();
        ticker_handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = failure_shutdown.cancelled() => break,
                    event = failure_rx.recv() => {
                        match event {
                            Some(event) => {
                                if let Err(e) = failure_handler.on_node_failure(event.node_id.clone()).await {
                                    tracing::error!(node_id = %event.node_id, error = %e, "node-failure recovery failed");
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        }));

        Ok(Self {
            config,
            metadata,
            blob_store,
            membership,
            replica_manager,
            pipeline,
            reassembler,
            shutdown,
            ticker_handles,
        })
    }

    /// Register a peer on first observation (§3). Not part of the §6
    /// Public API proper, but every other operation assumes at least one
    /// node is known to Membership before placement can succeed.
    pub fn register_node(&self, node_id: NodeId, address: impl Into<String>, port: u16) {
        self.membership.register(node_id, address.into(), port);
    }

    /// Read back a node's liveness, for admin tooling and tests.
    pub fn membership(&self) -> &MembershipTable {
        &self.membership
    }

    /// `IngestFile(path, password) -> FileID` (§6): reads the whole file
    /// into memory, runs the Chunk Pipeline, persists the result, and
    /// registers each distinct chunk's Replica record before handing
    /// placement to the Replica Manager.
    #[instrument(skip(self, password))]
    pub async fn ingest_file(&self, path: &Path, owner_id: &str, password: &[u8]) -> Result<FileId> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let plaintext = tokio::fs::read(path)
            .await
            .map_err(|source| crate::error::SupervisorError::InputFile {
                path: path.to_string_lossy().into_owned(),
                source,
            })?;

        let key = DekKey::derive(password, STORE_SALT)?;
        let out = self
            .pipeline
            .ingest(&name, owner_id, &plaintext, &key, self.config.chunk_size)
            .await?;

        self.metadata.put_file_batch(&out.file, &out.chunks).await?;

        let mut registered = std::collections::HashSet::new();
        for chunk in &out.chunks {
            if !registered.insert(chunk.chunk_hash) {
                continue; // duplicate chunk within this file — one Replica record per distinct hash
            }
            self.replica_manager
                .register(chunk.chunk_hash, out.file.file_id, vec![])
                .await?;
            self.replica_manager.ensure_desired_count(chunk.chunk_hash).await?;
        }

        Ok(out.file.file_id)
    }

    /// `ReassembleFile(file_id, output_path, password) -> JobHandle` (§6).
    #[instrument(skip(self, password))]
    pub fn reassemble_file(&self, file_id: FileId, output_path: impl Into<std::path::PathBuf>, password: &[u8]) -> Result<JobHandle> {
        let key = DekKey::derive(password, STORE_SALT)?;
        Ok(self.reassembler.start_job(file_id, output_path.into(), key))
    }

    /// `GetFile(file_id) -> FileRecord | not_found` (§6).
    pub async fn get_file(&self, file_id: &FileId) -> Result<Option<FileRecord>> {
        Ok(self.metadata.get_file_by_id(file_id).await?)
    }

    /// `ListFiles(filter) -> [FileRecord]` (§6).
    pub async fn list_files(&self, filter: &ListFilesFilter) -> Result<Vec<FileRecord>> {
        Ok(self.metadata.list_files(filter).await?)
    }

    /// `GetReplicaInfo(chunk_hash) -> ReplicaRecord` (§6).
    pub async fn get_replica_info(&self, chunk_hash: &meshvault_core::ChunkHash) -> Result<Option<ReplicaRecord>> {
        Ok(self.metadata.get_replica(chunk_hash).await?)
    }

    /// `TriggerRebalance()` (§6): admin-only, enqueues a full sweep
    /// immediately rather than waiting for the next ticker interval.
    #[instrument(skip(self))]
    pub async fn trigger_rebalance(&self) -> Result<()> {
        self.replica_manager.rebalance().await?;
        Ok(())
    }

    /// `GetSystemStats()` (§6).
    pub async fn get_system_stats(&self) -> Result<SystemStats> {
        let mut stats = SystemStats::default();
        for node in self.membership.snapshot_all() {
            stats.record_node(node.status, node.capacity, node.used);
        }

        let replicas = self.metadata.list_replicas().await?;
        stats.chunks_total = replicas.len();
        stats.under_replicated = replicas
            .iter()
            .filter(|r| r.current_nodes.len() < r.desired_count as usize)
            .count();

        Ok(stats)
    }

    pub fn blob_store(&self) -> Arc<dyn BlobStore> {
        self.blob_store.clone()
    }

    pub fn metadata_store(&self) -> MetadataStore {
        self.metadata.clone()
    }

    /// Stop every background ticker and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.ticker_handles {
            let _ = handle.await;
        }
    }
}
