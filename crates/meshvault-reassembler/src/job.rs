//! Reassembly job (§4.5): fan out bounded parallel chunk fetchers, assemble
//! plaintext in order, verify against `FileID`, publish progress, and keep
//! a bounded history of finished jobs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use meshvault_blockstore::decrypt_and_verify;
use meshvault_blockstore::BlobStore;
use meshvault_core::{validate_chunk_chain, ChunkRecord, FileId, MetadataStore};
use meshvault_crypto::{hash, DekKey};
use meshvault_transport::{TransportAdapter, DEFAULT_TRANSFER_TIMEOUT};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::corruption::CorruptionReporter;
use crate::error::{ReassemblyError, Result};
use crate::progress::{JobPhase, ReassemblyProgress};

/// Default bound on concurrent chunk fetchers for one job (§4.5).
pub const DEFAULT_MAX_FETCHERS: usize = 16;
/// Default bounded job history length (§4.5).
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// One entry in the bounded job history.
#[derive(Clone, Debug)]
pub struct JobSummary {
    pub job_id: String,
    pub file_id: FileId,
    pub final_phase: JobPhase,
    pub finished_at: DateTime<Utc>,
}

/// Handle to a running or finished job: cheap progress polling and
/// cooperative cancellation, matching §6's `JobHandle` contract.
#[derive(Clone)]
pub struct JobHandle {
    job_id: String,
    file_id: FileId,
    status_rx: watch::Receiver<ReassemblyProgress>,
    cancel_token: CancellationToken,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Current progress snapshot. Never blocks — reads the last value
    /// published by the job task.
    pub fn progress(&self) -> ReassemblyProgress {
        self.status_rx.borrow().clone()
    }

    /// Request cooperative cancellation. The job checks this at fetch and
    /// write boundaries; it does not abort in-flight work mid-operation.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

pub struct Reassembler {
    metadata: MetadataStore,
    blob_store: Arc<dyn BlobStore>,
    transport: Arc<dyn TransportAdapter>,
    corruption: Arc<dyn CorruptionReporter>,
    history: Arc<Mutex<VecDeque<JobSummary>>>,
    history_cap: usize,
    max_fetchers: usize,
}

impl Reassembler {
    pub fn new(
        metadata: MetadataStore,
        blob_store: Arc<dyn BlobStore>,
        transport: Arc<dyn TransportAdapter>,
        corruption: Arc<dyn CorruptionReporter>,
    ) -> Self {
        Self {
            metadata,
            blob_store,
            transport,
            corruption,
            history: Arc::new(Mutex::new(VecDeque::new())),
            history_cap: DEFAULT_HISTORY_CAP,
            max_fetchers: DEFAULT_MAX_FETCHERS,
        }
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap.max(1);
        self
    }

    pub fn with_max_fetchers(mut self, max_fetchers: usize) -> Self {
        self.max_fetchers = max_fetchers.max(1);
        self
    }

    pub fn recent_jobs(&self) -> Vec<JobSummary> {
        self.history.lock().iter().cloned().collect()
    }

    /// Start an asynchronous reassembly job (§6: `ReassembleFile`). Returns
    /// immediately with a handle; the work runs on a spawned task.
    #[instrument(skip(self, key), fields(file_id = %file_id))]
    pub fn start_job(&self, file_id: FileId, output_path: PathBuf, key: DekKey) -> JobHandle {
        let job_id = format!("job-{}-{:x}", Utc::now().timestamp_millis(), file_id.as_bytes()[0]);
        let (status_tx, status_rx) = watch::channel(ReassemblyProgress::pending());
        let cancel_token = CancellationToken::new();

        let handle = JobHandle {
            job_id: job_id.clone(),
            file_id,
            status_rx,
            cancel_token: cancel_token.clone(),
        };

        let ctx = JobContext {
            metadata: self.metadata.clone(),
            blob_store: self.blob_store.clone(),
            transport: self.transport.clone(),
            corruption: self.corruption.clone(),
            max_fetchers: self.max_fetchers,
        };
        let history = self.history.clone();
        let history_cap = self.history_cap;

        tokio::spawn(async move {
            let outcome = run_job(&ctx, file_id, &output_path, &key, &status_tx, &cancel_token).await;
            let final_phase = match &outcome {
                Ok(()) => JobPhase::Completed,
                Err(ReassemblyError::Cancelled) => JobPhase::Cancelled,
                Err(e) => {
                    let _ = status_tx.send(ReassemblyProgress::failed(e.to_string()));
                    JobPhase::Failed
                }
            };
            if let Err(e) = &outcome {
                tracing::warn!(job_id = %job_id, error = %e, "reassembly job did not complete");
            }

            let mut history = history.lock();
            if history.len() >= history_cap {
                history.pop_front();
            }
            history.push_back(JobSummary {
                job_id,
                file_id,
                final_phase,
                finished_at: Utc::now(),
            });
        });

        handle
    }
}

/// Collaborators a running job needs; split out of `Reassembler` so it can
/// be moved into the spawned task without cloning the whole struct.
struct JobContext {
    metadata: MetadataStore,
    blob_store: Arc<dyn BlobStore>,
    transport: Arc<dyn TransportAdapter>,
    corruption: Arc<dyn CorruptionReporter>,
    max_fetchers: usize,
}

async fn run_job(
    ctx: &JobContext,
    file_id: FileId,
    output_path: &Path,
    key: &DekKey,
    status_tx: &watch::Sender<ReassemblyProgress>,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let file = ctx
        .metadata
        .get_file_by_id(&file_id)
        .await?
        .ok_or_else(|| ReassemblyError::FileNotFound(file_id.to_hex()))?;

    let mut chunks = Vec::with_capacity(file.chunk_hashes.len());
    for chunk_hash in &file.chunk_hashes {
        let chunk = ctx
            .metadata
            .get_chunk(chunk_hash)
            .await?
            .ok_or_else(|| ReassemblyError::FileNotFound(file_id.to_hex()))?;
        chunks.push(chunk);
    }
    validate_chunk_chain(&file.file_id, &chunks)?;

    let _ = status_tx.send(ReassemblyProgress::downloading(0.0));

    let total = chunks.len().max(1);
    let n_fetchers = ctx.max_fetchers.min(chunks.len().max(1));
    let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut results: Vec<Option<Vec<u8>>> = vec![None; chunks.len()];
    let mut stream = stream::iter(chunks.into_iter().enumerate())
        .map(|(i, chunk)| {
            let ctx_metadata = ctx.metadata.clone();
            let ctx_blob_store = ctx.blob_store.clone();
            let ctx_transport = ctx.transport.clone();
            let ctx_corruption = ctx.corruption.clone();
            let key = key.clone();
            let done = done.clone();
            async move {
                let outcome = fetch_one_chunk(
                    &chunk,
                    &ctx_metadata,
                    &ctx_blob_store,
                    &ctx_transport,
                    &ctx_corruption,
                    &key,
                )
                .await;
                done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                (i, outcome)
            }
        })
        .buffer_unordered(n_fetchers);

    let mut first_error = None;
    while let Some((i, outcome)) = stream.next().await {
        let fraction = done.load(std::sync::atomic::Ordering::SeqCst) as f64 / total as f64;
        let _ = status_tx.send(ReassemblyProgress::downloading(fraction));

        if cancel_token.is_cancelled() {
            continue; // drain remaining in-flight fetches; their results are discarded
        }
        match outcome {
            Ok(bytes) => results[i] = Some(bytes),
            Err(e) => first_error.get_or_insert(e),
        }
    }

    if cancel_token.is_cancelled() {
        let _ = status_tx.send(ReassemblyProgress::cancelled());
        return Err(ReassemblyError::Cancelled);
    }
    if let Some(e) = first_error {
        let _ = status_tx.send(ReassemblyProgress::failed(e.to_string()));
        return Err(e);
    }

    // Assembling (§4.5 step 4): chunks are already ordered by index since
    // we iterated `file.chunk_hashes` in order and wrote into `results` at
    // the matching position.
    let mut plaintext = Vec::with_capacity(file.size as usize);
    for (i, chunk) in results.into_iter().enumerate() {
        if cancel_token.is_cancelled() {
            let _ = status_tx.send(ReassemblyProgress::cancelled());
            return Err(ReassemblyError::Cancelled);
        }
        let bytes = chunk.expect("every chunk index was fetched or the job already returned an error");
        plaintext.extend_from_slice(&bytes);
        let _ = status_tx.send(ReassemblyProgress::assembling((i + 1) as f64 / total as f64));
    }

    let _ = status_tx.send(ReassemblyProgress::verifying());
    let actual = hash(&plaintext);
    if actual != file.file_id {
        return Err(ReassemblyError::FileHashMismatch {
            expected: file.file_id.to_hex(),
            actual: actual.to_hex(),
        });
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }
    tokio::fs::write(output_path, &plaintext).await?;

    let _ = status_tx.send(ReassemblyProgress::completed());
    Ok(())
}

/// §4.5 step 3: local Blob Store, then `CurrentNodes` in Replica-record
/// order, then a fresh read of the Replica record in case the Replica
/// Manager has already started recovery onto a node not in our first read.
async fn fetch_one_chunk(
    chunk: &ChunkRecord,
    metadata: &MetadataStore,
    blob_store: &Arc<dyn BlobStore>,
    transport: &Arc<dyn TransportAdapter>,
    corruption: &Arc<dyn CorruptionReporter>,
    key: &DekKey,
) -> Result<Vec<u8>> {
    let mut attempts = 0u32;
    let mut decrypt_failures = 0u32;

    if let Ok(bytes) = blob_store.get(&chunk.stored_key).await {
        attempts += 1;
        match decrypt_and_verify(&bytes, key, chunk) {
            Ok(plaintext) => return Ok(plaintext),
            Err(meshvault_blockstore::PipelineError::DecryptionError(_)) => decrypt_failures += 1,
            Err(_) => {} // hash mismatch on local copy: nothing to report corrupt against, just move on
        }
    }

    let replica = metadata.get_replica(&chunk.chunk_hash).await?;
    let mut tried: Vec<_> = Vec::new();
    if let Some(replica) = &replica {
        for node_id in &replica.current_nodes {
            tried.push(node_id.clone());
            if let Some(plaintext) = try_node(chunk, node_id, transport, corruption, key, &mut attempts, &mut decrypt_failures).await {
                return Ok(plaintext);
            }
        }
    }

    // Re-read in case the Replica Manager placed a new copy mid-fetch.
    if let Some(fresh) = metadata.get_replica(&chunk.chunk_hash).await? {
        for node_id in fresh
            .current_nodes
            .iter()
            .filter(|n| !tried.contains(n))
        {
            if let Some(plaintext) = try_node(chunk, node_id, transport, corruption, key, &mut attempts, &mut decrypt_failures).await {
                return Ok(plaintext);
            }
        }
    }

    if attempts > 0 && decrypt_failures == attempts {
        Err(ReassemblyError::DecryptionError(chunk.index))
    } else {
        Err(ReassemblyError::UnrecoverableChunk(chunk.index))
    }
}

async fn try_node(
    chunk: &ChunkRecord,
    node_id: &meshvault_core::NodeId,
    transport: &Arc<dyn TransportAdapter>,
    corruption: &Arc<dyn CorruptionReporter>,
    key: &DekKey,
    attempts: &mut u32,
    decrypt_failures: &mut u32,
) -> Option<Vec<u8>> {
    let bytes = transport
        .get_chunk(node_id, &chunk.stored_key, DEFAULT_TRANSFER_TIMEOUT)
        .await
        .ok()?;
    *attempts += 1;
    match decrypt_and_verify(&bytes, key, chunk) {
        Ok(plaintext) => Some(plaintext),
        Err(meshvault_blockstore::PipelineError::DecryptionError(_)) => {
            *decrypt_failures += 1;
            None
        }
        Err(_) => {
            corruption.report_corrupt(chunk.chunk_hash, node_id.clone()).await;
            None
        }
    }
}
