//! Metadata Store: an ordered KV with transactional batches (§2 item 2),
//! plus the typed accessors the rest of the system calls instead of raw
//! keys. The specification treats a generic byte-KV with atomic batch
//! writes as a given external collaborator (§1 non-goals); [`KvStore`] is
//! that collaborator's contract, and [`InMemoryKvStore`] is the in-process
//! implementation used by tests and the single-process `meshvaultd` binary.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::{ChunkRecord, FileId, FileRecord, NodeId, NodeRecord, ReplicaRecord};
use crate::{ChunkHash, MeshvaultError, Result};

/// A single write in a transactional batch: set `key` to `value`, or
/// (if `value` is `None`) delete it.
#[derive(Clone, Debug)]
pub struct KvWrite {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// Ordered byte-KV with atomic batch writes. The ordering requirement is
/// satisfied trivially by key string comparison; nothing here depends on
/// iteration order beyond `scan_prefix` returning every matching key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Apply every write in `batch` atomically: readers never observe a
    /// partial batch (§5's "File record and all its Chunk records become
    /// visible atomically").
    async fn write_batch(&self, batch: Vec<KvWrite>) -> Result<()>;

    /// All `(key, value)` pairs whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// In-process `KvStore` backed by a `DashMap`, matching the reference
/// crate's `Arc<DashMap<Cid, Bytes>>`-backed `MemoryBlockStore`. A coarse
/// `Mutex` serializes batches so a concurrent reader never sees half of one
/// — `DashMap` alone only guarantees per-key atomicity, not cross-key.
#[derive(Clone)]
pub struct InMemoryKvStore {
    data: Arc<DashMap<String, Vec<u8>>>,
    batch_lock: Arc<Mutex<()>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            batch_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.clone()))
    }

    async fn write_batch(&self, batch: Vec<KvWrite>) -> Result<()> {
        let _guard = self.batch_lock.lock();
        for write in batch {
            match write.value {
                Some(value) => {
                    self.data.insert(write.key, value);
                }
                None => {
                    self.data.remove(&write.key);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

fn file_key(file_id: &FileId) -> String {
    format!("fileid:{file_id}")
}

fn file_name_key(name: &str) -> String {
    format!("file:{name}")
}

fn chunk_key(chunk_hash: &ChunkHash) -> String {
    format!("chunk:{chunk_hash}")
}

fn replica_key(chunk_hash: &ChunkHash) -> String {
    format!("replica:{chunk_hash}")
}

fn node_key(node_id: &NodeId) -> String {
    format!("node:{node_id}")
}

/// Optional filters for [`MetadataStore::list_files`].
#[derive(Clone, Debug, Default)]
pub struct ListFilesFilter {
    pub owner_id: Option<String>,
    pub name_prefix: Option<String>,
    pub include_tombstoned: bool,
}

/// Typed accessors over a [`KvStore`], matching the key layout mandated by
/// §6 bit-for-bit: `file:<name>` / `fileid:<hex>` for files, `chunk:<hex>`,
/// `replica:<hex>`, `node:<node_id>`. Holds a trait object so downstream
/// crates (Replica Manager, Reassembler, Supervisor) depend on one concrete
/// type regardless of which `KvStore` backs it.
#[derive(Clone)]
pub struct MetadataStore {
    kv: Arc<dyn KvStore>,
}

impl MetadataStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Write a File record and all of its Chunk records as one atomic
    /// batch (§4.1 step 7: partial failure must not leave orphan chunk
    /// references).
    pub async fn put_file_batch(&self, file: &FileRecord, chunks: &[ChunkRecord]) -> Result<()> {
        file.validate()?;
        crate::model::validate_chunk_chain(&file.file_id, chunks)?;

        let mut batch = Vec::with_capacity(chunks.len() + 2);
        let file_bytes = serde_json::to_vec(file)?;
        batch.push(KvWrite {
            key: file_key(&file.file_id),
            value: Some(file_bytes.clone()),
        });
        batch.push(KvWrite {
            key: file_name_key(&file.name),
            value: Some(file_bytes),
        });
        for chunk in chunks {
            batch.push(KvWrite {
                key: chunk_key(&chunk.chunk_hash),
                value: Some(serde_json::to_vec(chunk)?),
            });
        }
        self.kv.write_batch(batch).await
    }

    pub async fn get_file_by_id(&self, file_id: &FileId) -> Result<Option<FileRecord>> {
        match self.kv.get(&file_key(file_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_file_by_name(&self, name: &str) -> Result<Option<FileRecord>> {
        match self.kv.get(&file_name_key(name)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn tombstone_file(&self, file_id: &FileId) -> Result<()> {
        let mut file = self
            .get_file_by_id(file_id)
            .await?
            .ok_or_else(|| MeshvaultError::not_found("file", file_id.to_hex()))?;
        file.tombstoned = true;
        let bytes = serde_json::to_vec(&file)?;
        self.kv
            .write_batch(vec![
                KvWrite {
                    key: file_key(file_id),
                    value: Some(bytes.clone()),
                },
                KvWrite {
                    key: file_name_key(&file.name),
                    value: Some(bytes),
                },
            ])
            .await
    }

    pub async fn list_files(&self, filter: &ListFilesFilter) -> Result<Vec<FileRecord>> {
        let entries = self.kv.scan_prefix("fileid:").await?;
        let mut files = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            let file: FileRecord = serde_json::from_slice(&bytes)?;
            if !filter.include_tombstoned && file.tombstoned {
                continue;
            }
            if let Some(owner) = &filter.owner_id {
                if &file.owner_id != owner {
                    continue;
                }
            }
            if let Some(prefix) = &filter.name_prefix {
                if !file.name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            files.push(file);
        }
        Ok(files)
    }

    pub async fn get_chunk(&self, chunk_hash: &ChunkHash) -> Result<Option<ChunkRecord>> {
        match self.kv.get(&chunk_key(chunk_hash)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_replica(&self, replica: &ReplicaRecord) -> Result<()> {
        self.kv
            .write_batch(vec![KvWrite {
                key: replica_key(&replica.chunk_hash),
                value: Some(serde_json::to_vec(replica)?),
            }])
            .await
    }

    pub async fn get_replica(&self, chunk_hash: &ChunkHash) -> Result<Option<ReplicaRecord>> {
        match self.kv.get(&replica_key(chunk_hash)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_replica(&self, chunk_hash: &ChunkHash) -> Result<()> {
        self.kv
            .write_batch(vec![KvWrite {
                key: replica_key(chunk_hash),
                value: None,
            }])
            .await
    }

    pub async fn list_replicas(&self) -> Result<Vec<ReplicaRecord>> {
        let entries = self.kv.scan_prefix("replica:").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| Ok(serde_json::from_slice(&bytes)?))
            .collect()
    }

    pub async fn put_node(&self, node: &NodeRecord) -> Result<()> {
        self.kv
            .write_batch(vec![KvWrite {
                key: node_key(&node.node_id),
                value: Some(serde_json::to_vec(node)?),
            }])
            .await
    }

    pub async fn get_node(&self, node_id: &NodeId) -> Result<Option<NodeRecord>> {
        match self.kv.get(&node_key(node_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let entries = self.kv.scan_prefix("node:").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| Ok(serde_json::from_slice(&bytes)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meshvault_crypto::hash;

    fn store() -> MetadataStore {
        MetadataStore::new(Arc::new(InMemoryKvStore::new()))
    }

    fn mk_file(file_id: FileId, name: &str, chunk_hashes: Vec<ChunkHash>) -> FileRecord {
        FileRecord {
            file_id,
            name: name.to_string(),
            size: 0,
            chunk_size: 1024,
            chunk_count: chunk_hashes.len() as u32,
            chunk_hashes,
            created_at: Utc::now(),
            owner_id: "owner-1".into(),
            tombstoned: false,
        }
    }

    #[tokio::test]
    async fn file_round_trips_by_id_and_name() {
        let store = store();
        let file_id = hash(b"contents");
        let file = mk_file(file_id, "a.txt", vec![]);
        store.put_file_batch(&file, &[]).await.unwrap();

        let by_id = store.get_file_by_id(&file_id).await.unwrap().unwrap();
        let by_name = store.get_file_by_name("a.txt").await.unwrap().unwrap();
        assert_eq!(by_id.file_id, file_id);
        assert_eq!(by_name.file_id, file_id);
    }

    #[tokio::test]
    async fn batch_write_is_all_or_nothing_on_invariant_violation() {
        let store = store();
        let file_id = hash(b"contents");
        let mut file = mk_file(file_id, "b.txt", vec![hash(b"chunk")]);
        file.chunk_count = 99; // inconsistent with chunk_hashes.len()

        assert!(store.put_file_batch(&file, &[]).await.is_err());
        assert!(store.get_file_by_id(&file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tombstoned_files_excluded_from_list_by_default() {
        let store = store();
        let file_id = hash(b"contents");
        let file = mk_file(file_id, "c.txt", vec![]);
        store.put_file_batch(&file, &[]).await.unwrap();
        store.tombstone_file(&file_id).await.unwrap();

        let visible = store.list_files(&ListFilesFilter::default()).await.unwrap();
        assert!(visible.is_empty());

        let all = store
            .list_files(&ListFilesFilter {
                include_tombstoned: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn replica_delete_removes_record() {
        let store = store();
        let chunk_hash = hash(b"chunk");
        let replica = ReplicaRecord::new(chunk_hash, 3, vec![]);
        store.put_replica(&replica).await.unwrap();
        assert!(store.get_replica(&chunk_hash).await.unwrap().is_some());

        store.delete_replica(&chunk_hash).await.unwrap();
        assert!(store.get_replica(&chunk_hash).await.unwrap().is_none());
    }
}
