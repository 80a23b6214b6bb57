//! Blob Store: content-addressed local storage. `put(bytes) -> key`,
//! `get(key) -> bytes`, where `key` is the hex SHA-256 of the bytes stored
//! (§6: "keys are the ciphertext hash").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use meshvault_crypto::hash;

use crate::error::{BlockStoreError, Result};

/// Content-addressed key into the Blob Store: lowercase hex SHA-256 of the
/// stored (ciphertext) bytes.
pub type StoredKey = String;

pub fn key_for(bytes: &[u8]) -> StoredKey {
    hash(bytes).to_hex()
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes`, returning its content-addressed key. Storing the same
    /// bytes twice is a no-op the second time (dedup is automatic since the
    /// key is a function of the content).
    async fn put(&self, bytes: &[u8]) -> Result<StoredKey>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn contains(&self, key: &str) -> Result<bool>;
}

/// In-memory `BlobStore`, matching the reference crate's
/// `Arc<DashMap<Cid, Bytes>>`-backed `MemoryBlockStore`.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blocks: Arc<DashMap<StoredKey, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<StoredKey> {
        let key = key_for(bytes);
        self.blocks.insert(key.clone(), Bytes::copy_from_slice(bytes));
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.blocks
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlockStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blocks.remove(key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.blocks.contains_key(key))
    }
}

/// On-disk `BlobStore`, sharded by the first 2 hex characters of the key
/// (§6: "Directory sharding by first 2 hex characters of the key").
#[derive(Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[..2] } else { key };
        self.root.join(shard).join(key)
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[..2] } else { key };
        self.root.join(shard)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<StoredKey> {
        let key = key_for(bytes);
        let dir = self.shard_dir(&key);
        tokio::fs::create_dir_all(&dir).await?;
        let path = self.path_for(&key);
        if tokio::fs::try_exists(&path).await? {
            return Ok(key);
        }
        // Write to a temp file first so a crash mid-write never leaves a
        // partially-written blob under its final, content-addressed name.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlockStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// Helper retained for callers that want the directory a key would live
/// under without touching the filesystem (diagnostics, tests).
pub fn shard_path(root: &Path, key: &str) -> PathBuf {
    let shard = if key.len() >= 2 { &key[..2] } else { key };
    root.join(shard).join(key)
}
