//! Chunk Pipeline: compress → encrypt → hash → store, and its inverse
//! (§4.1). This module orchestrates `meshvault-crypto`'s primitives across
//! a whole file; the primitives themselves don't know about files, chunks,
//! or the Blob Store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use meshvault_core::{ChunkHash, ChunkRecord, FileId, FileRecord};
use meshvault_crypto::{compress, decompress, decrypt, encrypt, hash, is_incompressible, DekKey, IncrementalHasher};
use tracing::instrument;

use crate::chunker::chunk_bytes;
use crate::error::PipelineError;
use crate::store::BlobStore;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Output of running the forward pipeline over one file.
pub struct IngestOutput {
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
}

pub struct ChunkPipeline {
    blob_store: Arc<dyn BlobStore>,
}

impl ChunkPipeline {
    pub fn new(blob_store: Arc<dyn BlobStore>) -> Self {
        Self { blob_store }
    }

    /// Run the forward pipeline (§4.1 steps 1-7) over `plaintext`, storing
    /// each chunk's ciphertext in the Blob Store. Does not write the
    /// resulting records to the Metadata Store — callers do that in one
    /// atomic batch (`MetadataStore::put_file_batch`) so a crash mid-ingest
    /// never leaves a half-written file.
    #[instrument(skip(self, plaintext, key), fields(name = %name, size = plaintext.len()))]
    pub async fn ingest(
        &self,
        name: &str,
        owner_id: &str,
        plaintext: &[u8],
        key: &DekKey,
        chunk_size: u32,
    ) -> Result<IngestOutput> {
        let skip_compression = is_incompressible(name);
        let windows = chunk_bytes(plaintext, chunk_size);
        let total_chunks = windows.len() as u32;

        let mut file_hasher = IncrementalHasher::new();
        let mut chunks = Vec::with_capacity(windows.len());
        let mut offset = 0u64;
        // ChunkHash is the dedup key (§6 GLOSSARY): a plaintext chunk seen
        // earlier in this same file reuses its already-stored ciphertext
        // rather than re-encrypting under a fresh nonce and doubling up the
        // Blob Store entry.
        let mut seen: HashMap<ChunkHash, (String, u64, bool)> = HashMap::new();

        for (index, window) in windows.iter().enumerate() {
            let index = index as u32;
            file_hasher.update(window);

            let chunk_hash = hash(window);
            tracing::debug!(chunk_index = index, chunk_hash = %chunk_hash, "processing chunk");

            let (stored_key, stored_size, is_compressed) = if let Some(existing) = seen.get(&chunk_hash) {
                existing.clone()
            } else {
                let (payload, is_compressed) = if skip_compression {
                    (window.to_vec(), false)
                } else {
                    let compressed = compress(window)?;
                    if compressed.len() < window.len() {
                        (compressed, true)
                    } else {
                        (window.to_vec(), false)
                    }
                };

                let ciphertext = encrypt(key, &payload)?;
                let stored_key = self.blob_store.put(&ciphertext).await?;
                let stored_size = ciphertext.len() as u64;
                seen.insert(chunk_hash, (stored_key.clone(), stored_size, is_compressed));
                (stored_key, stored_size, is_compressed)
            };

            chunks.push(ChunkRecord {
                chunk_hash,
                file_id: FileId::new([0u8; 32]), // patched below once FileID is known
                index,
                offset,
                prev_index: if index == 0 { -1 } else { index as i64 - 1 },
                next_index: if index + 1 == total_chunks {
                    -1
                } else {
                    index as i64 + 1
                },
                total_chunks,
                stored_key,
                stored_size,
                is_compressed,
            });

            offset += window.len() as u64;
        }

        let file_id = file_hasher.finalize();
        for chunk in &mut chunks {
            chunk.file_id = file_id;
        }

        let file = FileRecord {
            file_id,
            name: name.to_string(),
            size: plaintext.len() as u64,
            chunk_size,
            chunk_count: total_chunks,
            chunk_hashes: chunks.iter().map(|c| c.chunk_hash).collect(),
            created_at: Utc::now(),
            owner_id: owner_id.to_string(),
            tombstoned: false,
        };

        tracing::info!(file_id = %file_id, chunk_count = total_chunks, "ingest complete");
        Ok(IngestOutput { file, chunks })
    }

    /// Run the inverse pipeline (§4.1 steps 1-4) over one chunk: fetch its
    /// ciphertext, decrypt, decompress-with-fallback, and verify the
    /// recovered plaintext against the recorded `ChunkHash`.
    #[instrument(skip(self, key), fields(chunk_index = chunk.index))]
    pub async fn fetch_and_verify(&self, chunk: &ChunkRecord, key: &DekKey) -> Result<Vec<u8>> {
        let ciphertext = self.blob_store.get(&chunk.stored_key).await?;
        decrypt_and_verify(&ciphertext, key, chunk)
    }
}

/// Decrypt and verify one chunk's ciphertext against its recorded
/// `ChunkHash`, independent of where the ciphertext came from (local Blob
/// Store or a peer fetched over the Transport Adapter). Shared by
/// `ChunkPipeline::fetch_and_verify` and the reassembler's recovery path.
pub fn decrypt_and_verify(ciphertext: &[u8], key: &DekKey, chunk: &ChunkRecord) -> Result<Vec<u8>> {
    let payload = decrypt(key, ciphertext).map_err(|_| PipelineError::DecryptionError(chunk.index))?;

    let plaintext = decompress(&payload);

    let actual = hash(&plaintext);
    if actual != chunk.chunk_hash {
        return Err(PipelineError::Corrupt {
            chunk_index: chunk.index,
            expected: chunk.chunk_hash.to_hex(),
            actual: actual.to_hex(),
        });
    }

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use meshvault_crypto::hash as crypto_hash;

    fn key() -> DekKey {
        DekKey::derive(b"correct horse battery staple", b"test-salt").unwrap()
    }

    fn pipeline() -> ChunkPipeline {
        ChunkPipeline::new(Arc::new(MemoryBlobStore::new()))
    }

    #[tokio::test]
    async fn round_trip_single_chunk_file() {
        let pipeline = pipeline();
        let key = key();
        let plaintext = b"hello\nworld";
        let out = pipeline
            .ingest("greeting.txt", "owner-1", plaintext, &key, 1_048_576)
            .await
            .unwrap();

        assert_eq!(out.file.chunk_count, 1);
        assert_eq!(out.file.file_id, crypto_hash(plaintext));

        let recovered = pipeline.fetch_and_verify(&out.chunks[0], &key).await.unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn empty_file_produces_zero_chunks() {
        let pipeline = pipeline();
        let key = key();
        let out = pipeline.ingest("empty.txt", "owner-1", b"", &key, 1024).await.unwrap();
        assert_eq!(out.file.chunk_count, 0);
        assert_eq!(out.file.file_id, crypto_hash(b""));
    }

    #[tokio::test]
    async fn duplicate_chunks_dedup_in_blob_store() {
        let blob_store = Arc::new(MemoryBlobStore::new());
        let pipeline = ChunkPipeline::new(blob_store.clone());
        let key = key();
        let plaintext = vec![0u8; 3 * 1024 * 1024];
        let out = pipeline
            .ingest("zeros.bin", "owner-1", &plaintext, &key, 1024 * 1024)
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 3);
        let distinct_hashes: std::collections::HashSet<_> =
            out.chunks.iter().map(|c| c.chunk_hash).collect();
        assert_eq!(distinct_hashes.len(), 1, "all-zero chunks must share one ChunkHash");
        assert_eq!(blob_store.len(), 1, "Blob Store must hold only one ciphertext entry");
    }

    #[tokio::test]
    async fn wrong_password_surfaces_decryption_error() {
        let pipeline = pipeline();
        let key = key();
        let wrong_key = DekKey::derive(b"wrong password", b"test-salt").unwrap();
        let out = pipeline
            .ingest("secret.txt", "owner-1", b"top secret", &key, 1024)
            .await
            .unwrap();

        let err = pipeline
            .fetch_and_verify(&out.chunks[0], &wrong_key)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DecryptionError(0)));
    }

    #[tokio::test]
    async fn corrupted_ciphertext_surfaces_corrupt_error_not_decryption_error() {
        // Simulate on-disk bit rot: swap the stored ciphertext for one that
        // decrypts cleanly under the same key but to different bytes.
        let blob_store = Arc::new(MemoryBlobStore::new());
        let pipeline = ChunkPipeline::new(blob_store.clone());
        let key = key();
        let out = pipeline
            .ingest("data.bin", "owner-1", b"original bytes", &key, 1024)
            .await
            .unwrap();

        let other_ciphertext = meshvault_crypto::encrypt(&key, b"different bytes!!").unwrap();
        let other_key = blob_store.put(&other_ciphertext).await.unwrap();
        let mut tampered = out.chunks[0].clone();
        tampered.stored_key = other_key;

        let err = pipeline.fetch_and_verify(&tampered, &key).await.unwrap_err();
        assert!(matches!(err, PipelineError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn exactly_one_byte_last_chunk() {
        let pipeline = pipeline();
        let key = key();
        let plaintext = vec![9u8; 1025];
        let out = pipeline
            .ingest("odd.bin", "owner-1", &plaintext, &key, 1024)
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.chunks[1].offset, 1024);

        let mut recovered = Vec::new();
        for chunk in &out.chunks {
            recovered.extend(pipeline.fetch_and_verify(chunk, &key).await.unwrap());
        }
        assert_eq!(recovered, plaintext);
    }
}
