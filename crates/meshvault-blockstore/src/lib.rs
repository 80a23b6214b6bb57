//! # meshvault-blockstore
//!
//! Content-addressed blob storage and the chunk pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ChunkPipeline                │
//! │   compress → encrypt → hash → store       │
//! ├──────────────┬─────────────────────────────┤
//! │ MemoryBlobStore │ FilesystemBlobStore       │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! `ChunkPipeline` calls into `meshvault-crypto` for the per-chunk
//! primitives and into a `BlobStore` implementation for ciphertext
//! persistence; it has no opinion on where the Blob Store's bytes actually
//! live.

pub mod chunker;
pub mod error;
pub mod pipeline;
pub mod store;

pub use chunker::{calculate_chunk_count, chunk_bytes, last_chunk_size};
pub use error::{BlockStoreError, PipelineError};
pub use pipeline::{decrypt_and_verify, ChunkPipeline, IngestOutput};
pub use store::{key_for, BlobStore, FilesystemBlobStore, MemoryBlobStore, StoredKey};
