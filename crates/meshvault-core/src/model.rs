//! File, Chunk, Replica and Node record types and the invariants that bind
//! them together (§3 of the specification).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use meshvault_crypto::Sha256Digest;
use serde::{Deserialize, Serialize};

use crate::{MeshvaultError, Result};

/// `ChunkHash` and `FileID` are both SHA-256 digests; these aliases exist
/// purely so call sites read as what they mean rather than "a digest".
pub type ChunkHash = Sha256Digest;
pub type FileId = Sha256Digest;

/// Opaque node identifier. Newtype over `String` rather than a bare string
/// so it can't be mixed up with an address or a chunk key at call sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A file as known to the system. Immutable once created: new content always
/// produces a new `FileId`, so there is no in-place update path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
    pub chunk_size: u32,
    pub chunk_count: u32,
    pub chunk_hashes: Vec<ChunkHash>,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    /// Set by `tombstone`; actual chunk removal waits on reference counts.
    pub tombstoned: bool,
}

impl FileRecord {
    /// Check the two invariants §3 pins to the File entity itself (the
    /// chain invariants over Chunk records are checked separately by
    /// [`validate_chunk_chain`]).
    pub fn validate(&self) -> Result<()> {
        if self.chunk_hashes.len() != self.chunk_count as usize {
            return Err(MeshvaultError::InvariantViolation(format!(
                "file {}: chunk_count={} but chunk_hashes.len()={}",
                self.file_id,
                self.chunk_count,
                self.chunk_hashes.len()
            )));
        }
        Ok(())
    }
}

/// Whether a chunk's stored bytes were compressed before encryption.
/// Advisory only — the decoder always attempts decompression and falls
/// back to raw bytes regardless of this bit (§9 Design Notes).
pub type IsCompressed = bool;

/// One content-addressed, fixed-size (except possibly the last) slice of a
/// file's plaintext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_hash: ChunkHash,
    pub file_id: FileId,
    pub index: u32,
    pub offset: u64,
    pub prev_index: i64,
    pub next_index: i64,
    pub total_chunks: u32,
    pub stored_key: String,
    pub stored_size: u64,
    pub is_compressed: IsCompressed,
}

/// Validate the chain rule over a file's ordered chunk records (§3):
/// `Chunk[0].prev_index == -1`, `Chunk[n-1].next_index == -1`, interior
/// chunks link to their neighbours by index, offsets are prefix sums of
/// plaintext sizes, and `file_id`/`total_chunks` agree across the set.
pub fn validate_chunk_chain(file_id: &FileId, chunks: &[ChunkRecord]) -> Result<()> {
    let total = chunks.len() as u32;
    for (i, chunk) in chunks.iter().enumerate() {
        let i = i as u32;
        if chunk.file_id != *file_id {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk {i} has file_id {} but expected {file_id}",
                chunk.file_id
            )));
        }
        if chunk.index != i {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk at position {i} has index {}",
                chunk.index
            )));
        }
        if chunk.total_chunks != total {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk {i} has total_chunks={} but set has {total}",
                chunk.total_chunks
            )));
        }
        let expected_prev = if i == 0 { -1 } else { i as i64 - 1 };
        if chunk.prev_index != expected_prev {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk {i} has prev_index={} expected {expected_prev}",
                chunk.prev_index
            )));
        }
        let expected_next = if i + 1 == total { -1 } else { i as i64 + 1 };
        if chunk.next_index != expected_next {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk {i} has next_index={} expected {expected_next}",
                chunk.next_index
            )));
        }
    }

    // `offset` is a prefix sum of plaintext chunk sizes (§3), which aren't
    // recorded on `ChunkRecord` (only post-compression `stored_size` is).
    // What we can check without them: offsets start at zero and are
    // strictly increasing, which catches reordering and duplicate-offset
    // corruption even though it can't re-derive the exact prefix sum.
    if let Some(first) = chunks.first() {
        if first.offset != 0 {
            return Err(MeshvaultError::InvariantViolation(format!(
                "first chunk has offset={} expected 0",
                first.offset
            )));
        }
    }
    for pair in chunks.windows(2) {
        if pair[1].offset <= pair[0].offset {
            return Err(MeshvaultError::InvariantViolation(format!(
                "chunk {} offset={} does not exceed chunk {} offset={}",
                pair[1].index, pair[1].offset, pair[0].index, pair[0].offset
            )));
        }
    }
    Ok(())
}

/// Per-node confirmation state for a single chunk's replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaNodeHealth {
    Healthy,
    Corrupted,
    Unknown,
}

/// Tracks where copies of one chunk's ciphertext currently live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicaRecord {
    pub chunk_hash: ChunkHash,
    pub desired_count: u32,
    /// Ordered, deduplicated: fetch order during reassembly follows this
    /// list (§4.5 step 3), so insertion order is preserved rather than
    /// using an unordered set.
    pub current_nodes: Vec<NodeId>,
    pub per_node_health: HashMap<NodeId, ReplicaNodeHealth>,
    pub last_verified: Option<DateTime<Utc>>,
}

impl ReplicaRecord {
    pub fn new(chunk_hash: ChunkHash, desired_count: u32, initial_nodes: Vec<NodeId>) -> Self {
        let per_node_health = initial_nodes
            .iter()
            .cloned()
            .map(|n| (n, ReplicaNodeHealth::Healthy))
            .collect();
        Self {
            chunk_hash,
            desired_count,
            current_nodes: initial_nodes,
            per_node_health,
            last_verified: None,
        }
    }

    /// Add `node` to the replica set if it isn't already present. Returns
    /// `false` if it was already a member (idempotent creation, §4.4).
    pub fn add_node(&mut self, node: NodeId) -> bool {
        if self.current_nodes.contains(&node) {
            return false;
        }
        self.per_node_health
            .insert(node.clone(), ReplicaNodeHealth::Healthy);
        self.current_nodes.push(node);
        true
    }

    pub fn remove_node(&mut self, node: &NodeId) -> bool {
        self.per_node_health.remove(node);
        let before = self.current_nodes.len();
        self.current_nodes.retain(|n| n != node);
        self.current_nodes.len() != before
    }

    pub fn healthy_count(&self) -> usize {
        self.per_node_health
            .values()
            .filter(|h| **h == ReplicaNodeHealth::Healthy)
            .count()
    }
}

/// Node liveness as derived by the membership component. Never set
/// directly by any other layer (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Degraded,
    Failed,
    Unknown,
}

/// A participating peer as tracked by Membership & Health.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub address: String,
    pub port: u16,
    pub last_seen: DateTime<Utc>,
    pub status: NodeStatus,
    pub capacity: u64,
    pub used: u64,
    pub chunk_count: u64,
    pub latency_seconds: f64,
    pub failure_count: u32,
}

impl NodeRecord {
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.used as f64 / self.capacity as f64
        }
    }

    pub fn free_space(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_crypto::hash;

    fn mk_chunk(file_id: FileId, index: u32, total: u32, offset: u64) -> ChunkRecord {
        ChunkRecord {
            chunk_hash: hash(format!("chunk-{index}").as_bytes()),
            file_id,
            index,
            offset,
            prev_index: if index == 0 { -1 } else { index as i64 - 1 },
            next_index: if index + 1 == total {
                -1
            } else {
                index as i64 + 1
            },
            total_chunks: total,
            stored_key: format!("key-{index}"),
            stored_size: 1024,
            is_compressed: false,
        }
    }

    #[test]
    fn valid_chain_passes() {
        let file_id = hash(b"file");
        let chunks = vec![
            mk_chunk(file_id, 0, 3, 0),
            mk_chunk(file_id, 1, 3, 100),
            mk_chunk(file_id, 2, 3, 200),
        ];
        assert!(validate_chunk_chain(&file_id, &chunks).is_ok());
    }

    #[test]
    fn wrong_file_id_is_rejected() {
        let file_id = hash(b"file");
        let other = hash(b"other");
        let mut chunks = vec![mk_chunk(file_id, 0, 1, 0)];
        chunks[0].file_id = other;
        assert!(validate_chunk_chain(&file_id, &chunks).is_err());
    }

    #[test]
    fn broken_prev_index_is_rejected() {
        let file_id = hash(b"file");
        let mut chunks = vec![mk_chunk(file_id, 0, 2, 0), mk_chunk(file_id, 1, 2, 100)];
        chunks[1].prev_index = 5;
        assert!(validate_chunk_chain(&file_id, &chunks).is_err());
    }

    #[test]
    fn replica_add_node_is_idempotent() {
        let mut replica = ReplicaRecord::new(hash(b"c"), 3, vec![]);
        assert!(replica.add_node(NodeId::from("n1")));
        assert!(!replica.add_node(NodeId::from("n1")));
        assert_eq!(replica.current_nodes.len(), 1);
    }

    #[test]
    fn file_record_rejects_mismatched_chunk_count() {
        let file = FileRecord {
            file_id: hash(b"file"),
            name: "f".into(),
            size: 0,
            chunk_size: 1024,
            chunk_count: 2,
            chunk_hashes: vec![hash(b"a")],
            created_at: Utc::now(),
            owner_id: "owner".into(),
            tombstoned: false,
        };
        assert!(file.validate().is_err());
    }
}
