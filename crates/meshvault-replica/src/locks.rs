//! Per-chunk striped lock table (§5: "striped map of ~1024 locks in
//! practice"), so operations on one chunk serialize while distinct chunks
//! proceed in parallel without a table-wide lock.

use meshvault_core::ChunkHash;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_STRIPE_COUNT: usize = 1024;

pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub fn new(stripe_count: usize) -> Self {
        let stripe_count = stripe_count.max(1);
        let mut stripes = Vec::with_capacity(stripe_count);
        stripes.resize_with(stripe_count, || Mutex::new(()));
        Self { stripes }
    }

    fn stripe_index(&self, chunk_hash: &ChunkHash) -> usize {
        let bytes = chunk_hash.as_bytes();
        let mut acc = 0usize;
        for b in bytes.iter().take(8) {
            acc = (acc << 8) | *b as usize;
        }
        acc % self.stripes.len()
    }

    pub async fn lock(&self, chunk_hash: &ChunkHash) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_index(chunk_hash)].lock().await
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvault_crypto::hash;

    #[test]
    fn same_chunk_hashes_to_same_stripe() {
        let locks = StripedLocks::new(16);
        let h = hash(b"chunk");
        assert_eq!(locks.stripe_index(&h), locks.stripe_index(&h));
    }

    #[tokio::test]
    async fn distinct_chunks_can_lock_concurrently() {
        let locks = StripedLocks::new(1024);
        let a = hash(b"chunk-a");
        let b = hash(b"chunk-b");
        let _guard_a = locks.lock(&a).await;
        // If these happened to land on the same stripe this would deadlock
        // the test via timeout; 1024 stripes makes a collision on two
        // arbitrary hashes exceedingly unlikely.
        let _guard_b = locks.lock(&b).await;
    }
}
