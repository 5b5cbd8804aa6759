//! Deterministic state digest.
//!
//! Every operation and the resulting block layout are folded into a BLAKE3
//! hasher. Only offsets, sizes and states are hashed, never pool ids, so two
//! runs with the same seed produce the same digest.

use blake3::Hasher;

use blockpool_core::alloc::{BlockState, PoolAllocator};

pub struct StateHasher {
    hasher: Hasher,
}

impl StateHasher {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Records one operation and its outcome.
    pub fn record(&mut self, op: &str, outcome: &str, offset: Option<usize>) {
        self.hasher.update(op.as_bytes());
        self.hasher.update(b":");
        self.hasher.update(outcome.as_bytes());
        if let Some(offset) = offset {
            self.hasher.update(&(offset as u64).to_le_bytes());
        }
        self.hasher.update(b";");
    }

    /// Records the full block layout of `pool`.
    pub fn record_layout(&mut self, pool: &PoolAllocator) {
        for block in pool.blocks() {
            self.hasher.update(&(block.offset as u64).to_le_bytes());
            self.hasher.update(&(block.size as u64).to_le_bytes());
            self.hasher.update(match block.state {
                BlockState::Free => b"F",
                BlockState::Used => b"U",
            });
        }
        self.hasher.update(b"|");
    }

    pub fn finalize_hex(&self) -> String {
        hex::encode(self.hasher.finalize().as_bytes())
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_changes_digest() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let mut before = StateHasher::new();
        before.record_layout(&pool);

        pool.alloc(8).unwrap();
        let mut after = StateHasher::new();
        after.record_layout(&pool);

        assert_ne!(before.finalize_hex(), after.finalize_hex());
    }

    #[test]
    fn digest_ignores_pool_identity() {
        let mut first = PoolAllocator::new(64).unwrap();
        let mut second = PoolAllocator::new(64).unwrap();
        let a = first.alloc(8).unwrap();
        let b = second.alloc(8).unwrap();

        let mut left = StateHasher::new();
        left.record("alloc", "ok", Some(a.offset()));
        left.record_layout(&first);
        let mut right = StateHasher::new();
        right.record("alloc", "ok", Some(b.offset()));
        right.record_layout(&second);

        assert_eq!(left.finalize_hex(), right.finalize_hex());
        assert_eq!(left.finalize_hex().len(), 64);
    }
}
