//! ## blockpool-core::alloc::handle
//! **Opaque block handles**
//!
//! Callers never see raw addresses. A handle names its pool and the arena
//! offset where the span starts; the pool maps it back to a descriptor by
//! scanning the chain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::chain::BlockState;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique pool identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

/// A span handed out by [`PoolAllocator::alloc`](super::PoolAllocator::alloc).
///
/// Handles are plain values: copying one does not duplicate the span, and a
/// handle kept after `free` is stale. A handle names a pool and an offset,
/// nothing more: a stale handle is rejected while its offset starts a free
/// span or no span at all, but once a later allocation starts at the same
/// offset the stale handle names that new block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    pool: PoolId,
    offset: usize,
}

impl BlockHandle {
    #[inline]
    pub(crate) fn new(pool: PoolId, offset: usize) -> Self {
        Self { pool, offset }
    }

    /// Pool that issued this handle.
    #[inline]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Offset of the span from the arena base.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.pool, self.offset)
    }
}

/// Read-only view of one descriptor, as yielded by
/// [`PoolAllocator::blocks`](super::PoolAllocator::blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub offset: usize,
    pub size: usize,
    pub state: BlockState,
}

impl BlockInfo {
    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }
}
