//! ## blockpool-core::alloc::stats
//! **Pool operation counters**
//!
//! Tracks how often each allocator operation succeeded or was rejected,
//! and how much splitting/coalescing work the descriptor chain performed.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Operation counters for a single pool.
pub struct MemoryStats {
    allocations: AtomicUsize,
    failed_allocations: AtomicUsize,
    frees: AtomicUsize,
    rejected_frees: AtomicUsize,
    resizes: AtomicUsize,
    splits: AtomicUsize,
    merges: AtomicUsize,
}

/// Point-in-time copy of [`MemoryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub allocations: usize,
    pub failed_allocations: usize,
    pub frees: usize,
    pub rejected_frees: usize,
    pub resizes: usize,
    pub splits: usize,
    pub merges: usize,
}

impl MemoryStats {
    /// Creates a new `MemoryStats` instance with all counters initialized to zero.
    pub fn new() -> Self {
        MemoryStats {
            allocations: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            rejected_frees: AtomicUsize::new(0),
            resizes: AtomicUsize::new(0),
            splits: AtomicUsize::new(0),
            merges: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn increment_allocations(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_failed_allocations(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_frees(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_rejected_frees(&self) {
        self.rejected_frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_resizes(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_splits(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `count` absorbed descriptors to the merge counter.
    #[inline]
    pub fn add_merges(&self, count: usize) {
        self.merges.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Returns the number of allocation requests that could not be served.
    pub fn failed_allocations(&self) -> usize {
        self.failed_allocations.load(Ordering::Relaxed)
    }

    /// Returns the number of blocks returned to the pool.
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::Relaxed)
    }

    /// Returns the number of double frees and foreign-handle frees.
    pub fn rejected_frees(&self) -> usize {
        self.rejected_frees.load(Ordering::Relaxed)
    }

    /// Returns the number of successful resize calls.
    pub fn resizes(&self) -> usize {
        self.resizes.load(Ordering::Relaxed)
    }

    /// Returns the number of free blocks split by allocations.
    pub fn splits(&self) -> usize {
        self.splits.load(Ordering::Relaxed)
    }

    /// Returns the number of descriptors absorbed by coalescing.
    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations(),
            failed_allocations: self.failed_allocations(),
            frees: self.frees(),
            rejected_frees: self.rejected_frees(),
            resizes: self.resizes(),
            splits: self.splits(),
            merges: self.merges(),
        }
    }
}

impl Default for MemoryStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}
