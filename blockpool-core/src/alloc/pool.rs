//! ## blockpool-core::alloc::pool
//! **Fixed-size memory pool**
//!
//! A single arena is reserved up front and carved into spans on demand.
//! Requests are served first-fit; an oversized free span is split so the
//! used part is exactly the requested size, and a freed span is immediately
//! merged with its free neighbours so no two free spans are ever adjacent.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::chain::{BlockDescriptor, BlockIndex, BlockState, DescriptorChain};
use super::handle::{BlockHandle, BlockInfo, PoolId};
use super::stats::{MemoryStats, StatsSnapshot};
use crate::error::PoolError;

/// First-fit allocator over one fixed arena.
///
/// The pool is not thread-safe; every mutating call takes `&mut self`, so
/// shared use requires an external lock around the whole value.
pub struct PoolAllocator {
    id: PoolId,
    arena: Box<[u8]>,
    chain: DescriptorChain,
    stats: MemoryStats,
}

/// Final accounting returned by [`PoolAllocator::deinit`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub id: PoolId,
    pub capacity: usize,
    /// Used blocks still outstanding when the pool was torn down.
    pub leaked_blocks: usize,
    pub leaked_bytes: usize,
    pub stats: StatsSnapshot,
}

impl PoolAllocator {
    /// Reserves a `capacity` byte arena covered by a single free block.
    ///
    /// Fails with [`PoolError::InvalidCapacity`] for a zero capacity and with
    /// [`PoolError::ArenaReservation`] if the system allocator cannot provide
    /// the arena.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        let mut arena = Vec::new();
        arena
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::ArenaReservation { capacity })?;
        arena.resize(capacity, 0u8);

        let id = PoolId::next();
        info!(pool = %id, capacity, "memory pool initialized");

        Ok(Self {
            id,
            arena: arena.into_boxed_slice(),
            chain: DescriptorChain::new(capacity),
            stats: MemoryStats::new(),
        })
    }

    /// Allocates a span of exactly `size` bytes from the first free block
    /// large enough to hold it.
    ///
    /// Zero-size requests are rejected: a zero-length span would share its
    /// offset with the following block and make handles ambiguous.
    pub fn alloc(&mut self, size: usize) -> Result<BlockHandle, PoolError> {
        if size == 0 {
            self.stats.increment_failed_allocations();
            return Err(PoolError::ZeroSizeRequest);
        }

        let Some(index) = self.chain.find(|d| d.is_free() && d.size >= size) else {
            self.stats.increment_failed_allocations();
            let largest_free = self.largest_free_block();
            debug!(pool = %self.id, requested = size, largest_free, "no free block large enough");
            return Err(PoolError::NoSpace {
                requested: size,
                largest_free,
            });
        };

        let block = self.chain.get_mut(index);
        let data_start = block.data_start;
        let remainder = block.size - size;
        block.size = size;
        block.state = BlockState::Used;

        if remainder > 0 {
            self.chain
                .insert_after(index, BlockDescriptor::free(data_start + size, remainder));
            self.stats.increment_splits();
        }

        self.stats.increment_allocations();
        debug!(pool = %self.id, offset = data_start, size, remainder, "block allocated");
        Ok(BlockHandle::new(self.id, data_start))
    }

    /// Returns a span to the pool and coalesces it with the run of free
    /// blocks that follows it, and with a free block directly before it.
    ///
    /// Unknown handles and double frees are reported and leave the pool
    /// untouched.
    pub fn free(&mut self, handle: BlockHandle) -> Result<(), PoolError> {
        let offset = handle.offset();
        let Some((previous, index)) = self.locate(handle) else {
            self.stats.increment_rejected_frees();
            warn!(pool = %self.id, %handle, "free of a block not allocated from this pool");
            return Err(PoolError::UnknownBlock { offset });
        };

        let block = self.chain.get_mut(index);
        if block.is_free() {
            self.stats.increment_rejected_frees();
            warn!(pool = %self.id, %handle, "block is already free");
            return Err(PoolError::DoubleFree { offset });
        }
        block.state = BlockState::Free;

        let mut merged = self.chain.absorb_free_successors(index);
        let mut head = index;
        if let Some(previous) = previous.filter(|&p| self.chain.get(p).is_free()) {
            merged += self.chain.absorb_free_successors(previous);
            head = previous;
        }

        self.stats.increment_frees();
        self.stats.add_merges(merged);
        debug!(
            pool = %self.id,
            offset,
            size = self.chain.get(head).size,
            merged,
            "block freed"
        );
        Ok(())
    }

    /// Grows a span to at least `new_size` bytes.
    ///
    /// `None` behaves like [`alloc`](Self::alloc). A span that is already
    /// large enough is returned unchanged; spans are never shrunk in place.
    /// Otherwise the contents move to a fresh span and the old one is freed.
    /// If no fresh span is available the original stays valid and untouched.
    pub fn resize(
        &mut self,
        handle: Option<BlockHandle>,
        new_size: usize,
    ) -> Result<BlockHandle, PoolError> {
        let Some(handle) = handle else {
            return self.alloc(new_size);
        };

        let offset = handle.offset();
        let Some(index) = self.lookup_used(handle) else {
            warn!(pool = %self.id, %handle, "resize of a block not allocated from this pool");
            return Err(PoolError::UnknownBlock { offset });
        };

        let old_size = self.chain.get(index).size;
        if old_size >= new_size {
            self.stats.increment_resizes();
            return Ok(handle);
        }

        let moved = self.alloc(new_size)?;
        self.arena
            .copy_within(offset..offset + old_size, moved.offset());
        self.free(handle)?;
        self.stats.increment_resizes();
        debug!(
            pool = %self.id,
            from = offset,
            to = moved.offset(),
            old_size,
            new_size,
            "block moved"
        );
        Ok(moved)
    }

    /// Tears the pool down, releasing the arena and every descriptor.
    pub fn deinit(self) -> PoolSummary {
        let (leaked_blocks, leaked_bytes) = self
            .blocks()
            .filter(|block| !block.is_free())
            .fold((0, 0), |(count, bytes), block| (count + 1, bytes + block.size));

        let summary = PoolSummary {
            id: self.id,
            capacity: self.capacity(),
            leaked_blocks,
            leaked_bytes,
            stats: self.stats.snapshot(),
        };

        if leaked_blocks > 0 {
            warn!(
                pool = %self.id,
                leaked_blocks,
                leaked_bytes,
                "memory pool released with live blocks"
            );
        }
        info!(pool = %self.id, capacity = summary.capacity, "memory pool released");
        summary
    }

    /// Contents of a used span.
    pub fn bytes(&self, handle: BlockHandle) -> Result<&[u8], PoolError> {
        let index = self
            .lookup_used(handle)
            .ok_or(PoolError::UnknownBlock {
                offset: handle.offset(),
            })?;
        let block = self.chain.get(index);
        Ok(&self.arena[block.data_start..block.end()])
    }

    /// Mutable contents of a used span.
    pub fn bytes_mut(&mut self, handle: BlockHandle) -> Result<&mut [u8], PoolError> {
        let index = self
            .lookup_used(handle)
            .ok_or(PoolError::UnknownBlock {
                offset: handle.offset(),
            })?;
        let block = self.chain.get(index);
        let range = block.data_start..block.end();
        Ok(&mut self.arena[range])
    }

    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Total arena size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Number of descriptors in the chain.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Descriptors in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.chain.iter().map(|(_, block)| BlockInfo {
            offset: block.data_start,
            size: block.size,
            state: block.state,
        })
    }

    pub fn free_bytes(&self) -> usize {
        self.blocks().filter(BlockInfo::is_free).map(|b| b.size).sum()
    }

    pub fn used_bytes(&self) -> usize {
        self.capacity() - self.free_bytes()
    }

    /// Size of the largest request that could currently succeed.
    pub fn largest_free_block(&self) -> usize {
        self.blocks()
            .filter(BlockInfo::is_free)
            .map(|b| b.size)
            .max()
            .unwrap_or(0)
    }

    /// Number of used blocks.
    pub fn live_blocks(&self) -> usize {
        self.blocks().filter(|b| !b.is_free()).count()
    }

    /// Checks the descriptor chain against the pool invariants: spans start
    /// at the arena base, are contiguous and non-empty, cover the whole
    /// arena, and no two free spans are adjacent.
    pub fn verify(&self) -> Result<(), PoolError> {
        let mut expected_start = 0;
        let mut previous_free = false;
        let mut visited = 0;

        for (index, block) in self.chain.iter() {
            visited += 1;
            if visited > self.chain.slot_count() {
                return Err(PoolError::Corrupted("descriptor chain contains a cycle".into()));
            }
            if block.data_start != expected_start {
                return Err(PoolError::Corrupted(format!(
                    "descriptor {index} starts at {} but the previous one ends at {expected_start}",
                    block.data_start
                )));
            }
            if block.size == 0 {
                return Err(PoolError::Corrupted(format!(
                    "descriptor {index} at {} is empty",
                    block.data_start
                )));
            }
            if previous_free && block.is_free() {
                return Err(PoolError::Corrupted(format!(
                    "free descriptor {index} at {} follows another free descriptor",
                    block.data_start
                )));
            }
            previous_free = block.is_free();
            expected_start = block.end();
        }

        if expected_start != self.capacity() {
            return Err(PoolError::Corrupted(format!(
                "spans cover {expected_start} of {} bytes",
                self.capacity()
            )));
        }
        if visited != self.chain.len() {
            return Err(PoolError::Corrupted(format!(
                "{visited} descriptors reachable but {} recorded",
                self.chain.len()
            )));
        }
        Ok(())
    }

    /// Rebuilds a handle from an offset stored inside the arena.
    pub(crate) fn handle_at(&self, offset: usize) -> BlockHandle {
        BlockHandle::new(self.id, offset)
    }

    fn lookup(&self, handle: BlockHandle) -> Option<BlockIndex> {
        self.locate(handle).map(|(_, index)| index)
    }

    fn locate(&self, handle: BlockHandle) -> Option<(Option<BlockIndex>, BlockIndex)> {
        if handle.pool() != self.id {
            return None;
        }
        self.chain.find_with_predecessor(handle.offset())
    }

    fn lookup_used(&self, handle: BlockHandle) -> Option<BlockIndex> {
        self.lookup(handle)
            .filter(|&index| !self.chain.get(index).is_free())
    }
}

impl std::fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("blocks", &self.blocks().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn layout(pool: &PoolAllocator) -> Vec<(usize, usize, BlockState)> {
        pool.blocks().map(|b| (b.offset, b.size, b.state)).collect()
    }

    #[test]
    fn test_new_pool_is_one_free_block() {
        let pool = PoolAllocator::new(1024).unwrap();
        assert_eq!(pool.capacity(), 1024);
        assert_eq!(layout(&pool), vec![(0, 1024, BlockState::Free)]);
        pool.verify().unwrap();
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(PoolAllocator::new(0).unwrap_err(), PoolError::InvalidCapacity);
    }

    #[test]
    fn test_unreservable_arena_reported() {
        let err = PoolAllocator::new(usize::MAX).unwrap_err();
        assert_eq!(err, PoolError::ArenaReservation { capacity: usize::MAX });
    }

    #[test]
    fn test_zero_size_request_rejected() {
        let mut pool = PoolAllocator::new(64).unwrap();
        assert_eq!(pool.alloc(0).unwrap_err(), PoolError::ZeroSizeRequest);
        assert_eq!(pool.stats().failed_allocations(), 1);
        assert_eq!(layout(&pool), vec![(0, 64, BlockState::Free)]);
    }

    #[test]
    fn test_exact_fit_does_not_split() {
        let mut pool = PoolAllocator::new(100).unwrap();
        let handle = pool.alloc(100).unwrap();
        assert_eq!(handle.offset(), 0);
        assert_eq!(layout(&pool), vec![(0, 100, BlockState::Used)]);
        assert_eq!(pool.stats().splits(), 0);
    }

    #[test]
    fn test_smaller_request_splits() {
        let mut pool = PoolAllocator::new(100).unwrap();
        pool.alloc(30).unwrap();
        assert_eq!(
            layout(&pool),
            vec![(0, 30, BlockState::Used), (30, 70, BlockState::Free)]
        );
        assert_eq!(pool.stats().splits(), 1);
        pool.verify().unwrap();
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = PoolAllocator::new(256).unwrap();
        assert_eq!(
            pool.alloc(257).unwrap_err(),
            PoolError::NoSpace {
                requested: 257,
                largest_free: 256
            }
        );
        let handle = pool.alloc(256).unwrap();
        assert_eq!(handle.offset(), 0);
        assert!(matches!(pool.alloc(1), Err(PoolError::NoSpace { .. })));
    }

    #[test]
    fn test_first_fit_picks_lowest_address() {
        let mut pool = PoolAllocator::new(100).unwrap();
        let a = pool.alloc(20).unwrap();
        let _b = pool.alloc(10).unwrap();
        let c = pool.alloc(40).unwrap();
        let _d = pool.alloc(10).unwrap();
        pool.free(a).unwrap();
        pool.free(c).unwrap();

        // Both the 20 byte hole and the 40 byte hole fit; first-fit takes the
        // lower one even though the later hole is not a better match.
        let e = pool.alloc(15).unwrap();
        assert_eq!(e.offset(), 0);
    }

    #[test]
    fn test_alloc_free_round_trip_restores_layout() {
        let mut pool = PoolAllocator::new(100).unwrap();
        pool.alloc(10).unwrap();
        let before = layout(&pool);

        let handle = pool.alloc(20).unwrap();
        pool.free(handle).unwrap();

        assert_eq!(layout(&pool), before);
    }

    #[test]
    fn test_fragmentation_is_not_healed() {
        let mut pool = PoolAllocator::new(100).unwrap();
        let a = pool.alloc(30).unwrap();
        let _b = pool.alloc(40).unwrap();
        let c = pool.alloc(30).unwrap();
        pool.free(a).unwrap();
        pool.free(c).unwrap();

        assert_eq!(pool.free_bytes(), 60);
        assert_eq!(
            pool.alloc(40).unwrap_err(),
            PoolError::NoSpace {
                requested: 40,
                largest_free: 30
            }
        );
        pool.verify().unwrap();
    }

    #[test]
    fn test_coalescing_three_blocks() {
        let mut pool = PoolAllocator::new(90).unwrap();
        let a = pool.alloc(30).unwrap();
        let b = pool.alloc(30).unwrap();
        let c = pool.alloc(30).unwrap();

        pool.free(a).unwrap();
        pool.free(c).unwrap();
        assert_eq!(
            layout(&pool),
            vec![
                (0, 30, BlockState::Free),
                (30, 30, BlockState::Used),
                (60, 30, BlockState::Free),
            ]
        );

        // The middle block merges forward into the third and is then absorbed
        // by the free first block.
        pool.free(b).unwrap();
        assert_eq!(layout(&pool), vec![(0, 90, BlockState::Free)]);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.stats().merges(), 2);
        pool.verify().unwrap();
    }

    #[test]
    fn test_free_absorbs_whole_free_run() {
        let mut pool = PoolAllocator::new(100).unwrap();
        let a = pool.alloc(25).unwrap();
        let b = pool.alloc(25).unwrap();
        let _c = pool.alloc(25).unwrap();
        pool.free(b).unwrap();
        pool.free(a).unwrap();

        assert_eq!(
            layout(&pool),
            vec![
                (0, 50, BlockState::Free),
                (50, 25, BlockState::Used),
                (75, 25, BlockState::Free),
            ]
        );
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let a = pool.alloc(16).unwrap();
        let _b = pool.alloc(16).unwrap();
        pool.free(a).unwrap();
        let before = layout(&pool);

        assert_eq!(pool.free(a).unwrap_err(), PoolError::DoubleFree { offset: 0 });
        assert_eq!(layout(&pool), before);
        assert_eq!(pool.stats().rejected_frees(), 1);
        pool.verify().unwrap();
    }

    #[test]
    fn test_stale_handle_names_reused_offset() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let stale = pool.alloc(16).unwrap();
        let _b = pool.alloc(16).unwrap();
        pool.free(stale).unwrap();

        // Handles carry no generation: the next block at offset 0 is
        // indistinguishable from the freed one.
        let reused = pool.alloc(8).unwrap();
        assert_eq!(reused, stale);
        pool.free(stale).unwrap();
        assert_eq!(pool.free(reused).unwrap_err(), PoolError::DoubleFree { offset: 0 });
        pool.verify().unwrap();
    }

    #[traced_test]
    #[test]
    fn test_rejected_frees_are_logged() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let handle = pool.alloc(16).unwrap();
        pool.free(handle).unwrap();
        let _ = pool.free(handle);
        let _ = pool.free(pool.handle_at(40));

        assert!(logs_contain("block is already free"));
        assert!(logs_contain("free of a block not allocated from this pool"));
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let mut other = PoolAllocator::new(64).unwrap();
        let _own = pool.alloc(16).unwrap();
        let foreign = other.alloc(16).unwrap();

        // Same offset, different pool.
        assert_eq!(
            pool.free(foreign).unwrap_err(),
            PoolError::UnknownBlock { offset: 0 }
        );
        pool.verify().unwrap();

        let interior = BlockHandle::new(pool.id(), 5);
        assert_eq!(
            pool.free(interior).unwrap_err(),
            PoolError::UnknownBlock { offset: 5 }
        );
        pool.verify().unwrap();
        assert_eq!(pool.live_blocks(), 1);
    }

    #[test]
    fn test_resize_none_allocates() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let handle = pool.resize(None, 24).unwrap();
        assert_eq!(handle.offset(), 0);
        assert_eq!(pool.bytes(handle).unwrap().len(), 24);
    }

    #[test]
    fn test_resize_never_shrinks() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let handle = pool.alloc(32).unwrap();
        assert_eq!(pool.resize(Some(handle), 8).unwrap(), handle);
        assert_eq!(pool.resize(Some(handle), 32).unwrap(), handle);
        assert_eq!(pool.bytes(handle).unwrap().len(), 32);
    }

    #[test]
    fn test_resize_growth_copies_data() {
        let mut pool = PoolAllocator::new(128).unwrap();
        let small = pool.alloc(8).unwrap();
        let _guard = pool.alloc(8).unwrap();
        pool.bytes_mut(small)
            .unwrap()
            .copy_from_slice(b"blockpoo");

        let grown = pool.resize(Some(small), 32).unwrap();
        assert_ne!(grown, small);
        assert_eq!(&pool.bytes(grown).unwrap()[..8], b"blockpoo");
        assert_eq!(pool.bytes(grown).unwrap().len(), 32);

        // The old span is free again.
        assert!(pool.blocks().any(|b| b.offset == 0 && b.is_free()));
        assert_eq!(
            pool.bytes(small).unwrap_err(),
            PoolError::UnknownBlock { offset: 0 }
        );
        pool.verify().unwrap();
    }

    #[test]
    fn test_failed_resize_keeps_original() {
        let mut pool = PoolAllocator::new(32).unwrap();
        let handle = pool.alloc(16).unwrap();
        pool.bytes_mut(handle).unwrap().fill(0xAB);
        let before = layout(&pool);

        assert!(matches!(
            pool.resize(Some(handle), 24),
            Err(PoolError::NoSpace { .. })
        ));
        assert_eq!(layout(&pool), before);
        assert!(pool.bytes(handle).unwrap().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_resize_unknown_handle() {
        let mut pool = PoolAllocator::new(32).unwrap();
        let handle = pool.alloc(8).unwrap();
        pool.free(handle).unwrap();
        let before = layout(&pool);

        assert_eq!(
            pool.resize(Some(handle), 16).unwrap_err(),
            PoolError::UnknownBlock { offset: 0 }
        );
        assert_eq!(layout(&pool), before);
    }

    #[test]
    fn test_deinit_reports_leaks() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let a = pool.alloc(10).unwrap();
        pool.alloc(20).unwrap();
        pool.free(a).unwrap();

        let summary = pool.deinit();
        assert_eq!(summary.capacity, 64);
        assert_eq!(summary.leaked_blocks, 1);
        assert_eq!(summary.leaked_bytes, 20);
        assert_eq!(summary.stats.allocations, 2);
        assert_eq!(summary.stats.frees, 1);
    }

    #[test]
    fn test_byte_accounting() {
        let mut pool = PoolAllocator::new(100).unwrap();
        let a = pool.alloc(10).unwrap();
        pool.alloc(20).unwrap();
        assert_eq!(pool.used_bytes(), 30);
        assert_eq!(pool.free_bytes(), 70);
        assert_eq!(pool.largest_free_block(), 70);
        pool.free(a).unwrap();
        assert_eq!(pool.live_blocks(), 1);
        assert_eq!(pool.block_count(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Alloc(usize),
        Free(usize),
        Resize(usize, usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..64).prop_map(Op::Alloc),
            any::<usize>().prop_map(Op::Free),
            (any::<usize>(), 1usize..96).prop_map(|(i, n)| Op::Resize(i, n)),
        ]
    }

    proptest! {
        #[test]
        fn random_operations_preserve_invariants(
            ops in prop::collection::vec(op_strategy(), 1..200)
        ) {
            let mut pool = PoolAllocator::new(512).unwrap();
            let mut live: Vec<(BlockHandle, usize)> = Vec::new();

            for op in ops {
                match op {
                    Op::Alloc(size) => {
                        if let Ok(handle) = pool.alloc(size) {
                            live.push((handle, size));
                        }
                    }
                    Op::Free(i) if !live.is_empty() => {
                        let (handle, _) = live.swap_remove(i % live.len());
                        prop_assert!(pool.free(handle).is_ok());
                    }
                    Op::Resize(i, size) if !live.is_empty() => {
                        let slot = i % live.len();
                        let (handle, requested) = live[slot];
                        if let Ok(moved) = pool.resize(Some(handle), size) {
                            live[slot] = (moved, requested.max(size));
                        }
                    }
                    _ => {}
                }

                prop_assert!(pool.verify().is_ok(), "{:?}", pool.verify());
                for (handle, requested) in &live {
                    prop_assert!(pool.bytes(*handle).unwrap().len() >= *requested);
                }
                let live_bytes: usize = live
                    .iter()
                    .map(|(h, _)| pool.bytes(*h).unwrap().len())
                    .sum();
                prop_assert_eq!(pool.used_bytes(), live_bytes);
            }
        }
    }
}
