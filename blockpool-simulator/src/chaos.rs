//! Chaos module.
//!
//! Fault injection for simulated workloads. Faults hand the pool handles it
//! must refuse; the simulator then checks the refusal and the chain.

use rand::Rng;

use blockpool_core::{BlockHandle, PoolAllocator, PoolError};

const RETIRED_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Free a handle that was already freed.
    DoubleFree,
    /// Free a handle issued by a different pool.
    ForeignHandle,
}

impl Fault {
    pub fn name(&self) -> &'static str {
        match self {
            Fault::DoubleFree => "double_free",
            Fault::ForeignHandle => "foreign_handle",
        }
    }

    /// Whether `err` is an acceptable rejection for this fault. A freed span
    /// may since have been absorbed by a neighbour, in which case its offset
    /// no longer names any descriptor.
    pub fn is_expected(&self, err: &PoolError) -> bool {
        match self {
            Fault::DoubleFree => matches!(
                err,
                PoolError::DoubleFree { .. } | PoolError::UnknownBlock { .. }
            ),
            Fault::ForeignHandle => matches!(err, PoolError::UnknownBlock { .. }),
        }
    }
}

pub struct ChaosEngine {
    decoy: PoolAllocator,
    decoy_handle: BlockHandle,
    retired: Vec<BlockHandle>,
}

impl ChaosEngine {
    pub fn new() -> Result<Self, PoolError> {
        let mut decoy = PoolAllocator::new(16)?;
        let decoy_handle = decoy.alloc(8)?;
        Ok(Self {
            decoy,
            decoy_handle,
            retired: Vec::new(),
        })
    }

    /// Remembers a freed handle as a double-free candidate.
    pub fn retire(&mut self, handle: BlockHandle) {
        if self.retired.len() == RETIRED_LIMIT {
            self.retired.remove(0);
        }
        self.retired.push(handle);
    }

    /// Injects one fault into `pool`. `is_live` must report whether an offset
    /// currently starts a block the workload still owns; those handles are
    /// never used for double frees since freeing them would succeed.
    pub fn inject<R, F>(
        &mut self,
        rng: &mut R,
        pool: &mut PoolAllocator,
        is_live: F,
    ) -> (Fault, Result<(), PoolError>)
    where
        R: Rng,
        F: Fn(usize) -> bool,
    {
        let stale: Vec<BlockHandle> = self
            .retired
            .iter()
            .copied()
            .filter(|handle| !is_live(handle.offset()))
            .collect();

        if !stale.is_empty() && rng.random_bool(0.5) {
            let handle = stale[rng.random_range(0..stale.len())];
            (Fault::DoubleFree, pool.free(handle))
        } else {
            (Fault::ForeignHandle, pool.free(self.decoy_handle))
        }
    }

    /// Pool the foreign handles come from.
    pub fn decoy(&self) -> &PoolAllocator {
        &self.decoy
    }
}
