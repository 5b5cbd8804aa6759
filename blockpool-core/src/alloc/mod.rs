//! ## blockpool-core::alloc
//! **First-fit pool allocator over a single fixed arena**
//!
//! ### Expectations:
//! - No per-request calls into the system allocator for data bytes
//! - Used spans are exactly the requested size (no internal fragmentation)
//! - Adjacent free spans are merged on every free
//! - Caller errors (double free, foreign handles) never corrupt the chain
//!
//! ### Key Submodules:
//! - `chain/`: Index-linked block descriptors in address order
//! - `handle/`: Opaque handles returned to callers
//! - `pool/`: The allocator itself
//! - `stats/`: Operation counters

pub mod chain;
pub mod handle;
pub mod pool;
pub mod stats;

pub use chain::{BlockIndex, BlockState};
pub use handle::{BlockHandle, BlockInfo, PoolId};
pub use pool::{PoolAllocator, PoolSummary};
pub use stats::{MemoryStats, StatsSnapshot};
