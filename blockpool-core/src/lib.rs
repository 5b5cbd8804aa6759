//! # blockpool-core
//!
//! Fixed-size memory pool allocator backed by a single pre-reserved arena.
//!
//! ### Key Submodules:
//! - `alloc`: First-fit pool allocator with block splitting and coalescing
//! - `list`: Singly-linked list whose nodes live inside a pool
//!
//! ### Expectations:
//! - Zero internal fragmentation: used spans are exactly the requested size
//! - Every operation leaves the descriptor chain consistent, error paths included
//! - Bounded work per call: one scan over the live descriptors

pub mod alloc;
pub mod error;
pub mod list;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::list::*;
}

pub use alloc::{BlockHandle, PoolAllocator};
pub use error::{ListError, PoolError};
