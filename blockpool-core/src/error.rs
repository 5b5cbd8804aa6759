use thiserror::Error;

/// Errors reported by [`PoolAllocator`](crate::alloc::PoolAllocator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool capacity must be greater than zero")]
    InvalidCapacity,

    #[error("Failed to reserve a {capacity} byte arena")]
    ArenaReservation { capacity: usize },

    #[error("Zero-size allocation requests are rejected")]
    ZeroSizeRequest,

    #[error("No free block can hold {requested} bytes (largest free block: {largest_free})")]
    NoSpace {
        requested: usize,
        largest_free: usize,
    },

    #[error("Block at offset {offset} was not allocated from this pool")]
    UnknownBlock { offset: usize },

    #[error("Block at offset {offset} is already free")]
    DoubleFree { offset: usize },

    #[error("Descriptor chain corrupted: {0}")]
    Corrupted(String),
}

impl PoolError {
    /// Short stable name of the error variant, used as a metrics label and
    /// in scenario expectations.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::InvalidCapacity => "invalid_capacity",
            PoolError::ArenaReservation { .. } => "arena_reservation",
            PoolError::ZeroSizeRequest => "zero_size",
            PoolError::NoSpace { .. } => "no_space",
            PoolError::UnknownBlock { .. } => "unknown_block",
            PoolError::DoubleFree { .. } => "double_free",
            PoolError::Corrupted(_) => "corrupted",
        }
    }
}

/// Errors reported by [`PoolList`](crate::list::PoolList).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("List is empty")]
    Empty,

    #[error("Value {0} not found in list")]
    NotFound(u16),

    #[error("Node at offset {0} is not part of this list")]
    ForeignNode(usize),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}
