//! ## blockpool-core::list
//! **Singly-linked list stored inside a memory pool**
//!
//! Each element is one fixed-size node allocated with
//! [`PoolAllocator::alloc`] and released with [`PoolAllocator::free`]. The
//! node bytes live in the arena: a little-endian `u16` payload followed by the
//! little-endian arena offset of the successor (`u64::MAX` when there is none).
//!
//! The list only remembers its head; the pool is passed to every call.

use std::fmt;

use crate::alloc::{BlockHandle, PoolAllocator};
use crate::error::{ListError, PoolError};

/// Bytes occupied by one node.
pub const NODE_SIZE: usize = 10;

const NIL: u64 = u64::MAX;

/// A node of a [`PoolList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(BlockHandle);

impl NodeRef {
    pub fn handle(&self) -> BlockHandle {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct PoolList {
    head: Option<NodeRef>,
}

impl PoolList {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn head(&self) -> Option<NodeRef> {
        self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Appends `data` at the tail.
    pub fn insert(&mut self, pool: &mut PoolAllocator, data: u16) -> Result<NodeRef, ListError> {
        let tail = match self.head {
            None => None,
            Some(head) => {
                let mut current = head;
                while let Some(next) = next_of(pool, current)? {
                    current = next;
                }
                Some(current)
            }
        };

        let node = new_node(pool, data, None)?;
        match tail {
            None => self.head = Some(node),
            Some(tail) => set_next(pool, tail, Some(node))?,
        }
        Ok(node)
    }

    /// Inserts `data` directly after `node`.
    pub fn insert_after(
        &mut self,
        pool: &mut PoolAllocator,
        node: NodeRef,
        data: u16,
    ) -> Result<NodeRef, ListError> {
        if !self.contains(pool, node)? {
            return Err(ListError::ForeignNode(node.0.offset()));
        }
        let successor = next_of(pool, node)?;
        let inserted = new_node(pool, data, successor)?;
        set_next(pool, node, Some(inserted))?;
        Ok(inserted)
    }

    /// Inserts `data` directly before `node`, which becomes the new head when
    /// it was the head.
    pub fn insert_before(
        &mut self,
        pool: &mut PoolAllocator,
        node: NodeRef,
        data: u16,
    ) -> Result<NodeRef, ListError> {
        if self.head == Some(node) {
            let inserted = new_node(pool, data, Some(node))?;
            self.head = Some(inserted);
            return Ok(inserted);
        }

        let Some(previous) = self.predecessor(pool, node)? else {
            return Err(ListError::ForeignNode(node.0.offset()));
        };
        let inserted = new_node(pool, data, Some(node))?;
        set_next(pool, previous, Some(inserted))?;
        Ok(inserted)
    }

    /// Unlinks and frees the first node holding `data`.
    pub fn delete(&mut self, pool: &mut PoolAllocator, data: u16) -> Result<(), ListError> {
        let Some(head) = self.head else {
            return Err(ListError::Empty);
        };

        let mut previous: Option<NodeRef> = None;
        let mut cursor = Some(head);
        while let Some(current) = cursor {
            let (value, next) = read_node(pool, current)?;
            if value == data {
                match previous {
                    None => self.head = next,
                    Some(previous) => set_next(pool, previous, next)?,
                }
                pool.free(current.0)?;
                return Ok(());
            }
            previous = Some(current);
            cursor = next;
        }
        Err(ListError::NotFound(data))
    }

    /// First node holding `data`.
    pub fn search(&self, pool: &PoolAllocator, data: u16) -> Result<Option<NodeRef>, ListError> {
        for entry in self.nodes(pool) {
            let (node, value) = entry?;
            if value == data {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    pub fn count(&self, pool: &PoolAllocator) -> Result<usize, ListError> {
        self.nodes(pool).try_fold(0, |count, entry| entry.map(|_| count + 1))
    }

    /// Payloads in list order.
    pub fn values(&self, pool: &PoolAllocator) -> Result<Vec<u16>, ListError> {
        self.nodes(pool)
            .map(|entry| entry.map(|(_, value)| value))
            .collect()
    }

    /// Walks the list from the head.
    pub fn nodes<'a>(&self, pool: &'a PoolAllocator) -> Nodes<'a> {
        Nodes {
            pool,
            cursor: self.head,
        }
    }

    /// Renders the whole list as `[a, b, c]`.
    pub fn display<'a>(&self, pool: &'a PoolAllocator) -> ListDisplay<'a> {
        self.display_range(pool, None, None)
    }

    /// Renders the nodes from `start` to `end`, both inclusive. A missing
    /// `start` means the head, a missing `end` means the tail.
    pub fn display_range<'a>(
        &self,
        pool: &'a PoolAllocator,
        start: Option<NodeRef>,
        end: Option<NodeRef>,
    ) -> ListDisplay<'a> {
        ListDisplay {
            pool,
            start: start.or(self.head),
            end,
        }
    }

    /// Frees every node and empties the list. Returns the number of nodes
    /// released.
    pub fn cleanup(&mut self, pool: &mut PoolAllocator) -> Result<usize, ListError> {
        let mut released = 0;
        let mut cursor = self.head.take();
        while let Some(current) = cursor {
            cursor = next_of(pool, current)?;
            pool.free(current.0)?;
            released += 1;
        }
        Ok(released)
    }

    fn contains(&self, pool: &PoolAllocator, node: NodeRef) -> Result<bool, ListError> {
        for entry in self.nodes(pool) {
            if entry?.0 == node {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn predecessor(
        &self,
        pool: &PoolAllocator,
        node: NodeRef,
    ) -> Result<Option<NodeRef>, ListError> {
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let next = next_of(pool, current)?;
            if next == Some(node) {
                return Ok(Some(current));
            }
            cursor = next;
        }
        Ok(None)
    }
}

/// Iterator over `(node, payload)` pairs; yields an error once and stops if
/// a node cannot be read.
pub struct Nodes<'a> {
    pool: &'a PoolAllocator,
    cursor: Option<NodeRef>,
}

impl Iterator for Nodes<'_> {
    type Item = Result<(NodeRef, u16), ListError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        match read_node(self.pool, current) {
            Ok((value, next)) => {
                self.cursor = next;
                Some(Ok((current, value)))
            }
            Err(err) => {
                self.cursor = None;
                Some(Err(err))
            }
        }
    }
}

pub struct ListDisplay<'a> {
    pool: &'a PoolAllocator,
    start: Option<NodeRef>,
    end: Option<NodeRef>,
}

impl fmt::Display for ListDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut cursor = self.start;
        let mut first = true;
        while let Some(current) = cursor {
            let (value, next) = read_node(self.pool, current).map_err(|_| fmt::Error)?;
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
            first = false;
            if Some(current) == self.end {
                break;
            }
            cursor = next;
        }
        f.write_str("]")
    }
}

fn new_node(
    pool: &mut PoolAllocator,
    data: u16,
    next: Option<NodeRef>,
) -> Result<NodeRef, ListError> {
    let node = NodeRef(pool.alloc(NODE_SIZE)?);
    write_node(pool, node, data, next)?;
    Ok(node)
}

fn node_bytes(pool: &PoolAllocator, node: NodeRef) -> Result<&[u8], ListError> {
    let bytes = pool.bytes(node.0)?;
    if bytes.len() != NODE_SIZE {
        return Err(ListError::ForeignNode(node.0.offset()));
    }
    Ok(bytes)
}

fn read_node(pool: &PoolAllocator, node: NodeRef) -> Result<(u16, Option<NodeRef>), ListError> {
    let bytes = node_bytes(pool, node)?;
    let value = u16::from_le_bytes([bytes[0], bytes[1]]);
    let mut raw_next = [0u8; 8];
    raw_next.copy_from_slice(&bytes[2..NODE_SIZE]);

    let next = match u64::from_le_bytes(raw_next) {
        NIL => None,
        offset => {
            let offset = usize::try_from(offset).map_err(|_| {
                PoolError::Corrupted(format!("node successor offset {offset} out of range"))
            })?;
            Some(NodeRef(pool.handle_at(offset)))
        }
    };
    Ok((value, next))
}

fn next_of(pool: &PoolAllocator, node: NodeRef) -> Result<Option<NodeRef>, ListError> {
    read_node(pool, node).map(|(_, next)| next)
}

fn write_node(
    pool: &mut PoolAllocator,
    node: NodeRef,
    data: u16,
    next: Option<NodeRef>,
) -> Result<(), ListError> {
    let bytes = pool.bytes_mut(node.0)?;
    if bytes.len() != NODE_SIZE {
        return Err(ListError::ForeignNode(node.0.offset()));
    }
    bytes[..2].copy_from_slice(&data.to_le_bytes());
    bytes[2..].copy_from_slice(&encode_next(next).to_le_bytes());
    Ok(())
}

fn set_next(
    pool: &mut PoolAllocator,
    node: NodeRef,
    next: Option<NodeRef>,
) -> Result<(), ListError> {
    let bytes = pool.bytes_mut(node.0)?;
    if bytes.len() != NODE_SIZE {
        return Err(ListError::ForeignNode(node.0.offset()));
    }
    bytes[2..].copy_from_slice(&encode_next(next).to_le_bytes());
    Ok(())
}

fn encode_next(next: Option<NodeRef>) -> u64 {
    next.map_or(NIL, |node| node.0.offset() as u64)
}
