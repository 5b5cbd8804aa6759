//! ## blockpool-core::alloc::chain
//! **Block descriptor chain**
//!
//! Descriptors live in a slot table and are linked by index in ascending
//! `data_start` order. Removing a descriptor vacates its slot without moving
//! any other record, so indices held during a coalescing walk stay valid.
//! Vacated slots are reused by later splits.

use serde::{Deserialize, Serialize};

/// Stable index of a descriptor slot.
pub type BlockIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockState {
    Free,
    Used,
}

/// Metadata for one contiguous span of the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub size: usize,
    pub state: BlockState,
    pub next: Option<BlockIndex>,
    pub data_start: usize,
}

impl BlockDescriptor {
    pub fn free(data_start: usize, size: usize) -> Self {
        Self {
            size,
            state: BlockState::Free,
            next: None,
            data_start,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }

    /// One past the last byte of the span.
    #[inline]
    pub fn end(&self) -> usize {
        self.data_start + self.size
    }
}

#[derive(Debug)]
pub(crate) struct DescriptorChain {
    slots: Vec<Option<BlockDescriptor>>,
    vacant: Vec<BlockIndex>,
    head: BlockIndex,
    len: usize,
}

impl DescriptorChain {
    /// Creates a chain holding one free descriptor that spans `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Some(BlockDescriptor::free(0, capacity))],
            vacant: Vec::new(),
            head: 0,
            len: 1,
        }
    }

    /// Number of linked descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of slots ever created, vacant ones included.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn get(&self, index: BlockIndex) -> &BlockDescriptor {
        match &self.slots[index] {
            Some(descriptor) => descriptor,
            None => unreachable!("descriptor slot {index} is vacant but still linked"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, index: BlockIndex) -> &mut BlockDescriptor {
        match &mut self.slots[index] {
            Some(descriptor) => descriptor,
            None => unreachable!("descriptor slot {index} is vacant but still linked"),
        }
    }

    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            chain: self,
            cursor: Some(self.head),
        }
    }

    /// First descriptor in address order matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<BlockIndex>
    where
        P: FnMut(&BlockDescriptor) -> bool,
    {
        self.iter()
            .find(|(_, descriptor)| predicate(descriptor))
            .map(|(index, _)| index)
    }

    /// Descriptor whose span starts at `data_start`, together with the
    /// descriptor linked before it.
    pub fn find_with_predecessor(
        &self,
        data_start: usize,
    ) -> Option<(Option<BlockIndex>, BlockIndex)> {
        let mut previous = None;
        for (index, descriptor) in self.iter() {
            if descriptor.data_start == data_start {
                return Some((previous, index));
            }
            if descriptor.data_start > data_start {
                return None;
            }
            previous = Some(index);
        }
        None
    }

    /// Links `descriptor` directly after `index`, inheriting its successor.
    pub fn insert_after(
        &mut self,
        index: BlockIndex,
        mut descriptor: BlockDescriptor,
    ) -> BlockIndex {
        descriptor.next = self.get(index).next;
        let slot = match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot] = Some(descriptor);
                slot
            }
            None => {
                self.slots.push(Some(descriptor));
                self.slots.len() - 1
            }
        };
        self.get_mut(index).next = Some(slot);
        self.len += 1;
        slot
    }

    /// Merges every free successor of `index` into it. Returns how many
    /// descriptors were absorbed.
    pub fn absorb_free_successors(&mut self, index: BlockIndex) -> usize {
        let mut absorbed = 0;
        loop {
            let next = match self.get(index).next {
                Some(next) if self.get(next).is_free() => next,
                _ => break,
            };
            let successor = self.release(next);
            let descriptor = self.get_mut(index);
            descriptor.size += successor.size;
            descriptor.next = successor.next;
            absorbed += 1;
        }
        absorbed
    }

    fn release(&mut self, index: BlockIndex) -> BlockDescriptor {
        match self.slots[index].take() {
            Some(descriptor) => {
                self.vacant.push(index);
                self.len -= 1;
                descriptor
            }
            None => unreachable!("descriptor slot {index} released twice"),
        }
    }
}

pub(crate) struct ChainIter<'a> {
    chain: &'a DescriptorChain,
    cursor: Option<BlockIndex>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (BlockIndex, &'a BlockDescriptor);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let descriptor = self.chain.get(index);
        self.cursor = descriptor.next;
        Some((index, descriptor))
    }
}
