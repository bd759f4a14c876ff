//! GPU virtual address lookup
//!
//! Maps every live buffer's device address range back to the buffer, so
//! that descriptors described by raw addresses (CBVs, acceleration
//! structures, root descriptors) can find what they point into.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::handle::BufferHandle;

/// Device address range of one registered buffer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaRange {
    pub buffer: BufferHandle,
    /// First device address of the resource
    pub va: u64,
    pub size: u64,
    /// Offset of the resource inside `buffer`
    pub memory_offset: u64,
    /// Cookie of the owning resource
    pub cookie: u64,
}

impl VaRange {
    pub fn contains(&self, va: u64) -> bool {
        va >= self.va && va - self.va < self.size
    }

    /// Offset of `va` from the start of the resource
    pub fn resource_offset(&self, va: u64) -> u64 {
        va - self.va
    }

    /// Offset of `va` from the start of the underlying buffer object
    pub fn buffer_offset(&self, va: u64) -> u64 {
        self.memory_offset + self.resource_offset(va)
    }
}

#[derive(Debug, Default)]
pub struct VaMap {
    ranges: RwLock<BTreeMap<u64, VaRange>>,
}

impl VaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, range: VaRange) {
        let mut ranges = self.ranges.write().unwrap_or_else(PoisonError::into_inner);
        ranges.insert(range.va, range);
    }

    pub fn remove(&self, va: u64) -> Option<VaRange> {
        let mut ranges = self.ranges.write().unwrap_or_else(PoisonError::into_inner);
        ranges.remove(&va)
    }

    /// Range containing `va`, if any
    pub fn lookup(&self, va: u64) -> Option<VaRange> {
        let ranges = self.ranges.read().unwrap_or_else(PoisonError::into_inner);
        ranges
            .range(..=va)
            .next_back()
            .map(|(_, range)| *range)
            .filter(|range| range.contains(va))
    }

    pub fn len(&self) -> usize {
        self.ranges.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "va_map_tests.rs"]
mod tests;
