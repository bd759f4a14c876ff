//! Logical descriptor slots
//!
//! A slot is the bridge-side record of one CBV/SRV/UAV/sampler descriptor:
//! which physical sets it was written into, what it points at and an
//! identity cookie used by the copy path to skip redundant updates.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::handle::BufferHandle;
use crate::view::ViewRef;

/// Physical descriptor types a write can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    /// Placeholder of a mutable set; replaced by a concrete type on write
    Mutable,
}

bitflags! {
    /// Per-slot state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorFlags: u32 {
        /// Payload holds a view
        const VIEW = 1 << 0;
        /// Payload holds a buffer range that must be compared on copy
        const OFFSET_RANGE = 1 << 1;
        /// The heap's buffer range side table entry is meaningful
        const BUFFER_OFFSET = 1 << 2;
        /// The heap's raw VA side table entry (or AUX set) is meaningful
        const RAW_VA_AUX_BUFFER = 1 << 3;
        const NON_NULL = 1 << 4;
    }
}

/// Range of a buffer bound directly (CBV, SSBO path)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub range: u64,
}

/// Offset correction read by shaders through the buffer range side table
///
/// Stored as two 64-bit words so that the side table can be a plain
/// `[AtomicU64]` shared with the device.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct BoundBufferRange {
    pub byte_offset: u32,
    pub byte_count: u32,
    pub element_offset: u32,
    pub element_count: u32,
}

impl BoundBufferRange {
    pub fn to_words(self) -> [u64; 2] {
        bytemuck::cast(self)
    }

    pub fn from_words(words: [u64; 2]) -> Self {
        bytemuck::cast(words)
    }
}

/// Bookkeeping compared by the copy path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorMetadata {
    /// Identity of the bound view or resource, 0 when nothing is bound
    pub cookie: u64,
    /// Bit i set when set info i holds this slot's descriptor
    pub set_info_mask: u32,
    pub flags: DescriptorFlags,
    /// Null flavour last written; `None` on devices without mutable sets
    pub current_null_type: Option<DescriptorType>,
}

/// What a slot references
#[derive(Debug, Clone, Default)]
pub struct DescriptorPayload {
    pub buffer: Option<BufferBinding>,
    pub view: Option<ViewRef>,
    /// UAV counter view when the counter goes through the AUX set
    pub counter_view: Option<ViewRef>,
}

fn same_view(a: &Option<ViewRef>, b: &Option<ViewRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for DescriptorPayload {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer
            && same_view(&self.view, &other.view)
            && same_view(&self.counter_view, &other.counter_view)
    }
}

impl Eq for DescriptorPayload {}

/// Complete logical state of one slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorState {
    pub metadata: DescriptorMetadata,
    pub payload: DescriptorPayload,
}

impl DescriptorState {
    pub fn is_null(&self) -> bool {
        !self.metadata.flags.contains(DescriptorFlags::NON_NULL)
    }
}

/// Storage for one slot inside a heap
///
/// The mutex is uncontended in correct usage: callers serialize writes to
/// the same index. It only makes overlapping misuse memory safe.
#[derive(Debug)]
pub struct DescriptorSlot {
    state: Mutex<DescriptorState>,
}

impl DescriptorSlot {
    pub(crate) fn new(set_info_mask: u32) -> Self {
        let mut state = DescriptorState::default();
        state.metadata.set_info_mask = set_info_mask;
        Self { state: Mutex::new(state) }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DescriptorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> DescriptorState {
        self.lock().clone()
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
