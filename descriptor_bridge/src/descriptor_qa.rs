//! Optional descriptor tracking hooks
//!
//! A `DescriptorQa` implementation observes view lifetimes and every slot
//! write or copy, e.g. to validate shader accesses offline. Hooks return
//! nothing and cannot influence the descriptor engine.

use bitflags::bitflags;

use crate::heap::HeapKind;

bitflags! {
    /// Descriptor types a slot currently satisfies
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QaTypeFlags: u32 {
        const SAMPLER = 1 << 0;
        const SAMPLED_IMAGE = 1 << 1;
        const STORAGE_IMAGE = 1 << 2;
        const UNIFORM_BUFFER = 1 << 3;
        const STORAGE_BUFFER = 1 << 4;
        const UNIFORM_TEXEL_BUFFER = 1 << 5;
        const STORAGE_TEXEL_BUFFER = 1 << 6;
        const RAW_VA = 1 << 7;
        const RT_ACCELERATION_STRUCTURE = 1 << 8;
    }
}

impl QaTypeFlags {
    /// Every resource type, reported for null descriptors
    pub fn universal_null() -> Self {
        QaTypeFlags::UNIFORM_BUFFER
            | QaTypeFlags::STORAGE_BUFFER
            | QaTypeFlags::SAMPLED_IMAGE
            | QaTypeFlags::STORAGE_IMAGE
            | QaTypeFlags::UNIFORM_TEXEL_BUFFER
            | QaTypeFlags::STORAGE_TEXEL_BUFFER
            | QaTypeFlags::RAW_VA
            | QaTypeFlags::RT_ACCELERATION_STRUCTURE
    }
}

/// Observer of descriptor activity
pub trait DescriptorQa: Send + Sync {
    /// A view was created for the object identified by `owner_cookie`
    fn register_view(&self, cookie: u64, owner_cookie: u64);

    /// A view or resource cookie is gone
    fn unregister(&self, cookie: u64);

    fn register_heap(&self, heap_cookie: u64, kind: HeapKind, capacity: u32);

    fn unregister_heap(&self, heap_cookie: u64);

    fn write_descriptor(&self, heap_cookie: u64, offset: u32, types: QaTypeFlags, bound_cookie: u64);

    fn copy_descriptor(
        &self,
        dst_heap_cookie: u64,
        dst_offset: u32,
        src_heap_cookie: u64,
        src_offset: u32,
    );
}
