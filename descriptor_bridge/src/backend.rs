//! Outbound interface to the low-level graphics API
//!
//! The core computes what to create and which physical descriptors to
//! update; a `DeviceBackend` performs the calls. Implementations must be
//! callable from any thread.

use std::sync::atomic::AtomicU64;

use crate::bindless::{BindlessSetInfo, MAX_BINDLESS_DESCRIPTOR_SETS};
use crate::config::DeviceCaps;
use crate::descriptor::{BufferBinding, DescriptorType};
use crate::error::{Error, Result};
use crate::handle::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, SetLayoutHandle, ViewHandle,
};
use crate::heap::HeapKind;
use crate::sampler::SamplerInfo;
use crate::view::ViewKind;
use crate::view_key::{BufferViewDesc, ImageViewDesc};

/// Layout a sampled or storage image is accessed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    General,
    ShaderReadOnly,
    DepthStencilReadOnly,
}

/// Value written into one physical descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePayload {
    /// Null descriptor of the write's descriptor type
    Null,
    Buffer(BufferBinding),
    TexelBuffer(ViewHandle),
    Image { view: ViewHandle, layout: ImageLayout },
    Sampler(ViewHandle),
}

/// One physical descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub array_element: u32,
    /// Never `DescriptorType::Mutable`
    pub descriptor_type: DescriptorType,
    pub payload: WritePayload,
}

/// Physical descriptor-to-descriptor copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCopy {
    pub src_set: DescriptorSetHandle,
    pub src_binding: u32,
    pub src_array_element: u32,
    pub dst_set: DescriptorSetHandle,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub count: u32,
}

/// Host-visible side tables of a heap, shared with the device
///
/// `raw_va` holds one word per slot, `buffer_ranges` two words per slot
/// (see `BoundBufferRange`). Either may be empty.
pub trait HostTables: Send + Sync {
    fn raw_va(&self) -> &[AtomicU64];
    fn buffer_ranges(&self) -> &[AtomicU64];
}

/// Request for the physical storage behind one heap
#[derive(Debug, Clone, Copy)]
pub struct HeapStorageDesc<'a> {
    pub kind: HeapKind,
    pub capacity: u32,
    pub shader_visible: bool,
    pub heap_cookie: u64,
    /// `(set info index, set info)` for every set of this heap kind
    pub sets: &'a [(usize, BindlessSetInfo)],
    pub raw_va_words: usize,
    pub buffer_range_words: usize,
}

/// Physical storage behind one heap
///
/// Every array element of the non-sampler sets holds a null descriptor and
/// side tables are already bound to their extra bindings when the backend
/// returns this.
pub struct HeapStorage {
    pub pool: Option<DescriptorPoolHandle>,
    /// Indexed by set info index, null for set infos of other heap kinds
    pub sets: [DescriptorSetHandle; MAX_BINDLESS_DESCRIPTOR_SETS],
    pub tables: Option<Box<dyn HostTables>>,
}

impl HeapStorage {
    /// Storage for heaps without physical sets (RTV/DSV, CPU-only heaps)
    pub fn empty() -> Self {
        Self {
            pool: None,
            sets: [DescriptorSetHandle::NULL; MAX_BINDLESS_DESCRIPTOR_SETS],
            tables: None,
        }
    }
}

/// Pool sizing for on-demand single-descriptor sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    pub descriptor_type: DescriptorType,
    pub descriptor_count: u32,
    pub max_sets: u32,
}

/// Outcome of a failed set allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolAllocError {
    /// Retry in a new pool
    OutOfPoolMemory,
    /// Retry in a new pool
    FragmentedPool,
    Failed(Error),
}

/// Low-level device operations required by the bridge
pub trait DeviceBackend: Send + Sync {
    fn caps(&self) -> DeviceCaps;

    fn create_buffer_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle>;
    fn create_image_view(&self, desc: &ImageViewDesc) -> Result<ViewHandle>;
    fn create_sampler(&self, info: &SamplerInfo) -> Result<ViewHandle>;
    fn create_acceleration_structure_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle>;
    fn destroy_view(&self, kind: ViewKind, handle: ViewHandle);

    fn buffer_device_address(&self, buffer: BufferHandle) -> u64;

    /// Apply all writes in one batched call
    fn write_descriptors(&self, writes: &[DescriptorWrite]);
    /// Apply all copies in one batched call
    fn copy_descriptors(&self, copies: &[DescriptorCopy]);

    fn create_heap_storage(&self, desc: &HeapStorageDesc<'_>) -> Result<HeapStorage>;
    fn destroy_heap_storage(&self, storage: HeapStorage);

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle>;
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: SetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, PoolAllocError>;
    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, set: DescriptorSetHandle);
}
