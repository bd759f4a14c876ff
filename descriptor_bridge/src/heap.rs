//! Descriptor heaps
//!
//! A heap is a fixed array of logical slots. Bindless heaps (CBV/SRV/UAV
//! and sampler) are backed by one physical descriptor set per set info
//! of their kind plus optional host side tables; RTV/DSV heaps are plain
//! CPU records consumed at render-pass setup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arrayvec::ArrayVec;

use crate::backend::{DescriptorWrite, HeapStorage, HeapStorageDesc, WritePayload};
use crate::bindless::{BindlessFlags, MAX_BINDLESS_DESCRIPTOR_SETS};
use crate::context::DeviceContext;
use crate::descriptor::{BoundBufferRange, DescriptorSlot, DescriptorState, DescriptorType};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::handle::DescriptorSetHandle;
use crate::resource::Resource;
use crate::view::ViewRef;
use crate::{bridge_bail, bridge_debug, bridge_error};

const SOURCE: &str = "bridge::DescriptorHeap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    CbvSrvUav,
    Sampler,
    Rtv,
    Dsv,
}

impl HeapKind {
    /// Backed by physical descriptor sets
    pub fn is_bindless(self) -> bool {
        matches!(self, HeapKind::CbvSrvUav | HeapKind::Sampler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapDesc {
    pub kind: HeapKind,
    pub capacity: u32,
    pub shader_visible: bool,
}

#[derive(Debug, Clone, Copy)]
struct NullWrite {
    set: DescriptorSetHandle,
    binding: u32,
    descriptor_type: DescriptorType,
}

/// Writes resetting one slot to null in every physical set of the heap
#[derive(Debug, Clone, Default)]
pub(crate) struct NullTemplate {
    writes: ArrayVec<NullWrite, MAX_BINDLESS_DESCRIPTOR_SETS>,
    set_info_mask: u32,
    has_mutable_descriptors: bool,
}

impl NullTemplate {
    pub(crate) fn set_info_mask(&self) -> u32 {
        self.set_info_mask
    }

    /// Null flavour recorded for a request of `null_type`
    ///
    /// Without mutable sets every physical set has a fixed type, so all
    /// null requests are equivalent.
    pub(crate) fn null_tag(&self, null_type: DescriptorType) -> Option<DescriptorType> {
        self.has_mutable_descriptors.then_some(null_type)
    }

    pub(crate) fn writes_for(
        &self,
        index: u32,
        null_type: DescriptorType,
    ) -> ArrayVec<DescriptorWrite, MAX_BINDLESS_DESCRIPTOR_SETS> {
        self.writes
            .iter()
            .map(|write| DescriptorWrite {
                set: write.set,
                binding: write.binding,
                array_element: index,
                descriptor_type: match write.descriptor_type {
                    DescriptorType::Mutable => null_type,
                    other => other,
                },
                payload: WritePayload::Null,
            })
            .collect()
    }
}

/// Render target or depth-stencil slot
#[derive(Debug, Clone)]
pub struct RtvDescriptor {
    pub view: Option<ViewRef>,
    pub resource: Option<Arc<Resource>>,
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub layer_count: u32,
}

impl Default for RtvDescriptor {
    fn default() -> Self {
        Self {
            view: None,
            resource: None,
            format: Format::Unknown,
            width: 0,
            height: 0,
            sample_count: 0,
            layer_count: 0,
        }
    }
}

impl RtvDescriptor {
    pub fn is_null(&self) -> bool {
        self.view.is_none()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RtvSlot {
    state: Mutex<RtvDescriptor>,
}

impl RtvSlot {
    pub(crate) fn lock(&self) -> MutexGuard<'_, RtvDescriptor> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct DescriptorHeap {
    ctx: Arc<DeviceContext>,
    kind: HeapKind,
    capacity: u32,
    cookie: u64,
    shader_visible: bool,
    slots: Box<[DescriptorSlot]>,
    rtv_slots: Box<[RtvSlot]>,
    storage: Option<HeapStorage>,
    null_template: NullTemplate,
}

impl DescriptorHeap {
    pub(crate) fn new(ctx: &Arc<DeviceContext>, desc: &HeapDesc) -> Result<Arc<DescriptorHeap>> {
        if desc.shader_visible && !desc.kind.is_bindless() {
            bridge_bail!(InvalidArgument, SOURCE,
                "{:?} descriptor heaps cannot be shader visible", desc.kind);
        }

        let slot_size = match desc.kind {
            HeapKind::CbvSrvUav | HeapKind::Sampler => std::mem::size_of::<DescriptorSlot>(),
            HeapKind::Rtv | HeapKind::Dsv => std::mem::size_of::<RtvSlot>(),
        };
        let max_capacity = u32::MAX as usize / slot_size;
        if desc.capacity as usize > max_capacity {
            bridge_error!(SOURCE,
                "Invalid descriptor count {} (max {})", desc.capacity, max_capacity);
            return Err(Error::OutOfMemory);
        }

        let cookie = ctx.cookies.allocate();

        let (storage, null_template) = if desc.kind.is_bindless() {
            let sets = ctx.bindless.sets_for_heap(desc.kind);
            let flags = ctx.bindless.flags();
            let capacity = desc.capacity as usize;
            let is_resource_heap = desc.kind == HeapKind::CbvSrvUav;

            let raw_va_words = if is_resource_heap && flags.contains(BindlessFlags::RAW_VA_AUX_BUFFER) {
                capacity
            } else {
                0
            };
            let buffer_range_words = if is_resource_heap
                && flags.intersects(BindlessFlags::TYPED_OFFSET_BUFFER | BindlessFlags::SSBO_OFFSET_BUFFER)
            {
                2 * capacity
            } else {
                0
            };

            let storage = ctx.backend.create_heap_storage(&HeapStorageDesc {
                kind: desc.kind,
                capacity: desc.capacity,
                shader_visible: desc.shader_visible,
                heap_cookie: cookie,
                sets: &sets,
                raw_va_words,
                buffer_range_words,
            })?;

            let mut template = NullTemplate {
                has_mutable_descriptors: ctx.bindless.has_mutable_descriptors(),
                ..Default::default()
            };
            if is_resource_heap {
                for (index, info) in &sets {
                    template.writes.push(NullWrite {
                        set: storage.sets[*index],
                        binding: info.binding_index,
                        descriptor_type: info.descriptor_type,
                    });
                    template.set_info_mask |= 1u32 << index;
                }
            }

            (Some(storage), template)
        } else {
            (None, NullTemplate::default())
        };

        let slots: Box<[DescriptorSlot]> = if desc.kind.is_bindless() {
            (0..desc.capacity)
                .map(|_| DescriptorSlot::new(null_template.set_info_mask))
                .collect()
        } else {
            Box::default()
        };
        let rtv_slots: Box<[RtvSlot]> = if desc.kind.is_bindless() {
            Box::default()
        } else {
            (0..desc.capacity).map(|_| RtvSlot::default()).collect()
        };

        ctx.notify_qa(|qa| qa.register_heap(cookie, desc.kind, desc.capacity));
        bridge_debug!(SOURCE, "Created {:?} heap {:#x} with {} descriptors{}",
            desc.kind, cookie, desc.capacity,
            if desc.shader_visible { " (shader visible)" } else { "" });

        Ok(Arc::new(DescriptorHeap {
            ctx: ctx.clone(),
            kind: desc.kind,
            capacity: desc.capacity,
            cookie,
            shader_visible: desc.shader_visible,
            slots,
            rtv_slots,
            storage,
            null_template,
        }))
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    pub(crate) fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    fn check_range(&self, index: u32, count: u32) -> Result<()> {
        if index as u64 + count as u64 > self.capacity as u64 {
            bridge_bail!(InvalidArgument, SOURCE,
                "Descriptor range {}..{} out of bounds for heap {:#x} of {} descriptors",
                index, index as u64 + count as u64, self.cookie, self.capacity);
        }
        Ok(())
    }

    /// Bounds-checked handle to a CBV/SRV/UAV or sampler slot
    pub fn slot(&self, index: u32) -> Result<DescriptorRef<'_>> {
        if !self.kind.is_bindless() {
            bridge_bail!(InvalidArgument, SOURCE, "{:?} heap has no bindless slots", self.kind);
        }
        self.check_range(index, 1)?;
        Ok(DescriptorRef { heap: self, index })
    }

    /// Bounds-checked handle to an RTV or DSV slot
    pub fn rtv_slot(&self, index: u32) -> Result<RtvRef<'_>> {
        if self.kind.is_bindless() {
            bridge_bail!(InvalidArgument, SOURCE, "{:?} heap has no RTV/DSV slots", self.kind);
        }
        self.check_range(index, 1)?;
        Ok(RtvRef { heap: self, index })
    }

    /// Physical set backing `set_info_index`, null if this heap has none
    pub fn set_handle(&self, set_info_index: usize) -> DescriptorSetHandle {
        self.storage
            .as_ref()
            .and_then(|storage| storage.sets.get(set_info_index).copied())
            .unwrap_or(DescriptorSetHandle::NULL)
    }

    pub(crate) fn descriptor_slot(&self, index: u32) -> &DescriptorSlot {
        &self.slots[index as usize]
    }

    pub(crate) fn null_template(&self) -> &NullTemplate {
        &self.null_template
    }

    /// Raw VA side table, empty when the heap has none
    pub fn raw_va_table(&self) -> &[AtomicU64] {
        self.storage
            .as_ref()
            .and_then(|storage| storage.tables.as_deref())
            .map(|tables| tables.raw_va())
            .unwrap_or(&[])
    }

    /// Buffer range side table (two words per slot), empty when absent
    pub fn buffer_range_table(&self) -> &[AtomicU64] {
        self.storage
            .as_ref()
            .and_then(|storage| storage.tables.as_deref())
            .map(|tables| tables.buffer_ranges())
            .unwrap_or(&[])
    }

    pub fn has_raw_va_table(&self) -> bool {
        !self.raw_va_table().is_empty()
    }

    pub fn raw_va(&self, index: u32) -> u64 {
        self.raw_va_table()
            .get(index as usize)
            .map_or(0, |word| word.load(Ordering::Relaxed))
    }

    pub(crate) fn store_raw_va(&self, index: u32, va: u64) {
        if let Some(word) = self.raw_va_table().get(index as usize) {
            word.store(va, Ordering::Relaxed);
        }
    }

    pub fn buffer_range(&self, index: u32) -> BoundBufferRange {
        let table = self.buffer_range_table();
        let base = 2 * index as usize;
        match (table.get(base), table.get(base + 1)) {
            (Some(lo), Some(hi)) => {
                BoundBufferRange::from_words([lo.load(Ordering::Relaxed), hi.load(Ordering::Relaxed)])
            }
            _ => BoundBufferRange::default(),
        }
    }

    pub(crate) fn store_buffer_range(&self, index: u32, range: BoundBufferRange) {
        let table = self.buffer_range_table();
        let base = 2 * index as usize;
        if let (Some(lo), Some(hi)) = (table.get(base), table.get(base + 1)) {
            let [w0, w1] = range.to_words();
            lo.store(w0, Ordering::Relaxed);
            hi.store(w1, Ordering::Relaxed);
        }
    }

    pub(crate) fn rtv(&self, index: u32) -> &RtvSlot {
        &self.rtv_slots[index as usize]
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.ctx.backend.destroy_heap_storage(storage);
        }
        self.ctx.notify_qa(|qa| qa.unregister_heap(self.cookie));
    }
}

/// One CBV/SRV/UAV or sampler slot of a heap
#[derive(Clone, Copy)]
pub struct DescriptorRef<'a> {
    heap: &'a DescriptorHeap,
    index: u32,
}

impl<'a> DescriptorRef<'a> {
    pub fn heap(&self) -> &'a DescriptorHeap {
        self.heap
    }

    /// Index of the slot inside its heap
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot `count` positions further in the same heap
    pub fn offset(&self, count: u32) -> Result<DescriptorRef<'a>> {
        self.heap.slot(self.index + count)
    }

    pub fn state(&self) -> DescriptorState {
        self.slot().state()
    }

    pub(crate) fn slot(&self) -> &'a DescriptorSlot {
        self.heap.descriptor_slot(self.index)
    }

    pub(crate) fn check_count(&self, count: u32) -> Result<()> {
        self.heap.check_range(self.index, count)
    }
}

/// One RTV or DSV slot of a heap
#[derive(Clone, Copy)]
pub struct RtvRef<'a> {
    heap: &'a DescriptorHeap,
    index: u32,
}

impl<'a> RtvRef<'a> {
    pub fn heap(&self) -> &'a DescriptorHeap {
        self.heap
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn descriptor(&self) -> RtvDescriptor {
        self.heap.rtv(self.index).lock().clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'a, RtvDescriptor> {
        self.heap.rtv(self.index).lock()
    }

    pub(crate) fn check_count(&self, count: u32) -> Result<()> {
        self.heap.check_range(self.index, count)
    }
}

#[cfg(test)]
#[path = "heap_tests.rs"]
mod tests;
