//! Recording backend (no GPU required)
//!
//! Implements `DeviceBackend` by handing out counter-based handles and
//! recording every call, so the descriptor engine can be exercised and
//! inspected headless. Used by the integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::backend::{
    DescriptorCopy, DescriptorPoolDesc, DescriptorWrite, DeviceBackend, HeapStorage,
    HeapStorageDesc, HostTables, PoolAllocError,
};
use crate::bindless::MAX_BINDLESS_DESCRIPTOR_SETS;
use crate::config::DeviceCaps;
use crate::error::{Error, Result};
use crate::handle::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, SetLayoutHandle, ViewHandle,
};
use crate::sampler::SamplerInfo;
use crate::view::ViewKind;
use crate::view_key::{BufferViewDesc, ImageViewDesc};

/// Device addresses of distinct buffers never overlap below this size
pub const BUFFER_ADDRESS_SPACING: u64 = 1 << 32;

// ============================================================================
// Host tables
// ============================================================================

struct RecordedTables {
    raw_va: Box<[AtomicU64]>,
    buffer_ranges: Box<[AtomicU64]>,
}

impl RecordedTables {
    fn new(raw_va_words: usize, buffer_range_words: usize) -> Self {
        Self {
            raw_va: (0..raw_va_words).map(|_| AtomicU64::new(0)).collect(),
            buffer_ranges: (0..buffer_range_words).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl HostTables for RecordedTables {
    fn raw_va(&self) -> &[AtomicU64] {
        &self.raw_va
    }

    fn buffer_ranges(&self) -> &[AtomicU64] {
        &self.buffer_ranges
    }
}

// ============================================================================
// Recorded state
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PoolRecord {
    max_sets: u32,
    allocated: u32,
}

#[derive(Default)]
struct RecordingState {
    live_views: FxHashMap<ViewHandle, ViewKind>,
    created_views: usize,
    destroyed_views: usize,
    /// Destroys of unknown handles or with the wrong kind
    invalid_destroys: usize,
    buffer_views: Vec<BufferViewDesc>,
    image_views: Vec<ImageViewDesc>,
    samplers: Vec<SamplerInfo>,
    write_batches: Vec<Vec<DescriptorWrite>>,
    copy_batches: Vec<Vec<DescriptorCopy>>,
    pools: FxHashMap<DescriptorPoolHandle, PoolRecord>,
    created_pools: usize,
    live_heaps: usize,
    fail_next_view: Option<Error>,
}

pub struct RecordingBackend {
    caps: DeviceCaps,
    next_handle: AtomicU64,
    /// Upper bound of sets per pool, below the pool's own `max_sets`
    pool_set_limit: u32,
    view_gate: Mutex<Option<Arc<Barrier>>>,
    state: Mutex<RecordingState>,
}

impl RecordingBackend {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            next_handle: AtomicU64::new(1),
            pool_set_limit: u32::MAX,
            view_gate: Mutex::new(None),
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Report pools as exhausted after `limit` sets
    pub fn with_pool_set_limit(mut self, limit: u32) -> Self {
        self.pool_set_limit = limit;
        self
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Make every view creation wait on `gate` before returning
    pub fn set_view_gate(&self, gate: Option<Arc<Barrier>>) {
        *self.view_gate.lock().unwrap_or_else(PoisonError::into_inner) = gate;
    }

    /// Fail the next view or sampler creation with `error`
    pub fn fail_next_view(&self, error: Error) {
        self.lock().fail_next_view = Some(error);
    }

    /// Device address `buffer_device_address` reports for `buffer`
    pub fn buffer_address(buffer: BufferHandle) -> u64 {
        buffer.0 * BUFFER_ADDRESS_SPACING
    }

    fn create_view(&self, kind: ViewKind, record: impl FnOnce(&mut RecordingState)) -> Result<ViewHandle> {
        let gate = self.view_gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            gate.wait();
        }

        let mut state = self.lock();
        if let Some(error) = state.fail_next_view.take() {
            return Err(error);
        }
        let handle = ViewHandle::from_raw(self.next_raw())
            .ok_or_else(|| Error::DeviceCallFailed("Handle counter wrapped".to_string()))?;
        state.live_views.insert(handle, kind);
        state.created_views += 1;
        record(&mut state);
        Ok(handle)
    }

    // ===== INSPECTION =====

    pub fn created_view_count(&self) -> usize {
        self.lock().created_views
    }

    pub fn destroyed_view_count(&self) -> usize {
        self.lock().destroyed_views
    }

    pub fn invalid_destroy_count(&self) -> usize {
        self.lock().invalid_destroys
    }

    pub fn live_view_count(&self) -> usize {
        self.lock().live_views.len()
    }

    pub fn is_view_live(&self, handle: ViewHandle) -> bool {
        self.lock().live_views.contains_key(&handle)
    }

    pub fn buffer_views(&self) -> Vec<BufferViewDesc> {
        self.lock().buffer_views.clone()
    }

    pub fn image_views(&self) -> Vec<ImageViewDesc> {
        self.lock().image_views.clone()
    }

    pub fn samplers(&self) -> Vec<SamplerInfo> {
        self.lock().samplers.clone()
    }

    /// Write batches issued so far, one entry per `write_descriptors` call
    pub fn write_batches(&self) -> Vec<Vec<DescriptorWrite>> {
        self.lock().write_batches.clone()
    }

    /// Drain recorded write batches
    pub fn take_writes(&self) -> Vec<Vec<DescriptorWrite>> {
        std::mem::take(&mut self.lock().write_batches)
    }

    pub fn copy_batches(&self) -> Vec<Vec<DescriptorCopy>> {
        self.lock().copy_batches.clone()
    }

    /// Drain recorded copy batches
    pub fn take_copies(&self) -> Vec<Vec<DescriptorCopy>> {
        std::mem::take(&mut self.lock().copy_batches)
    }

    pub fn live_pool_count(&self) -> usize {
        self.lock().pools.len()
    }

    pub fn created_pool_count(&self) -> usize {
        self.lock().created_pools
    }

    pub fn live_heap_count(&self) -> usize {
        self.lock().live_heaps
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(DeviceCaps::default())
    }
}

impl DeviceBackend for RecordingBackend {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_buffer_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle> {
        self.create_view(ViewKind::Buffer, |state| state.buffer_views.push(*desc))
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> Result<ViewHandle> {
        self.create_view(ViewKind::Image, |state| state.image_views.push(*desc))
    }

    fn create_sampler(&self, info: &SamplerInfo) -> Result<ViewHandle> {
        self.create_view(ViewKind::Sampler, |state| state.samplers.push(*info))
    }

    fn create_acceleration_structure_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle> {
        if !self.caps.ray_tracing {
            return Err(Error::NotImplemented("Ray tracing is disabled".to_string()));
        }
        self.create_view(ViewKind::AccelerationStructure, |state| state.buffer_views.push(*desc))
    }

    fn destroy_view(&self, kind: ViewKind, handle: ViewHandle) {
        let mut state = self.lock();
        match state.live_views.remove(&handle) {
            Some(recorded) if recorded == kind => state.destroyed_views += 1,
            _ => state.invalid_destroys += 1,
        }
    }

    fn buffer_device_address(&self, buffer: BufferHandle) -> u64 {
        Self::buffer_address(buffer)
    }

    fn write_descriptors(&self, writes: &[DescriptorWrite]) {
        self.lock().write_batches.push(writes.to_vec());
    }

    fn copy_descriptors(&self, copies: &[DescriptorCopy]) {
        self.lock().copy_batches.push(copies.to_vec());
    }

    fn create_heap_storage(&self, desc: &HeapStorageDesc<'_>) -> Result<HeapStorage> {
        let mut sets = [DescriptorSetHandle::NULL; MAX_BINDLESS_DESCRIPTOR_SETS];
        for (index, _) in desc.sets {
            sets[*index] = DescriptorSetHandle(self.next_raw());
        }

        let tables = (desc.raw_va_words != 0 || desc.buffer_range_words != 0).then(|| {
            Box::new(RecordedTables::new(desc.raw_va_words, desc.buffer_range_words)) as Box<dyn HostTables>
        });

        self.lock().live_heaps += 1;
        Ok(HeapStorage {
            pool: Some(DescriptorPoolHandle(self.next_raw())),
            sets,
            tables,
        })
    }

    fn destroy_heap_storage(&self, _storage: HeapStorage) {
        self.lock().live_heaps -= 1;
    }

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let pool = DescriptorPoolHandle(self.next_raw());
        let mut state = self.lock();
        state.pools.insert(pool, PoolRecord { max_sets: desc.max_sets, allocated: 0 });
        state.created_pools += 1;
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        self.lock().pools.remove(&pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        _layout: SetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, PoolAllocError> {
        let limit = self.pool_set_limit;
        let mut state = self.lock();
        let Some(record) = state.pools.get_mut(&pool) else {
            return Err(PoolAllocError::Failed(Error::DeviceCallFailed(format!(
                "Unknown descriptor pool {:?}",
                pool
            ))));
        };
        if record.allocated >= record.max_sets.min(limit) {
            return Err(PoolAllocError::OutOfPoolMemory);
        }
        record.allocated += 1;
        drop(state);
        Ok(DescriptorSetHandle(self.next_raw()))
    }

    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, _set: DescriptorSetHandle) {
        if let Some(record) = self.lock().pools.get_mut(&pool) {
            record.allocated = record.allocated.saturating_sub(1);
        }
    }
}

#[cfg(test)]
#[path = "recording_backend_tests.rs"]
mod tests;
