//! Unit tests for recording_backend.rs

use crate::backend::{DescriptorPoolDesc, DeviceBackend, HeapStorageDesc, PoolAllocError};
use crate::bindless::BindlessSetInfo;
use crate::config::DeviceCaps;
use crate::descriptor::DescriptorType;
use crate::error::Error;
use crate::format::Format;
use crate::handle::{BufferHandle, SetLayoutHandle};
use crate::heap::HeapKind;
use crate::recording_backend::*;
use crate::view::ViewKind;
use crate::view_key::BufferViewDesc;

fn buffer_view(offset: u64) -> BufferViewDesc {
    BufferViewDesc { buffer: BufferHandle(1), format: Format::R32_UINT, offset, size: 64 }
}

#[test]
fn test_views_are_recorded_and_tracked() {
    let backend = RecordingBackend::default();
    let a = backend.create_buffer_view(&buffer_view(0)).unwrap();
    let b = backend.create_buffer_view(&buffer_view(64)).unwrap();

    assert_ne!(a, b);
    assert_eq!(backend.buffer_views(), vec![buffer_view(0), buffer_view(64)]);
    assert_eq!(backend.live_view_count(), 2);

    backend.destroy_view(ViewKind::Buffer, a);
    assert!(!backend.is_view_live(a));
    assert!(backend.is_view_live(b));
    assert_eq!(backend.destroyed_view_count(), 1);
}

#[test]
fn test_invalid_destroys_are_counted() {
    let backend = RecordingBackend::default();
    let view = backend.create_buffer_view(&buffer_view(0)).unwrap();

    backend.destroy_view(ViewKind::Image, view);
    backend.destroy_view(ViewKind::Buffer, view);
    assert_eq!(backend.invalid_destroy_count(), 2);
    assert_eq!(backend.destroyed_view_count(), 0);
}

#[test]
fn test_fail_next_view_fails_once() {
    let backend = RecordingBackend::default();
    backend.fail_next_view(Error::OutOfMemory);

    assert!(matches!(backend.create_buffer_view(&buffer_view(0)), Err(Error::OutOfMemory)));
    assert!(backend.create_buffer_view(&buffer_view(0)).is_ok());
    assert_eq!(backend.created_view_count(), 1);
}

#[test]
fn test_acceleration_structures_need_ray_tracing() {
    let plain = RecordingBackend::default();
    assert!(matches!(plain.create_acceleration_structure_view(&buffer_view(0)), Err(Error::NotImplemented(_))));

    let rt = RecordingBackend::new(DeviceCaps { ray_tracing: true, ..Default::default() });
    assert!(rt.create_acceleration_structure_view(&buffer_view(0)).is_ok());
}

#[test]
fn test_buffer_addresses_do_not_overlap() {
    let backend = RecordingBackend::default();
    let first = backend.buffer_device_address(BufferHandle(1));
    let second = backend.buffer_device_address(BufferHandle(2));
    assert_eq!(second - first, BUFFER_ADDRESS_SPACING);
}

#[test]
fn test_heap_storage_has_requested_sets_and_tables() {
    let backend = RecordingBackend::default();
    let info = BindlessSetInfo {
        heap_kind: HeapKind::CbvSrvUav,
        flags: crate::bindless::BindlessSetFlags::CBV,
        descriptor_type: DescriptorType::UniformBuffer,
        binding_index: 0,
    };
    let sets = [(2usize, info)];
    let storage = backend
        .create_heap_storage(&HeapStorageDesc {
            kind: HeapKind::CbvSrvUav,
            capacity: 4,
            shader_visible: true,
            heap_cookie: 1,
            sets: &sets,
            raw_va_words: 4,
            buffer_range_words: 8,
        })
        .unwrap();

    assert!(!storage.sets[2].is_null());
    assert!(storage.sets[0].is_null());
    let tables = storage.tables.as_ref().unwrap();
    assert_eq!((tables.raw_va().len(), tables.buffer_ranges().len()), (4, 8));
    assert_eq!(backend.live_heap_count(), 1);

    backend.destroy_heap_storage(storage);
    assert_eq!(backend.live_heap_count(), 0);
}

#[test]
fn test_pool_exhaustion_and_free() {
    let backend = RecordingBackend::default().with_pool_set_limit(1);
    let pool = backend
        .create_descriptor_pool(&DescriptorPoolDesc {
            descriptor_type: DescriptorType::Sampler,
            descriptor_count: 4,
            max_sets: 4,
        })
        .unwrap();

    let set = backend.allocate_descriptor_set(pool, SetLayoutHandle(1)).unwrap();
    assert_eq!(
        backend.allocate_descriptor_set(pool, SetLayoutHandle(1)),
        Err(PoolAllocError::OutOfPoolMemory)
    );

    backend.free_descriptor_set(pool, set);
    assert!(backend.allocate_descriptor_set(pool, SetLayoutHandle(1)).is_ok());

    backend.destroy_descriptor_pool(pool);
    assert_eq!(backend.live_pool_count(), 0);
    assert_eq!(backend.created_pool_count(), 1);
}
