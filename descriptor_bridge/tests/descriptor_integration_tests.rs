//! Integration tests for descriptor creation and copies
//!
//! These tests drive the public bridge API against the recording backend.
//! No GPU required.
//!
//! Run with: cargo test --test descriptor_integration_tests

use descriptor_bridge::bridge::*;
use std::sync::{Arc, Barrier};
use std::thread;

// ============================================================================
// TEST HELPERS
// ============================================================================

struct TestDevice {
    backend: Arc<RecordingBackend>,
    device: Device,
}

impl TestDevice {
    fn new(caps: DeviceCaps) -> Self {
        let backend = Arc::new(RecordingBackend::new(caps));
        let device = Device::new(backend.clone(), Config::default());
        Self { backend, device }
    }

    fn typed() -> Self {
        Self::new(DeviceCaps::default())
    }

    fn buffer(&self, handle: u64, size: u64) -> Arc<Resource> {
        self.device
            .import_buffer(ResourceDesc::buffer(size), BufferPlacement { buffer: BufferHandle(handle), offset: 0 })
            .unwrap()
    }

    fn texture(&self, handle: u64, desc: ResourceDesc) -> Arc<Resource> {
        self.device.import_texture(desc, ImageHandle(handle)).unwrap()
    }

    fn heap(&self, capacity: u32) -> Arc<DescriptorHeap> {
        self.device.allocate_descriptor_table(HeapKind::CbvSrvUav, capacity, true).unwrap()
    }
}

fn elements(first_element: u64, num_elements: u32) -> BufferElements {
    BufferElements { first_element, num_elements, ..Default::default() }
}

// ============================================================================
// VIEW DEDUPLICATION
// ============================================================================

#[test]
fn test_integration_concurrent_srvs_share_one_view() {
    const THREADS: usize = 8;

    let t = TestDevice::typed();
    let heap = t.heap(THREADS as u32);
    let texture = t.texture(1, ResourceDesc::texture_2d(128, 128, 1, 8, Format::R8G8B8A8_UNORM));

    // Every thread reaches the backend before any of them publishes
    t.backend.set_view_gate(Some(Arc::new(Barrier::new(THREADS))));
    thread::scope(|scope| {
        for index in 0..THREADS as u32 {
            let (device, heap, texture) = (&t.device, &heap, &texture);
            scope.spawn(move || {
                device
                    .create_shader_resource_view(heap.slot(index).unwrap(), Some(&**texture), None)
                    .unwrap();
            });
        }
    });
    t.backend.set_view_gate(None);

    assert_eq!(t.backend.created_view_count(), THREADS);
    assert_eq!(t.backend.destroyed_view_count(), THREADS - 1);
    assert_eq!(t.backend.live_view_count(), 1);
    assert_eq!(texture.views().len(), 1);

    let first = heap.slot(0).unwrap().state().payload.view.unwrap();
    for index in 1..THREADS as u32 {
        let view = heap.slot(index).unwrap().state().payload.view.unwrap();
        assert!(Arc::ptr_eq(&first, &view));
    }
}

#[test]
fn test_integration_resource_drop_destroys_views() {
    let t = TestDevice::typed();
    let heap = t.heap(4);
    let buffer = t.buffer(1, 4096);

    let desc = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(0, 32));
    t.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();
    assert_eq!(t.backend.live_view_count(), 1);

    // The slot keeps the view alive past the resource's cache
    drop(buffer);
    assert_eq!(t.backend.live_view_count(), 1);

    let null = ConstantBufferViewDesc { buffer_location: 0, size_in_bytes: 0 };
    t.device.create_constant_buffer_view(heap.slot(0).unwrap(), &null).unwrap();
    assert_eq!(t.backend.live_view_count(), 0);
    assert_eq!(t.backend.invalid_destroy_count(), 0);
}

// ============================================================================
// NULL DESCRIPTORS
// ============================================================================

#[test]
fn test_integration_null_writes_are_idempotent() {
    let t = TestDevice::new(DeviceCaps { mutable_descriptor_type: true, ..Default::default() });
    let heap = t.heap(4);
    let slot = heap.slot(1).unwrap();
    let null_uav = UnorderedAccessViewDesc {
        format: Format::R32_FLOAT,
        dimension: UavDimension::Texture2D(TextureSlice::default()),
    };

    for _ in 0..3 {
        t.device.create_unordered_access_view(slot, None, None, Some(&null_uav)).unwrap();
    }
    assert_eq!(t.backend.take_writes().len(), 1);
    assert_eq!(slot.state().metadata.current_null_type, Some(DescriptorType::StorageImage));
}

// ============================================================================
// COPIES
// ============================================================================

#[test]
fn test_integration_copy_short_circuit() {
    let t = TestDevice::typed();
    let (staging, shader_heap) = (t.heap(8), t.heap(8));
    let texture = t.texture(1, ResourceDesc::texture_2d(16, 16, 1, 1, Format::R8G8B8A8_UNORM));

    for index in 0..4 {
        t.device.create_shader_resource_view(staging.slot(index).unwrap(), Some(&*texture), None).unwrap();
    }

    let copy = || {
        t.device
            .copy_descriptor_range(shader_heap.slot(0).unwrap(), staging.slot(0).unwrap(), 4, HeapKind::CbvSrvUav)
            .unwrap();
    };
    copy();
    assert_eq!(t.backend.take_copies().len(), 4);

    // Re-copying the same table every frame costs nothing
    copy();
    copy();
    assert!(t.backend.take_copies().is_empty());
}

// ============================================================================
// BUFFER RANGES
// ============================================================================

#[test]
fn test_integration_quantized_range_round_trip() {
    let t = TestDevice::typed();
    let heap = t.heap(4);
    let buffer = t.buffer(1, 1 << 20);

    let desc = ShaderResourceViewDesc::buffer(Format::R32G32B32A32_FLOAT, elements(1000, 300));
    t.device.create_shader_resource_view(heap.slot(2).unwrap(), Some(&*buffer), Some(&desc)).unwrap();

    // Shaders index the view at element_offset + i
    let range = heap.buffer_range(2);
    let view = heap.slot(2).unwrap().state().payload.view.unwrap();
    let ViewKey::Buffer(key) = *view.info() else {
        panic!("buffer SRV without buffer view");
    };
    let view_first = key.offset / 16;
    assert_eq!(view_first + range.element_offset as u64, 1000);
    assert_eq!(range.element_count, 300);
    assert!(view_first + key.size / 16 >= 1300);
}

#[test]
fn test_integration_unaligned_cbv_is_rejected() {
    let t = TestDevice::typed();
    let heap = t.heap(1);
    let buffer = t.buffer(1, 4096);

    let desc = ConstantBufferViewDesc { buffer_location: buffer.va(), size_in_bytes: 100 };
    let result = t.device.create_constant_buffer_view(heap.slot(0).unwrap(), &desc);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(heap.slot(0).unwrap().state().is_null());
    assert!(t.backend.take_writes().is_empty());
}

#[test]
fn test_integration_uav_counter_address() {
    let t = TestDevice::typed();
    let heap = t.heap(2);
    let (buffer, counter) = (t.buffer(1, 4096), t.buffer(2, 64));

    let desc = UnorderedAccessViewDesc {
        format: Format::R32_UINT,
        dimension: UavDimension::Buffer(BufferUav { elements: elements(0, 1024), counter_offset_in_bytes: 4 }),
    };
    t.device
        .create_unordered_access_view(heap.slot(1).unwrap(), Some(&*buffer), Some(&*counter), Some(&desc))
        .unwrap();
    assert_eq!(heap.raw_va(1), RecordingBackend::buffer_address(BufferHandle(2)) + 4);
}

// ============================================================================
// TEXTURE VIEWS
// ============================================================================

#[test]
fn test_integration_srv_and_uav_keys_differ() {
    let t = TestDevice::typed();
    let heap = t.heap(2);
    let desc = ResourceDesc::texture_2d(32, 32, 1, 1, Format::R32_FLOAT).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
    let texture = t.texture(1, desc);

    t.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), None).unwrap();
    t.device.create_unordered_access_view(heap.slot(1).unwrap(), Some(&*texture), None, None).unwrap();

    let srv = heap.slot(0).unwrap().state().payload.view.unwrap();
    let uav = heap.slot(1).unwrap().state().payload.view.unwrap();
    assert!(!Arc::ptr_eq(&srv, &uav));
    assert_eq!(texture.views().len(), 2);
}

#[test]
fn test_integration_render_targets() {
    let t = TestDevice::typed();
    let rtvs = t.device.allocate_descriptor_table(HeapKind::Rtv, 2, false).unwrap();
    let dsvs = t.device.allocate_descriptor_table(HeapKind::Dsv, 2, false).unwrap();
    let color = t.texture(1, ResourceDesc::texture_2d(640, 480, 1, 1, Format::B8G8R8A8_UNORM));
    let depth = t.texture(2, ResourceDesc::texture_2d(640, 480, 1, 1, Format::D32_FLOAT));

    t.device.create_render_target_view(rtvs.rtv_slot(0).unwrap(), Some(&color), None).unwrap();
    t.device.create_depth_stencil_view(dsvs.rtv_slot(0).unwrap(), Some(&depth), None).unwrap();

    let rtv = rtvs.rtv_slot(0).unwrap().descriptor();
    let dsv = dsvs.rtv_slot(0).unwrap().descriptor();
    assert_eq!((rtv.width, rtv.height, rtv.format), (640, 480, Format::B8G8R8A8_UNORM));
    assert_eq!(dsv.format, Format::D32_FLOAT);

    // Swapped roles are rejected
    assert!(t.device.create_render_target_view(rtvs.rtv_slot(1).unwrap(), Some(&depth), None).is_err());
    assert!(t.device.create_depth_stencil_view(dsvs.rtv_slot(1).unwrap(), Some(&color), None).is_err());
}

// ============================================================================
// HEAPS
// ============================================================================

#[test]
fn test_integration_heap_errors() {
    let t = TestDevice::typed();
    assert!(t.device.allocate_descriptor_table(HeapKind::Dsv, 4, true).is_err());
    assert!(matches!(
        t.device.allocate_descriptor_table(HeapKind::CbvSrvUav, u32::MAX, true),
        Err(Error::OutOfMemory)
    ));

    let heap = t.heap(4);
    assert!(heap.slot(4).is_err());
    assert!(heap.rtv_slot(0).is_err());
}
