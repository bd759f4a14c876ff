//! Unit tests for descriptor_create.rs

use std::sync::{Arc, Mutex};

use crate::backend::{DescriptorWrite, ImageLayout, WritePayload};
use crate::bindless::BindlessSetFlags;
use crate::config::{Config, DeviceCaps};
use crate::cookie::CookieAllocator;
use crate::descriptor::{BoundBufferRange, BufferBinding, DescriptorFlags, DescriptorType};
use crate::descriptor_qa::{DescriptorQa, QaTypeFlags};
use crate::device::Device;
use crate::error::Error;
use crate::format::{Format, FormatAspects};
use crate::handle::{BufferHandle, ImageHandle};
use crate::heap::{DescriptorHeap, HeapKind};
use crate::recording_backend::RecordingBackend;
use crate::resource::{BufferPlacement, Resource, ResourceDesc, ResourceFlags};
use crate::sampler::SamplerDesc;
use crate::view_desc::*;
use crate::view_key::{ComponentSwizzle, ImageUsage, ImageViewDesc, ImageViewType, ViewKey};

#[derive(Default)]
struct QaLog {
    writes: Mutex<Vec<(u32, QaTypeFlags, u64)>>,
}

impl DescriptorQa for QaLog {
    fn register_view(&self, _cookie: u64, _owner_cookie: u64) {}
    fn unregister(&self, _cookie: u64) {}
    fn register_heap(&self, _heap_cookie: u64, _kind: HeapKind, _capacity: u32) {}
    fn unregister_heap(&self, _heap_cookie: u64) {}

    fn write_descriptor(&self, _heap_cookie: u64, offset: u32, types: QaTypeFlags, bound_cookie: u64) {
        self.writes.lock().unwrap().push((offset, types, bound_cookie));
    }

    fn copy_descriptor(&self, _dst_heap: u64, _dst_offset: u32, _src_heap: u64, _src_offset: u32) {}
}

struct Fixture {
    backend: Arc<RecordingBackend>,
    qa: Arc<QaLog>,
    device: Device,
}

impl Fixture {
    fn new(caps: DeviceCaps, config: Config) -> Self {
        let backend = Arc::new(RecordingBackend::new(caps));
        let qa = Arc::new(QaLog::default());
        let device = Device::with_collaborators(
            backend.clone(),
            config,
            Arc::new(CookieAllocator::new()),
            Some(qa.clone() as Arc<dyn DescriptorQa>),
        );
        Self { backend, qa, device }
    }

    fn typed() -> Self {
        Self::new(DeviceCaps::default(), Config::default())
    }

    fn mutable() -> Self {
        Self::new(DeviceCaps { mutable_descriptor_type: true, ..Default::default() }, Config::default())
    }

    fn heap(&self, kind: HeapKind) -> Arc<DescriptorHeap> {
        let heap = self.device.allocate_descriptor_table(kind, 16, kind.is_bindless()).unwrap();
        self.backend.take_writes();
        heap
    }

    fn buffer(&self, handle: u64, size: u64) -> Arc<Resource> {
        let placement = BufferPlacement { buffer: BufferHandle(handle), offset: 0 };
        self.device.import_buffer(ResourceDesc::buffer(size), placement).unwrap()
    }

    fn texture(&self, handle: u64, desc: ResourceDesc) -> Arc<Resource> {
        self.device.import_texture(desc, ImageHandle(handle)).unwrap()
    }

    fn set_index(&self, flags: BindlessSetFlags) -> usize {
        self.device.bindless().find_set_info_index(flags).unwrap()
    }

    /// Single write batch issued since the last call
    fn single_batch(&self) -> Vec<DescriptorWrite> {
        let mut batches = self.backend.take_writes();
        assert_eq!(batches.len(), 1, "expected one write batch, got {:?}", batches);
        batches.remove(0)
    }

    fn last_image_view(&self) -> ImageViewDesc {
        *self.backend.image_views().last().unwrap()
    }
}

fn elements(first_element: u64, num_elements: u32) -> BufferElements {
    BufferElements { first_element, num_elements, ..Default::default() }
}

fn color_texture() -> ResourceDesc {
    ResourceDesc::texture_2d(64, 32, 1, 4, Format::R8G8B8A8_UNORM)
}

// ============================================================================
// CONSTANT BUFFER VIEWS
// ============================================================================

#[test]
fn test_cbv_writes_uniform_buffer() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let slot = heap.slot(5).unwrap();

    let desc = ConstantBufferViewDesc { buffer_location: buffer.va() + 0x100, size_in_bytes: 256 };
    f.device.create_constant_buffer_view(slot, &desc).unwrap();

    let state = slot.state();
    let cbv_set = f.set_index(BindlessSetFlags::CBV);
    let binding = BufferBinding { buffer: BufferHandle(1), offset: 0x100, range: 256 };
    assert_eq!(state.metadata.cookie, buffer.cookie());
    assert_eq!(state.metadata.flags, DescriptorFlags::OFFSET_RANGE | DescriptorFlags::NON_NULL);
    assert_eq!(state.metadata.set_info_mask, 1 << cbv_set);
    assert_eq!(state.metadata.current_null_type, None);
    assert_eq!(state.payload.buffer, Some(binding));

    let batch = f.single_batch();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].descriptor_type, DescriptorType::UniformBuffer);
    assert_eq!(batch[0].set, heap.set_handle(cbv_set));
    assert_eq!(batch[0].array_element, 5);
    assert_eq!(batch[0].payload, WritePayload::Buffer(binding));

    let qa = f.qa.writes.lock().unwrap().last().copied();
    assert_eq!(qa, Some((5, QaTypeFlags::UNIFORM_BUFFER, buffer.cookie())));
}

#[test]
fn test_cbv_with_zero_alignment_accepts_any_size() {
    let config = Config { constant_buffer_alignment: 0, ..Config::default() };
    let f = Fixture::new(DeviceCaps::default(), config);
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);

    let desc = ConstantBufferViewDesc { buffer_location: buffer.va(), size_in_bytes: 255 };
    f.device.create_constant_buffer_view(heap.slot(0).unwrap(), &desc).unwrap();
    assert!(!heap.slot(0).unwrap().state().is_null());
}

#[test]
fn test_cbv_range_clamped_to_resource_end() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let slot = heap.slot(0).unwrap();

    let desc = ConstantBufferViewDesc { buffer_location: buffer.va() + 0xf00, size_in_bytes: 512 };
    f.device.create_constant_buffer_view(slot, &desc).unwrap();
    assert_eq!(slot.state().payload.buffer.map(|b| b.range), Some(0x100));
}

#[test]
fn test_unaligned_cbv_leaves_slot_untouched() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let slot = heap.slot(0).unwrap();

    let good = ConstantBufferViewDesc { buffer_location: buffer.va(), size_in_bytes: 256 };
    f.device.create_constant_buffer_view(slot, &good).unwrap();
    f.backend.take_writes();
    let before = slot.state();

    let bad = ConstantBufferViewDesc { buffer_location: buffer.va(), size_in_bytes: 255 };
    let result = f.device.create_constant_buffer_view(slot, &bad);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(slot.state(), before);
    assert!(f.backend.take_writes().is_empty());
}

#[test]
fn test_cbv_of_unmapped_address_fails() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let desc = ConstantBufferViewDesc { buffer_location: 0x40, size_in_bytes: 256 };
    assert!(matches!(
        f.device.create_constant_buffer_view(heap.slot(0).unwrap(), &desc),
        Err(Error::InvalidArgument(_))
    ));
}

// ============================================================================
// NULL DESCRIPTORS
// ============================================================================

#[test]
fn test_null_write_is_idempotent_per_null_type() {
    let f = Fixture::mutable();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let slot = heap.slot(2).unwrap();
    let null_srv = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(0, 4));

    f.device.create_shader_resource_view(slot, None, Some(&null_srv)).unwrap();
    let batch = f.single_batch();
    assert!(batch.iter().all(|w| w.payload == WritePayload::Null));
    assert!(batch.iter().any(|w| w.descriptor_type == DescriptorType::UniformTexelBuffer));
    let first = slot.state();
    assert_eq!(first.metadata.current_null_type, Some(DescriptorType::UniformTexelBuffer));

    f.device.create_shader_resource_view(slot, None, Some(&null_srv)).unwrap();
    assert!(f.backend.take_writes().is_empty());
    assert_eq!(slot.state(), first);

    let null_uav = UnorderedAccessViewDesc {
        format: Format::R32_FLOAT,
        dimension: UavDimension::Texture2D(TextureSlice::default()),
    };
    f.device.create_unordered_access_view(slot, None, None, Some(&null_uav)).unwrap();
    assert_eq!(f.single_batch().len(), batch.len());
    assert_eq!(slot.state().metadata.current_null_type, Some(DescriptorType::StorageImage));
}

#[test]
fn test_typed_device_skips_null_write_to_fresh_slot() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let null_srv = ShaderResourceViewDesc::texture_2d(Format::R8G8B8A8_UNORM, TextureSrv::default());

    f.device.create_shader_resource_view(heap.slot(0).unwrap(), None, Some(&null_srv)).unwrap();
    assert!(f.backend.take_writes().is_empty());
}

#[test]
fn test_null_write_resets_side_tables_and_metadata() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let counter = f.buffer(2, 0x100);
    let slot = heap.slot(1).unwrap();
    let uav = UnorderedAccessViewDesc {
        format: Format::R32_UINT,
        dimension: UavDimension::Buffer(BufferUav { elements: elements(4, 8), counter_offset_in_bytes: 0 }),
    };

    f.device.create_unordered_access_view(slot, Some(&*buffer), Some(&*counter), Some(&uav)).unwrap();
    assert_ne!(heap.raw_va(1), 0);
    assert_ne!(heap.buffer_range(1), BoundBufferRange::default());

    let null_cbv = ConstantBufferViewDesc { buffer_location: 0, size_in_bytes: 0 };
    f.device.create_constant_buffer_view(slot, &null_cbv).unwrap();

    let state = slot.state();
    assert!(state.is_null());
    assert_eq!(state.metadata.cookie, 0);
    assert_eq!(state.metadata.set_info_mask, heap.null_template().set_info_mask());
    assert!(state.payload.view.is_none());
    assert_eq!(heap.raw_va(1), 0);
    assert_eq!(heap.buffer_range(1), BoundBufferRange::default());

    let qa = f.qa.writes.lock().unwrap().last().copied();
    assert_eq!(qa, Some((1, QaTypeFlags::universal_null(), 0)));
}

#[test]
fn test_null_resource_without_description_fails() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let slot = heap.slot(0).unwrap();
    assert!(matches!(f.device.create_shader_resource_view(slot, None, None), Err(Error::InvalidArgument(_))));
    assert!(matches!(f.device.create_unordered_access_view(slot, None, None, None), Err(Error::InvalidArgument(_))));
}

// ============================================================================
// BUFFER VIEWS
// ============================================================================

#[test]
fn test_buffer_srv_writes_typed_and_storage_buffer() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 4096);
    let slot = heap.slot(3).unwrap();

    let desc = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(10, 20));
    f.device.create_shader_resource_view(slot, Some(&*buffer), Some(&desc)).unwrap();

    let typed_set = f.set_index(BindlessSetFlags::SRV | BindlessSetFlags::BUFFER);
    let ssbo_set = f.set_index(BindlessSetFlags::SRV | BindlessSetFlags::RAW_SSBO);
    let state = slot.state();
    let view = state.payload.view.clone().unwrap();
    assert_eq!(state.metadata.cookie, view.cookie());
    assert_eq!(
        state.metadata.flags,
        DescriptorFlags::VIEW | DescriptorFlags::OFFSET_RANGE | DescriptorFlags::BUFFER_OFFSET | DescriptorFlags::NON_NULL
    );
    assert_eq!(state.metadata.set_info_mask, (1 << typed_set) | (1 << ssbo_set));

    let batch = f.single_batch();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].descriptor_type, DescriptorType::StorageBuffer);
    assert_eq!(batch[0].set, heap.set_handle(ssbo_set));
    assert_eq!(batch[1].descriptor_type, DescriptorType::UniformTexelBuffer);
    assert_eq!(batch[1].payload, WritePayload::TexelBuffer(view.handle()));

    // Whole-resource quantized view, element offset published
    assert!(matches!(view.info(), ViewKey::Buffer(d) if d.offset == 0 && d.size == 4096 && d.format == Format::R32_FLOAT));
    assert_eq!(
        heap.buffer_range(3),
        BoundBufferRange { byte_offset: 8, byte_count: 80, element_offset: 10, element_count: 20 }
    );
}

#[test]
fn test_neighbouring_buffer_srvs_share_one_view() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 4096);

    for (index, first) in [(0, 0), (1, 100), (2, 500)] {
        let desc = ShaderResourceViewDesc::buffer(Format::R32_UINT, elements(first, 16));
        f.device.create_shader_resource_view(heap.slot(index).unwrap(), Some(&*buffer), Some(&desc)).unwrap();
    }

    assert_eq!(buffer.views().len(), 1);
    assert_eq!(f.backend.buffer_views().len(), 1);
    assert_eq!(heap.buffer_range(2).element_offset, 500);
}

#[test]
fn test_exact_buffer_view_without_typed_offsets() {
    let config = Config { typed_offset_buffer: false, ..Config::default() };
    let f = Fixture::new(DeviceCaps::default(), config);
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 4096);

    let desc = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(10, 20));
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();

    let view = f.backend.buffer_views()[0];
    assert_eq!((view.offset, view.size), (40, 80));
}

#[test]
fn test_structured_buffer_view_is_word_addressed() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);

    let structured = BufferElements { first_element: 2, num_elements: 3, structure_byte_stride: 16, ..Default::default() };
    let desc = ShaderResourceViewDesc::buffer(Format::Unknown, structured);
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();

    let view = f.backend.buffer_views()[0];
    assert_eq!(view.format, Format::R32_UINT);
    let range = heap.buffer_range(0);
    assert_eq!((range.element_offset, range.element_count), (8, 12));
    assert_eq!((range.byte_offset, range.byte_count), (0, 48));
}

#[test]
fn test_raw_buffer_srv_uses_r32_uint() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);

    let raw = BufferElements { first_element: 0, num_elements: 64, flags: BufferViewFlags::RAW, ..Default::default() };
    let desc = ShaderResourceViewDesc::buffer(Format::R32_TYPELESS, raw);
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();
    assert_eq!(f.backend.buffer_views()[0].format, Format::R32_UINT);
}

#[test]
fn test_buffer_view_without_format_fails_cleanly() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let slot = heap.slot(0).unwrap();
    let before = slot.state();

    let desc = ShaderResourceViewDesc::buffer(Format::Unknown, elements(0, 4));
    let result = f.device.create_shader_resource_view(slot, Some(&*buffer), Some(&desc));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(slot.state(), before);
    assert!(f.backend.take_writes().is_empty());
}

#[test]
fn test_buffer_srv_outside_resource_is_rejected() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let slot = heap.slot(0).unwrap();

    let overflowing = BufferElements {
        first_element: u64::MAX / 4,
        num_elements: 1,
        structure_byte_stride: 16,
        ..Default::default()
    };
    let past_end = BufferElements { first_element: 60, num_elements: 8, structure_byte_stride: 16, ..Default::default() };
    for elements in [overflowing, past_end] {
        let desc = ShaderResourceViewDesc::buffer(Format::Unknown, elements);
        let result = f.device.create_shader_resource_view(slot, Some(&*buffer), Some(&desc));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    let typed = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(u64::MAX / 2, 4));
    let result = f.device.create_shader_resource_view(slot, Some(&*buffer), Some(&typed));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    assert!(slot.state().is_null());
    assert!(f.backend.take_writes().is_empty());
    assert!(buffer.views().is_empty());
}

#[test]
fn test_buffer_srv_ending_at_resource_end_is_accepted() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);

    let last = BufferElements { first_element: 56, num_elements: 8, structure_byte_stride: 16, ..Default::default() };
    let desc = ShaderResourceViewDesc::buffer(Format::Unknown, last);
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();
    assert!(!heap.slot(0).unwrap().state().is_null());
}

#[test]
fn test_default_buffer_srv_is_not_implemented() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let result = f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), None);
    assert!(matches!(result, Err(Error::NotImplemented(_))));
}

#[test]
fn test_mutable_device_writes_buffer_srv_to_mutable_set() {
    let f = Fixture::mutable();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 4096);

    let desc = ShaderResourceViewDesc::buffer(Format::R32_FLOAT, elements(0, 16));
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*buffer), Some(&desc)).unwrap();

    let mutable_set = f.set_index(BindlessSetFlags::SRV | BindlessSetFlags::BUFFER);
    assert!(f.device.bindless().set_info(mutable_set).is_mutable());
    let batch = f.single_batch();
    let typed = batch.iter().find(|w| w.set == heap.set_handle(mutable_set)).unwrap();
    assert_eq!(typed.descriptor_type, DescriptorType::UniformTexelBuffer);
}

// ============================================================================
// UAV COUNTERS
// ============================================================================

fn counter_uav(counter_offset_in_bytes: u64) -> UnorderedAccessViewDesc {
    UnorderedAccessViewDesc {
        format: Format::R32_UINT,
        dimension: UavDimension::Buffer(BufferUav { elements: elements(0, 64), counter_offset_in_bytes }),
    }
}

#[test]
fn test_counter_address_goes_to_raw_va_table() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let counter = f.buffer(2, 256);
    let slot = heap.slot(4).unwrap();

    f.device.create_unordered_access_view(slot, Some(&*buffer), Some(&*counter), Some(&counter_uav(0x10))).unwrap();

    assert_eq!(heap.raw_va(4), counter.va() + 0x10);
    let state = slot.state();
    assert!(state.metadata.flags.contains(DescriptorFlags::RAW_VA_AUX_BUFFER));
    assert!(state.payload.counter_view.is_none());
    let batch = f.single_batch();
    assert!(batch.iter().any(|w| w.descriptor_type == DescriptorType::StorageTexelBuffer));

    let (_, types, _) = f.qa.writes.lock().unwrap().last().copied().unwrap();
    assert!(types.contains(QaTypeFlags::RAW_VA | QaTypeFlags::STORAGE_TEXEL_BUFFER));
}

#[test]
fn test_counter_view_goes_to_aux_set_without_raw_va() {
    let config = Config { raw_va_aux_buffer: false, ..Config::default() };
    let f = Fixture::new(DeviceCaps::default(), config);
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let counter = f.buffer(2, 256);
    let slot = heap.slot(0).unwrap();

    f.device.create_unordered_access_view(slot, Some(&*buffer), Some(&*counter), Some(&counter_uav(0x12))).unwrap();

    let aux_set = f.set_index(BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER);
    let state = slot.state();
    let counter_view = state.payload.counter_view.clone().unwrap();
    assert!(matches!(counter_view.info(), ViewKey::Buffer(d) if d.offset == 0x10 && d.size == 4 && d.format == Format::R32_UINT));
    assert_eq!(state.metadata.set_info_mask & (1 << aux_set), 0);

    let batch = f.single_batch();
    let aux = batch.iter().find(|w| w.set == heap.set_handle(aux_set)).unwrap();
    assert_eq!(aux.payload, WritePayload::TexelBuffer(counter_view.handle()));
    assert_eq!(counter.views().len(), 1);
}

#[test]
fn test_counter_offset_outside_counter_is_rejected() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);
    let counter = f.buffer(2, 256);
    let slot = heap.slot(3).unwrap();

    for offset in [253, u64::MAX - 1] {
        let result = f.device.create_unordered_access_view(slot, Some(&*buffer), Some(&*counter), Some(&counter_uav(offset)));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
    assert!(slot.state().is_null());
    assert_eq!(heap.raw_va(3), 0);
    assert!(f.backend.take_writes().is_empty());
}

#[test]
fn test_missing_counter_writes_null_aux_descriptor() {
    let config = Config { raw_va_aux_buffer: false, ..Config::default() };
    let f = Fixture::new(DeviceCaps::default(), config);
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 1024);

    f.device.create_unordered_access_view(heap.slot(0).unwrap(), Some(&*buffer), None, Some(&counter_uav(0))).unwrap();

    let aux_set = heap.set_handle(f.set_index(BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER));
    let batch = f.single_batch();
    assert_eq!(batch.iter().find(|w| w.set == aux_set).map(|w| w.payload), Some(WritePayload::Null));
}

// ============================================================================
// TEXTURE VIEWS
// ============================================================================

#[test]
fn test_default_texture_srv_covers_all_mips() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, color_texture());
    let slot = heap.slot(0).unwrap();

    f.device.create_shader_resource_view(slot, Some(&*texture), None).unwrap();

    let key = f.last_image_view();
    assert_eq!(key.view_type, ImageViewType::D2);
    assert_eq!((key.base_mip, key.mip_count), (0, 4));
    assert_eq!((key.base_layer, key.layer_count), (0, 1));
    assert_eq!(key.usage, ImageUsage::Sampled);
    assert!(key.swizzle.is_identity());

    let batch = f.single_batch();
    assert_eq!(batch[0].descriptor_type, DescriptorType::SampledImage);
    assert!(matches!(batch[0].payload, WritePayload::Image { layout: ImageLayout::ShaderReadOnly, .. }));
    assert_eq!(slot.state().metadata.flags, DescriptorFlags::VIEW | DescriptorFlags::NON_NULL);
}

#[test]
fn test_cube_array_srv_counts_faces() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, ResourceDesc::texture_2d(16, 16, 12, 1, Format::R8G8B8A8_UNORM));

    let cubes = TextureSrv { first_array_slice: 0, array_size: 2, ..Default::default() };
    let desc = ShaderResourceViewDesc::new(Format::Unknown, SrvDimension::TextureCubeArray(cubes));
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&desc)).unwrap();
    let key = f.last_image_view();
    assert_eq!((key.view_type, key.layer_count), (ImageViewType::CubeArray, 12));

    let cube = ShaderResourceViewDesc::new(Format::Unknown, SrvDimension::TextureCube(TextureSrv::default()));
    f.device.create_shader_resource_view(heap.slot(1).unwrap(), Some(&*texture), Some(&cube)).unwrap();
    let key = f.last_image_view();
    assert_eq!((key.view_type, key.layer_count), (ImageViewType::Cube, 6));
}

#[test]
fn test_srv_min_lod_clamp_limited_to_last_mip() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, color_texture());

    let srv = TextureSrv { min_lod_clamp: 10.0, ..Default::default() };
    let desc = ShaderResourceViewDesc::texture_2d(Format::Unknown, srv);
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&desc)).unwrap();
    assert_eq!(f.last_image_view().min_lod_clamp, 3.0);
}

#[test]
fn test_srv_component_mapping_becomes_swizzle() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, color_texture());

    // r <- g, alpha forced to one
    let mapping = 1 | (1 << 3) | (2 << 6) | (5 << 9) | (1 << 12);
    let desc = ShaderResourceViewDesc {
        component_mapping: mapping,
        ..ShaderResourceViewDesc::texture_2d(Format::Unknown, TextureSrv::default())
    };
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&desc)).unwrap();

    let swizzle = f.last_image_view().swizzle;
    assert_eq!(swizzle.r, ComponentSwizzle::G);
    assert_eq!(swizzle.g, ComponentSwizzle::Identity);
    assert_eq!(swizzle.a, ComponentSwizzle::One);
}

#[test]
fn test_depth_srv_samples_depth_aspect() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, ResourceDesc::texture_2d(16, 16, 1, 1, Format::D24_UNORM_S8_UINT));

    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), None).unwrap();
    assert_eq!(f.last_image_view().aspects, FormatAspects::DEPTH);
    let batch = f.single_batch();
    assert!(matches!(batch[0].payload, WritePayload::Image { layout: ImageLayout::DepthStencilReadOnly, .. }));
}

#[test]
fn test_srv_dimension_must_match_resource() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, color_texture());

    let desc = ShaderResourceViewDesc::new(Format::Unknown, SrvDimension::Texture3D(TextureSrv::default()));
    let result = f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&desc));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let past_end = TextureSrv { most_detailed_mip: 4, ..Default::default() };
    let desc = ShaderResourceViewDesc::texture_2d(Format::Unknown, past_end);
    let result = f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&desc));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_srv_and_uav_of_same_subresource_are_distinct_views() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let desc = color_texture().with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
    let texture = f.texture(1, desc);

    let srv = ShaderResourceViewDesc::texture_2d(Format::Unknown, TextureSrv { mip_levels: 1, ..Default::default() });
    let uav = UnorderedAccessViewDesc { format: Format::Unknown, dimension: UavDimension::Texture2D(TextureSlice::default()) };
    f.device.create_shader_resource_view(heap.slot(0).unwrap(), Some(&*texture), Some(&srv)).unwrap();
    f.device.create_unordered_access_view(heap.slot(1).unwrap(), Some(&*texture), None, Some(&uav)).unwrap();

    assert_eq!(texture.views().len(), 2);
    let views = f.backend.image_views();
    assert_eq!((views[0].base_mip, views[0].mip_count), (views[1].base_mip, views[1].mip_count));
    assert_eq!(views[0].usage, ImageUsage::Sampled);
    assert_eq!(views[1].usage, ImageUsage::Storage);

    let uav_state = heap.slot(1).unwrap().state();
    assert_ne!(uav_state.metadata.cookie, heap.slot(0).unwrap().state().metadata.cookie);
}

#[test]
fn test_uav_rejects_compressed_formats() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, ResourceDesc::texture_2d(16, 16, 1, 1, Format::BC1_UNORM));
    let result = f.device.create_unordered_access_view(heap.slot(0).unwrap(), Some(&*texture), None, None);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_3d_uav_binds_single_layer() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, ResourceDesc::texture_3d(32, 32, 16, 2, Format::R32_FLOAT));

    let slices = TextureSlice { mip_slice: 1, first_array_slice: 2, array_size: REMAINING };
    let desc = UnorderedAccessViewDesc { format: Format::Unknown, dimension: UavDimension::Texture3D(slices) };
    f.device.create_unordered_access_view(heap.slot(0).unwrap(), Some(&*texture), None, Some(&desc)).unwrap();

    // W slices are never expressed as array layers of a 3D view
    let key = f.last_image_view();
    assert_eq!(key.view_type, ImageViewType::D3);
    assert_eq!((key.base_mip, key.mip_count), (1, 1));
    assert_eq!((key.base_layer, key.layer_count), (0, 1));

    let batch = f.single_batch();
    assert_eq!(batch[0].descriptor_type, DescriptorType::StorageImage);
    assert!(matches!(batch[0].payload, WritePayload::Image { layout: ImageLayout::General, .. }));
}

#[test]
fn test_3d_uav_without_desc_binds_single_layer() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let texture = f.texture(1, ResourceDesc::texture_3d(32, 32, 8, 1, Format::R32_FLOAT));

    f.device.create_unordered_access_view(heap.slot(0).unwrap(), Some(&*texture), None, None).unwrap();

    let key = f.last_image_view();
    assert_eq!(key.view_type, ImageViewType::D3);
    assert_eq!((key.base_layer, key.layer_count), (0, 1));
}

// ============================================================================
// ACCELERATION STRUCTURES
// ============================================================================

#[test]
fn test_acceleration_structure_srv_publishes_raw_address() {
    let f = Fixture::new(DeviceCaps { ray_tracing: true, ..Default::default() }, Config::default());
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let slot = heap.slot(6).unwrap();
    let location = buffer.va() + 0x100;

    f.device.create_shader_resource_view(slot, None, Some(&ShaderResourceViewDesc::acceleration_structure(location))).unwrap();

    let state = slot.state();
    assert_eq!(heap.raw_va(6), location);
    assert_eq!(state.metadata.flags, DescriptorFlags::RAW_VA_AUX_BUFFER | DescriptorFlags::NON_NULL);
    assert_eq!(state.metadata.set_info_mask, 0);
    assert_eq!(state.metadata.cookie, 0);
    assert!(f.backend.take_writes().is_empty());

    let (_, types, _) = f.qa.writes.lock().unwrap().last().copied().unwrap();
    assert_eq!(types, QaTypeFlags::RT_ACCELERATION_STRUCTURE | QaTypeFlags::RAW_VA);
}

#[test]
fn test_acceleration_structure_srv_requires_ray_tracing() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::CbvSrvUav);
    let buffer = f.buffer(1, 0x1000);
    let desc = ShaderResourceViewDesc::acceleration_structure(buffer.va());
    let result = f.device.create_shader_resource_view(heap.slot(0).unwrap(), None, Some(&desc));
    assert!(matches!(result, Err(Error::NotImplemented(_))));
}

// ============================================================================
// SAMPLERS
// ============================================================================

#[test]
fn test_sampler_descriptors_share_device_cache() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::Sampler);
    let desc = SamplerDesc::default();

    f.device.create_sampler_descriptor(heap.slot(0).unwrap(), &desc).unwrap();
    f.device.create_sampler_descriptor(heap.slot(1).unwrap(), &desc).unwrap();

    assert_eq!(f.device.sampler_cache().len(), 1);
    assert_eq!(f.backend.samplers().len(), 1);
    let a = heap.slot(0).unwrap().state();
    let b = heap.slot(1).unwrap().state();
    assert_eq!(a.metadata.cookie, b.metadata.cookie);

    let batches = f.backend.take_writes();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].descriptor_type, DescriptorType::Sampler);
    assert_eq!(batches[1][0].array_element, 1);
}

#[test]
fn test_descriptor_kind_must_match_heap() {
    let f = Fixture::typed();
    let samplers = f.heap(HeapKind::Sampler);
    let resources = f.heap(HeapKind::CbvSrvUav);

    let cbv = ConstantBufferViewDesc { buffer_location: 0, size_in_bytes: 0 };
    assert!(f.device.create_constant_buffer_view(samplers.slot(0).unwrap(), &cbv).is_err());
    assert!(f.device.create_sampler_descriptor(resources.slot(0).unwrap(), &SamplerDesc::default()).is_err());
}

// ============================================================================
// RENDER TARGETS AND DEPTH STENCILS
// ============================================================================

#[test]
fn test_rtv_records_view_and_extent() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::Rtv);
    let texture = f.texture(1, color_texture().with_flags(ResourceFlags::ALLOW_RENDER_TARGET));
    let slot = heap.rtv_slot(2).unwrap();

    let desc = RenderTargetViewDesc {
        format: Format::R8G8B8A8_UNORM_SRGB,
        dimension: RtvDimension::Texture2D(TextureSlice { mip_slice: 1, ..Default::default() }),
    };
    f.device.create_render_target_view(slot, Some(&texture), Some(&desc)).unwrap();

    let record = slot.descriptor();
    assert!(!record.is_null());
    assert_eq!(record.format, Format::R8G8B8A8_UNORM_SRGB);
    assert_eq!((record.width, record.height), (32, 16));
    assert_eq!((record.sample_count, record.layer_count), (1, 1));
    assert!(Arc::ptr_eq(record.resource.as_ref().unwrap(), &texture));
    assert_eq!(f.last_image_view().usage, ImageUsage::ColorAttachment);

    f.device.create_render_target_view(slot, None, None).unwrap();
    assert!(slot.descriptor().is_null());
}

#[test]
fn test_default_rtv_of_3d_texture_is_layered() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::Rtv);
    let texture = f.texture(1, ResourceDesc::texture_3d(8, 8, 4, 1, Format::R16G16B16A16_FLOAT));

    f.device.create_render_target_view(heap.rtv_slot(0).unwrap(), Some(&texture), None).unwrap();
    let key = f.last_image_view();
    assert_eq!((key.view_type, key.layer_count), (ImageViewType::D2Array, 4));
    assert_eq!(heap.rtv_slot(0).unwrap().descriptor().layer_count, 4);
}

#[test]
fn test_rtv_rejects_depth_format() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::Rtv);
    let texture = f.texture(1, ResourceDesc::texture_2d(8, 8, 1, 1, Format::D32_FLOAT));
    let result = f.device.create_render_target_view(heap.rtv_slot(0).unwrap(), Some(&texture), None);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_dsv_validation() {
    let f = Fixture::typed();
    let heap = f.heap(HeapKind::Dsv);
    let slot = heap.rtv_slot(0).unwrap();

    let volume = f.texture(1, ResourceDesc::texture_3d(8, 8, 4, 1, Format::D32_FLOAT));
    assert!(f.device.create_depth_stencil_view(slot, Some(&volume), None).is_err());

    let color = f.texture(2, color_texture());
    assert!(f.device.create_depth_stencil_view(slot, Some(&color), None).is_err());
    assert!(slot.descriptor().is_null());

    let depth = f.texture(3, ResourceDesc::texture_2d(8, 8, 1, 1, Format::D32_FLOAT));
    f.device.create_depth_stencil_view(slot, Some(&depth), None).unwrap();
    assert_eq!(slot.descriptor().format, Format::D32_FLOAT);
    assert_eq!(f.last_image_view().usage, ImageUsage::DepthStencilAttachment);
}
