//! VulkanBackend - `DeviceBackend` on top of ash
//!
//! Bridge handles carry raw Vulkan handles (`Handle::as_raw`). Bindless
//! heaps get one update-after-bind pool holding one variable-count set per
//! set info; side tables live in a host-visible storage buffer bound to the
//! extra bindings of the set that declares them.

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::*;
use arrayvec::ArrayVec;
use ash::vk::{self, Handle};
use descriptor_bridge::bridge::{
    BindlessSetFlags, BindlessSetInfo, BufferHandle, BufferViewDesc, DescriptorCopy,
    DescriptorPoolDesc, DescriptorPoolHandle, DescriptorSetHandle, DescriptorType, DescriptorWrite,
    DeviceBackend, DeviceCaps, Error, HeapKind, HeapStorage, HeapStorageDesc, HostTables,
    ImageViewDesc, PoolAllocError, ReductionMode, Result, SamplerInfo, SetLayoutHandle, ViewHandle, ViewKind,
    WritePayload, MAX_BINDLESS_DESCRIPTOR_SETS,
};
use descriptor_bridge::{bridge_bail, bridge_debug, bridge_err, bridge_error, bridge_warn};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use rustc_hash::FxHashMap;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};

const SOURCE: &str = "bridge::vulkan";

const WORD_SIZE: u64 = std::mem::size_of::<u64>() as u64;

fn view_handle<H: Handle>(handle: H, what: &str) -> Result<ViewHandle> {
    ViewHandle::from_raw(handle.as_raw())
        .ok_or_else(|| bridge_err!(DeviceCallFailed, SOURCE, "Driver returned a null {}", what))
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

// ============================================================================
// HOST SIDE TABLES
// ============================================================================

/// Side tables of a CPU-only heap, never read by shaders
struct HostOnlyTables {
    raw_va: Box<[AtomicU64]>,
    buffer_ranges: Box<[AtomicU64]>,
}

impl HostOnlyTables {
    fn new(raw_va_words: usize, buffer_range_words: usize) -> Self {
        Self {
            raw_va: (0..raw_va_words).map(|_| AtomicU64::new(0)).collect(),
            buffer_ranges: (0..buffer_range_words).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl HostTables for HostOnlyTables {
    fn raw_va(&self) -> &[AtomicU64] {
        &self.raw_va
    }

    fn buffer_ranges(&self) -> &[AtomicU64] {
        &self.buffer_ranges
    }
}

/// Side tables of a shader-visible heap in a persistently mapped buffer
struct DeviceTables {
    ctx: Arc<VulkanContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    mapped: NonNull<u8>,
    raw_va_len: usize,
    buffer_ranges_len: usize,
    buffer_ranges_offset: u64,
}

// The mapping is only accessed through atomics and lives as long as `allocation`
unsafe impl Send for DeviceTables {}
unsafe impl Sync for DeviceTables {}

impl DeviceTables {
    fn new(ctx: &Arc<VulkanContext>, raw_va_words: usize, buffer_range_words: usize) -> Result<Self> {
        let raw_va_bytes = raw_va_words as u64 * WORD_SIZE;
        let buffer_ranges_offset = align_up(raw_va_bytes, ctx.limits.min_storage_buffer_offset_alignment);
        let size = buffer_ranges_offset + buffer_range_words as u64 * WORD_SIZE;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = ctx.device.create_buffer(&buffer_info, None)
                .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create side table buffer: {:?}", e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocated = ctx.allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .allocate(&AllocationCreateDesc {
                    name: "descriptor_side_tables",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                });
            let allocation = match allocated {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(bridge_err!(DeviceCallFailed, SOURCE,
                        "Failed to allocate side table memory: {:?}", e));
                }
            };

            let memory = allocation.memory();
            let memory_offset = allocation.offset();
            let mapped = allocation.mapped_ptr();

            // From here on Drop releases the buffer and the allocation
            let mut tables = Self {
                ctx: Arc::clone(ctx),
                buffer,
                allocation: Some(allocation),
                mapped: NonNull::dangling(),
                raw_va_len: 0,
                buffer_ranges_len: 0,
                buffer_ranges_offset,
            };

            ctx.device
                .bind_buffer_memory(buffer, memory, memory_offset)
                .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to bind side table memory: {:?}", e))?;

            let mapped = mapped
                .ok_or_else(|| bridge_err!(DeviceCallFailed, SOURCE, "Side table memory is not host visible"))?
                .cast::<u8>();
            std::ptr::write_bytes(mapped.as_ptr(), 0, size as usize);

            tables.mapped = mapped;
            tables.raw_va_len = raw_va_words;
            tables.buffer_ranges_len = buffer_range_words;
            Ok(tables)
        }
    }

    /// Buffer range bound to one extra binding
    fn binding_info(&self, extra: BindlessSetFlags) -> vk::DescriptorBufferInfo {
        let (offset, words) = if extra == BindlessSetFlags::EXTRA_RAW_VA_AUX_BUFFER {
            (0, self.raw_va_len)
        } else {
            (self.buffer_ranges_offset, self.buffer_ranges_len)
        };
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: (words as u64 * WORD_SIZE).max(WORD_SIZE),
        }
    }
}

impl HostTables for DeviceTables {
    fn raw_va(&self) -> &[AtomicU64] {
        if self.raw_va_len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.mapped.as_ptr().cast::<AtomicU64>(), self.raw_va_len) }
    }

    fn buffer_ranges(&self) -> &[AtomicU64] {
        if self.buffer_ranges_len == 0 {
            return &[];
        }
        unsafe {
            let start = self.mapped.as_ptr().add(self.buffer_ranges_offset as usize);
            std::slice::from_raw_parts(start.cast::<AtomicU64>(), self.buffer_ranges_len)
        }
    }
}

impl Drop for DeviceTables {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let freed = self.ctx.allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .free(allocation);
            if let Err(e) = freed {
                bridge_error!(SOURCE, "Failed to free side table memory: {:?}", e);
            }
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// Vulkan implementation of the bridge's device interface
pub struct VulkanBackend {
    ctx: Arc<VulkanContext>,
    caps: DeviceCaps,
    /// Written into sampler slots that are nulled; Vulkan has no null sampler
    null_sampler: vk::Sampler,
    set_layouts: Mutex<FxHashMap<BindlessSetInfo, vk::DescriptorSetLayout>>,
}

impl VulkanBackend {
    pub fn new(ctx: Arc<VulkanContext>) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);

        let null_sampler = unsafe { ctx.device.create_sampler(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create null sampler: {:?}", e))?;

        Ok(Self {
            caps: ctx.caps(),
            ctx,
            null_sampler,
            set_layouts: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.ctx
    }

    /// Descriptor array size of every set of a heap kind
    pub fn max_descriptors(&self, kind: HeapKind) -> u32 {
        match kind {
            HeapKind::Sampler => self.ctx.limits.max_bindless_samplers,
            _ => self.ctx.limits.max_bindless_resources,
        }
    }

    /// Layout of one bindless set, created on first use
    ///
    /// Pipeline layouts built by the root signature layer must use these so
    /// that heap sets stay compatible.
    pub fn set_layout(&self, info: &BindlessSetInfo) -> Result<vk::DescriptorSetLayout> {
        let mut layouts = self.set_layouts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&layout) = layouts.get(info) {
            return Ok(layout);
        }

        let layout = self.create_set_layout(info)?;
        layouts.insert(*info, layout);
        Ok(layout)
    }

    fn create_set_layout(&self, info: &BindlessSetInfo) -> Result<vk::DescriptorSetLayout> {
        let extras = info.extra_bindings();
        let mut bindings = ArrayVec::<vk::DescriptorSetLayoutBinding, 3>::new();
        let mut binding_flags = ArrayVec::<vk::DescriptorBindingFlags, 3>::new();
        let mut mutable_lists = ArrayVec::<vk::MutableDescriptorTypeListEXT, 3>::new();

        for binding in 0..extras.len() as u32 {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL),
            );
            binding_flags.push(
                vk::DescriptorBindingFlags::UPDATE_AFTER_BIND | vk::DescriptorBindingFlags::PARTIALLY_BOUND,
            );
            mutable_lists.push(vk::MutableDescriptorTypeListEXT::default());
        }

        bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(info.binding_index)
                .descriptor_type(descriptor_type_to_vk(info.descriptor_type))
                .descriptor_count(self.max_descriptors(info.heap_kind))
                .stage_flags(vk::ShaderStageFlags::ALL),
        );
        binding_flags.push(
            vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        );
        mutable_lists.push(
            vk::MutableDescriptorTypeListEXT::default().descriptor_types(&MUTABLE_DESCRIPTOR_TYPES),
        );

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let mut mutable_info =
            vk::MutableDescriptorTypeCreateInfoEXT::default().mutable_descriptor_type_lists(&mutable_lists);

        let mut create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .bindings(&bindings)
            .push_next(&mut flags_info);
        if info.is_mutable() {
            create_info = create_info.push_next(&mut mutable_info);
        }

        let layout = unsafe { self.ctx.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE,
                "Failed to create set layout for {:?}: {:?}", info.flags, e))?;

        bridge_debug!(SOURCE, "Created bindless set layout {:?} ({:?})", info.flags, info.descriptor_type);
        Ok(layout)
    }

    fn create_heap_pool(&self, desc: &HeapStorageDesc<'_>) -> Result<vk::DescriptorPool> {
        let mut pool_sizes = ArrayVec::<vk::DescriptorPoolSize, { MAX_BINDLESS_DESCRIPTOR_SETS + 1 }>::new();
        let mut mutable_lists = ArrayVec::<vk::MutableDescriptorTypeListEXT, { MAX_BINDLESS_DESCRIPTOR_SETS + 1 }>::new();
        let mut extra_count = 0;
        let mut has_mutable = false;

        for (_, info) in desc.sets {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(info.descriptor_type),
                descriptor_count: desc.capacity.max(1),
            });
            mutable_lists.push(if info.is_mutable() {
                vk::MutableDescriptorTypeListEXT::default().descriptor_types(&MUTABLE_DESCRIPTOR_TYPES)
            } else {
                vk::MutableDescriptorTypeListEXT::default()
            });
            extra_count += info.extra_bindings().len() as u32;
            has_mutable |= info.is_mutable();
        }
        if extra_count > 0 {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: extra_count,
            });
            mutable_lists.push(vk::MutableDescriptorTypeListEXT::default());
        }

        let mut mutable_info =
            vk::MutableDescriptorTypeCreateInfoEXT::default().mutable_descriptor_type_lists(&mutable_lists);
        let mut pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(desc.sets.len() as u32)
            .pool_sizes(&pool_sizes);
        if has_mutable {
            pool_info = pool_info.push_next(&mut mutable_info);
        }

        unsafe { self.ctx.device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE,
                "Failed to create {:?} heap pool: {:?}", desc.kind, e))
    }

    fn allocate_heap_sets(
        &self,
        desc: &HeapStorageDesc<'_>,
        pool: vk::DescriptorPool,
    ) -> Result<[DescriptorSetHandle; MAX_BINDLESS_DESCRIPTOR_SETS]> {
        let layouts = desc
            .sets
            .iter()
            .map(|(_, info)| self.set_layout(info))
            .collect::<Result<ArrayVec<vk::DescriptorSetLayout, MAX_BINDLESS_DESCRIPTOR_SETS>>>()?;
        let counts = ArrayVec::<u32, MAX_BINDLESS_DESCRIPTOR_SETS>::from_iter(layouts.iter().map(|_| desc.capacity));

        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&counts);
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_info);

        let sets = unsafe { self.ctx.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE,
                "Failed to allocate {:?} heap sets: {:?}", desc.kind, e))?;

        let mut handles = [DescriptorSetHandle::NULL; MAX_BINDLESS_DESCRIPTOR_SETS];
        for ((index, _), set) in desc.sets.iter().zip(sets) {
            handles[*index] = DescriptorSetHandle(set.as_raw());
        }
        Ok(handles)
    }

    /// Write null descriptors over every array element of the non-sampler sets
    ///
    /// Mutable sets are filled with null sampled images.
    fn null_initialize_heap_sets(
        &self,
        desc: &HeapStorageDesc<'_>,
        sets: &[DescriptorSetHandle; MAX_BINDLESS_DESCRIPTOR_SETS],
    ) {
        let targets = desc
            .sets
            .iter()
            .filter_map(|(index, info)| {
                let descriptor_type = match info.descriptor_type {
                    DescriptorType::Sampler => return None,
                    DescriptorType::Mutable => DescriptorType::SampledImage,
                    other => other,
                };
                Some((vk::DescriptorSet::from_raw(sets[*index].0), info.binding_index, descriptor_type))
            })
            .collect::<ArrayVec<_, MAX_BINDLESS_DESCRIPTOR_SETS>>();
        if targets.is_empty() || desc.capacity == 0 {
            return;
        }

        let count = desc.capacity as usize;
        let needs = |types: &[DescriptorType]| {
            if targets.iter().any(|(_, _, t)| types.contains(t)) { count } else { 0 }
        };
        let null_buffers = vec![
            vk::DescriptorBufferInfo { buffer: vk::Buffer::null(), offset: 0, range: vk::WHOLE_SIZE };
            needs(&[DescriptorType::UniformBuffer, DescriptorType::StorageBuffer])
        ];
        let null_texel_views = vec![
            vk::BufferView::null();
            needs(&[DescriptorType::UniformTexelBuffer, DescriptorType::StorageTexelBuffer])
        ];
        let null_images = vec![
            vk::DescriptorImageInfo::default().image_layout(vk::ImageLayout::GENERAL);
            needs(&[DescriptorType::SampledImage, DescriptorType::StorageImage])
        ];

        let writes = targets
            .iter()
            .map(|(set, binding, descriptor_type)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(descriptor_type_to_vk(*descriptor_type));
                match descriptor_type {
                    DescriptorType::UniformBuffer | DescriptorType::StorageBuffer => base.buffer_info(&null_buffers),
                    DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
                        base.texel_buffer_view(&null_texel_views)
                    }
                    _ => base.image_info(&null_images),
                }
            })
            .collect::<ArrayVec<vk::WriteDescriptorSet, MAX_BINDLESS_DESCRIPTOR_SETS>>();

        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Point the extra bindings of every set at the side table buffer
    fn bind_side_tables(
        &self,
        desc: &HeapStorageDesc<'_>,
        sets: &[DescriptorSetHandle; MAX_BINDLESS_DESCRIPTOR_SETS],
        tables: &DeviceTables,
    ) {
        let mut infos = ArrayVec::<(vk::DescriptorSet, u32, vk::DescriptorBufferInfo), { 2 * MAX_BINDLESS_DESCRIPTOR_SETS }>::new();
        for (index, info) in desc.sets {
            let set = vk::DescriptorSet::from_raw(sets[*index].0);
            for (binding, extra) in info.extra_bindings().into_iter().enumerate() {
                infos.push((set, binding as u32, tables.binding_info(extra)));
            }
        }

        let writes = infos
            .iter()
            .map(|(set, binding, buffer_info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(buffer_info))
            })
            .collect::<ArrayVec<vk::WriteDescriptorSet, { 2 * MAX_BINDLESS_DESCRIPTOR_SETS }>>();

        if !writes.is_empty() {
            unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let layouts = self.set_layouts.get_mut().unwrap_or_else(PoisonError::into_inner);
            for (_, layout) in layouts.drain() {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
            self.ctx.device.destroy_sampler(self.null_sampler, None);
        }
    }
}

/// Where the info of one write lives
enum WriteInfo {
    Buffer(usize),
    Image(usize),
    TexelBuffer(usize),
}

impl DeviceBackend for VulkanBackend {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_buffer_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle> {
        let create_info = vk::BufferViewCreateInfo::default()
            .buffer(vk::Buffer::from_raw(desc.buffer.0))
            .format(format_to_vk(desc.format))
            .offset(desc.offset)
            .range(desc.size);

        let view = unsafe { self.ctx.device.create_buffer_view(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create buffer view: {:?}", e))?;
        view_handle(view, "buffer view")
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> Result<ViewHandle> {
        let components = if desc.allow_swizzle {
            swizzle_to_vk(&desc.swizzle)
        } else {
            vk::ComponentMapping::default()
        };

        let mut usage_info = vk::ImageViewUsageCreateInfo::default().usage(usage_to_vk(desc.usage));
        let mut min_lod_info = vk::ImageViewMinLodCreateInfoEXT::default().min_lod(desc.min_lod_clamp);

        let mut create_info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(desc.image.0))
            .view_type(view_type_to_vk(desc.view_type))
            .format(format_to_vk(desc.format))
            .components(components)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspects_to_vk(desc.aspects),
                base_mip_level: desc.base_mip,
                level_count: desc.mip_count,
                base_array_layer: desc.base_layer,
                layer_count: desc.layer_count,
            })
            .push_next(&mut usage_info);

        if desc.min_lod_clamp > 0.0 {
            if self.ctx.features.image_view_min_lod {
                create_info = create_info.push_next(&mut min_lod_info);
            } else {
                bridge_warn!(SOURCE, "Ignoring min LOD clamp {} without VK_EXT_image_view_min_lod",
                    desc.min_lod_clamp);
            }
        }

        let view = unsafe { self.ctx.device.create_image_view(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create image view: {:?}", e))?;
        view_handle(view, "image view")
    }

    fn create_sampler(&self, info: &SamplerInfo) -> Result<ViewHandle> {
        let mut reduction_info =
            vk::SamplerReductionModeCreateInfo::default().reduction_mode(reduction_to_vk(info.reduction));
        let mut border_info = vk::SamplerCustomBorderColorCreateInfoEXT::default()
            .custom_border_color(vk::ClearColorValue {
                float32: info.border_color.custom_rgba().unwrap_or_default(),
            })
            .format(vk::Format::UNDEFINED);

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(info.mag_filter))
            .min_filter(filter_to_vk(info.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(info.mip_filter))
            .address_mode_u(address_mode_to_vk(info.address_u))
            .address_mode_v(address_mode_to_vk(info.address_v))
            .address_mode_w(address_mode_to_vk(info.address_w))
            .mip_lod_bias(info.mip_lod_bias)
            .min_lod(info.min_lod)
            .max_lod(info.max_lod)
            .border_color(border_color_to_vk(info.border_color))
            .unnormalized_coordinates(false);

        if let Some(op) = info.compare_op {
            create_info = create_info
                .compare_enable(true)
                .compare_op(compare_op_to_vk(op));
        } else {
            create_info = create_info
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS);
        }

        if let Some(max_anisotropy) = info.max_anisotropy {
            create_info = create_info
                .anisotropy_enable(true)
                .max_anisotropy(max_anisotropy);
        } else {
            create_info = create_info
                .anisotropy_enable(false)
                .max_anisotropy(1.0);
        }

        if info.reduction != ReductionMode::WeightedAverage {
            create_info = create_info.push_next(&mut reduction_info);
        }
        if info.border_color.custom_rgba().is_some() {
            create_info = create_info.push_next(&mut border_info);
        }

        let sampler = unsafe { self.ctx.device.create_sampler(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create sampler: {:?}", e))?;
        view_handle(sampler, "sampler")
    }

    fn create_acceleration_structure_view(&self, desc: &BufferViewDesc) -> Result<ViewHandle> {
        let Some(loader) = self.ctx.acceleration_structure.as_ref() else {
            bridge_bail!(NotImplemented, SOURCE, "Acceleration structures require ray tracing support");
        };

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(vk::Buffer::from_raw(desc.buffer.0))
            .offset(desc.offset)
            .size(desc.size)
            .ty(vk::AccelerationStructureTypeKHR::GENERIC);

        let structure = unsafe { loader.create_acceleration_structure(&create_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE,
                "Failed to create acceleration structure: {:?}", e))?;
        view_handle(structure, "acceleration structure")
    }

    fn destroy_view(&self, kind: ViewKind, handle: ViewHandle) {
        let raw = handle.raw();
        unsafe {
            match kind {
                ViewKind::Buffer => self.ctx.device.destroy_buffer_view(vk::BufferView::from_raw(raw), None),
                ViewKind::Image => self.ctx.device.destroy_image_view(vk::ImageView::from_raw(raw), None),
                ViewKind::Sampler => self.ctx.device.destroy_sampler(vk::Sampler::from_raw(raw), None),
                ViewKind::AccelerationStructure => match self.ctx.acceleration_structure.as_ref() {
                    Some(loader) => loader.destroy_acceleration_structure(
                        vk::AccelerationStructureKHR::from_raw(raw), None),
                    None => bridge_error!(SOURCE, "Acceleration structure {:#x} destroyed without ray tracing", raw),
                },
            }
        }
    }

    fn buffer_device_address(&self, buffer: BufferHandle) -> u64 {
        let info = vk::BufferDeviceAddressInfo::default().buffer(vk::Buffer::from_raw(buffer.0));
        unsafe { self.ctx.device.get_buffer_device_address(&info) }
    }

    fn write_descriptors(&self, writes: &[DescriptorWrite]) {
        if writes.is_empty() {
            return;
        }

        let mut buffer_infos = Vec::with_capacity(writes.len());
        let mut image_infos = Vec::with_capacity(writes.len());
        let mut texel_views = Vec::with_capacity(writes.len());
        let mut locations = Vec::with_capacity(writes.len());

        for write in writes {
            let location = match (write.descriptor_type, write.payload) {
                (DescriptorType::Sampler, WritePayload::Sampler(sampler)) => {
                    image_infos.push(vk::DescriptorImageInfo::default().sampler(vk::Sampler::from_raw(sampler.raw())));
                    Some(WriteInfo::Image(image_infos.len() - 1))
                }
                (DescriptorType::Sampler, WritePayload::Null) => {
                    image_infos.push(vk::DescriptorImageInfo::default().sampler(self.null_sampler));
                    Some(WriteInfo::Image(image_infos.len() - 1))
                }
                (DescriptorType::SampledImage | DescriptorType::StorageImage, WritePayload::Image { view, layout }) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(vk::ImageView::from_raw(view.raw()))
                            .image_layout(image_layout_to_vk(layout)),
                    );
                    Some(WriteInfo::Image(image_infos.len() - 1))
                }
                (DescriptorType::SampledImage | DescriptorType::StorageImage, WritePayload::Null) => {
                    image_infos.push(vk::DescriptorImageInfo::default().image_layout(vk::ImageLayout::GENERAL));
                    Some(WriteInfo::Image(image_infos.len() - 1))
                }
                (
                    DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer,
                    WritePayload::TexelBuffer(view),
                ) => {
                    texel_views.push(vk::BufferView::from_raw(view.raw()));
                    Some(WriteInfo::TexelBuffer(texel_views.len() - 1))
                }
                (DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer, WritePayload::Null) => {
                    texel_views.push(vk::BufferView::null());
                    Some(WriteInfo::TexelBuffer(texel_views.len() - 1))
                }
                (DescriptorType::UniformBuffer | DescriptorType::StorageBuffer, WritePayload::Buffer(binding)) => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(binding.buffer.0),
                        offset: binding.offset,
                        range: binding.range,
                    });
                    Some(WriteInfo::Buffer(buffer_infos.len() - 1))
                }
                (DescriptorType::UniformBuffer | DescriptorType::StorageBuffer, WritePayload::Null) => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::null(),
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    });
                    Some(WriteInfo::Buffer(buffer_infos.len() - 1))
                }
                (descriptor_type, payload) => {
                    bridge_error!(SOURCE, "Dropping {:?} write with payload {:?}", descriptor_type, payload);
                    None
                }
            };
            locations.push(location);
        }

        let vk_writes = writes
            .iter()
            .zip(&locations)
            .filter_map(|(write, location)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(vk::DescriptorSet::from_raw(write.set.0))
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(descriptor_type_to_vk(write.descriptor_type));
                Some(match *location.as_ref()? {
                    WriteInfo::Buffer(index) => base.buffer_info(std::slice::from_ref(&buffer_infos[index])),
                    WriteInfo::Image(index) => base.image_info(std::slice::from_ref(&image_infos[index])),
                    WriteInfo::TexelBuffer(index) => {
                        base.texel_buffer_view(std::slice::from_ref(&texel_views[index]))
                    }
                })
            })
            .collect::<Vec<_>>();

        unsafe { self.ctx.device.update_descriptor_sets(&vk_writes, &[]) };
    }

    fn copy_descriptors(&self, copies: &[DescriptorCopy]) {
        if copies.is_empty() {
            return;
        }

        let vk_copies = copies
            .iter()
            .map(|copy| {
                vk::CopyDescriptorSet::default()
                    .src_set(vk::DescriptorSet::from_raw(copy.src_set.0))
                    .src_binding(copy.src_binding)
                    .src_array_element(copy.src_array_element)
                    .dst_set(vk::DescriptorSet::from_raw(copy.dst_set.0))
                    .dst_binding(copy.dst_binding)
                    .dst_array_element(copy.dst_array_element)
                    .descriptor_count(copy.count)
            })
            .collect::<Vec<_>>();

        unsafe { self.ctx.device.update_descriptor_sets(&[], &vk_copies) };
    }

    fn create_heap_storage(&self, desc: &HeapStorageDesc<'_>) -> Result<HeapStorage> {
        if desc.sets.is_empty() {
            return Ok(HeapStorage::empty());
        }
        let max = self.max_descriptors(desc.kind);
        if desc.capacity > max {
            bridge_bail!(InvalidArgument, SOURCE,
                "{:?} heap of {} descriptors exceeds the device limit of {}", desc.kind, desc.capacity, max);
        }

        let pool = self.create_heap_pool(desc)?;
        let destroy_pool = |error: Error| {
            unsafe { self.ctx.device.destroy_descriptor_pool(pool, None) };
            error
        };

        let sets = self.allocate_heap_sets(desc, pool).map_err(destroy_pool)?;
        self.null_initialize_heap_sets(desc, &sets);

        let tables: Option<Box<dyn HostTables>> = if desc.raw_va_words == 0 && desc.buffer_range_words == 0 {
            None
        } else if desc.shader_visible {
            let device_tables = DeviceTables::new(&self.ctx, desc.raw_va_words, desc.buffer_range_words)
                .map_err(destroy_pool)?;
            self.bind_side_tables(desc, &sets, &device_tables);
            Some(Box::new(device_tables))
        } else {
            Some(Box::new(HostOnlyTables::new(desc.raw_va_words, desc.buffer_range_words)))
        };

        bridge_debug!(SOURCE, "Created {:?} heap storage {:#x} with {} sets", desc.kind, desc.heap_cookie, desc.sets.len());

        Ok(HeapStorage {
            pool: Some(DescriptorPoolHandle(pool.as_raw())),
            sets,
            tables,
        })
    }

    fn destroy_heap_storage(&self, storage: HeapStorage) {
        if let Some(pool) = storage.pool {
            unsafe {
                self.ctx.device.destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.0), None);
            }
        }
        drop(storage.tables);
    }

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: descriptor_type_to_vk(desc.descriptor_type),
            descriptor_count: desc.descriptor_count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(desc.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { self.ctx.device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create descriptor pool: {:?}", e))?;
        Ok(DescriptorPoolHandle(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.ctx.device.destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.0), None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: SetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, PoolAllocError> {
        let layouts = [vk::DescriptorSetLayout::from_raw(layout.0)];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.0))
            .set_layouts(&layouts);

        match unsafe { self.ctx.device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets
                .first()
                .map(|set| DescriptorSetHandle(set.as_raw()))
                .ok_or_else(|| PoolAllocError::Failed(
                    bridge_err!(DeviceCallFailed, SOURCE, "Driver returned no descriptor set"))),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(PoolAllocError::OutOfPoolMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(PoolAllocError::FragmentedPool),
            Err(e) => Err(PoolAllocError::Failed(
                bridge_err!(DeviceCallFailed, SOURCE, "Failed to allocate descriptor set: {:?}", e))),
        }
    }

    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, set: DescriptorSetHandle) {
        let sets = [vk::DescriptorSet::from_raw(set.0)];
        let freed = unsafe {
            self.ctx.device.free_descriptor_sets(vk::DescriptorPool::from_raw(pool.0), &sets)
        };
        if let Err(e) = freed {
            bridge_error!(SOURCE, "Failed to free descriptor set {:#x}: {:?}", set.0, e);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_backend_tests.rs"]
mod tests;
