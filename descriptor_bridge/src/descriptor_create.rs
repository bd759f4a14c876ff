//! Descriptor write engine
//!
//! Every `create_*` call computes the complete new slot state and the
//! physical writes first, then commits both under the slot lock. A call
//! that fails leaves the slot as it was.
//!
//! Callers serialize writes to the same slot; concurrent writes to
//! different slots are independent.

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::backend::{DescriptorWrite, ImageLayout, WritePayload};
use crate::bindless::{BindlessFlags, BindlessSetFlags, DescriptorBinding, MAX_BINDLESS_DESCRIPTOR_SETS};
use crate::context::DeviceContext;
use crate::descriptor::{
    BoundBufferRange, BufferBinding, DescriptorFlags, DescriptorMetadata, DescriptorPayload,
    DescriptorState, DescriptorType,
};
use crate::descriptor_qa::QaTypeFlags;
use crate::device::{Device, SOURCE};
use crate::error::Result;
use crate::format::{Format, FormatAspects};
use crate::heap::{DescriptorRef, HeapKind, RtvDescriptor, RtvRef};
use crate::quantize::{align_byte_range, quantize_typed_range, QuantizedRange};
use crate::resource::{Resource, ResourceDimension};
use crate::sampler::{SamplerDesc, SamplerInfo};
use crate::view::ViewRef;
use crate::view_desc::{
    BufferElements, BufferUav, BufferViewFlags, ConstantBufferViewDesc, DepthStencilViewDesc, DsvDimension,
    RenderTargetViewDesc, RtvDimension, ShaderResourceViewDesc, SrvDimension, TextureSlice,
    TextureSrv, UavDimension, UnorderedAccessViewDesc, REMAINING,
};
use crate::view_key::{BufferViewDesc, ImageUsage, ImageViewDesc, ImageViewType, Swizzle, ViewKey};
use crate::{bridge_bail, bridge_err, bridge_warn};

type WriteBatch = ArrayVec<DescriptorWrite, MAX_BINDLESS_DESCRIPTOR_SETS>;

// ============================================================================
// SLOT COMMIT
// ============================================================================

fn find_binding(ctx: &DeviceContext, flags: BindlessSetFlags) -> Result<DescriptorBinding> {
    ctx.bindless.find_binding(flags).ok_or_else(|| {
        bridge_err!(NotImplemented, SOURCE, "No bindless set holds {:?} descriptors", flags)
    })
}

fn push_write(
    writes: &mut WriteBatch,
    slot: DescriptorRef<'_>,
    binding: DescriptorBinding,
    descriptor_type: DescriptorType,
    payload: WritePayload,
) {
    writes.push(DescriptorWrite {
        set: slot.heap().set_handle(binding.set_info_index),
        binding: binding.binding,
        array_element: slot.index(),
        descriptor_type,
        payload,
    });
}

/// Publish `state` and apply `writes` for one slot
fn commit(slot: DescriptorRef<'_>, state: DescriptorState, writes: &[DescriptorWrite], qa_types: QaTypeFlags) {
    let heap = slot.heap();
    let ctx = heap.context();
    let cookie = state.metadata.cookie;

    let mut current = slot.slot().lock();
    if !writes.is_empty() {
        ctx.backend.write_descriptors(writes);
    }
    *current = state;
    drop(current);

    ctx.notify_qa(|qa| qa.write_descriptor(heap.cookie(), slot.index(), qa_types, cookie));
}

/// Reset `slot` to a null descriptor pretending to be `null_type`
///
/// No-op when the slot already holds the same kind of null.
pub(crate) fn write_null_descriptor(slot: DescriptorRef<'_>, null_type: DescriptorType) {
    let heap = slot.heap();
    let ctx = heap.context();
    let template = heap.null_template();
    let tag = template.null_tag(null_type);

    let mut state = slot.slot().lock();
    if state.is_null() && state.metadata.current_null_type == tag {
        return;
    }

    let writes = template.writes_for(slot.index(), null_type);
    if !writes.is_empty() {
        ctx.backend.write_descriptors(&writes);
    }

    *state = DescriptorState {
        metadata: DescriptorMetadata {
            cookie: 0,
            set_info_mask: template.set_info_mask(),
            flags: DescriptorFlags::empty(),
            current_null_type: tag,
        },
        payload: DescriptorPayload::default(),
    };
    heap.store_raw_va(slot.index(), 0);
    heap.store_buffer_range(slot.index(), BoundBufferRange::default());
    drop(state);

    ctx.notify_qa(|qa| qa.write_descriptor(heap.cookie(), slot.index(), QaTypeFlags::universal_null(), 0));
}

fn expect_heap(slot: DescriptorRef<'_>, kind: HeapKind, what: &str) -> Result<()> {
    if slot.heap().kind() != kind {
        bridge_bail!(InvalidArgument, SOURCE,
            "{} written to a {:?} heap", what, slot.heap().kind());
    }
    Ok(())
}

fn non_null_metadata(cookie: u64) -> DescriptorMetadata {
    DescriptorMetadata {
        cookie,
        set_info_mask: 0,
        flags: DescriptorFlags::NON_NULL,
        current_null_type: None,
    }
}

// ============================================================================
// BUFFER VIEWS
// ============================================================================

/// Storage buffer binding for a byte range of `resource`, plus the residual
/// offset shaders must add
fn ssbo_binding(ctx: &DeviceContext, resource: &Resource, offset: u64, range: u64) -> (BufferBinding, u64) {
    let aligned = align_byte_range(
        offset,
        range,
        ctx.caps.min_storage_buffer_offset_alignment,
        resource.desc().width,
    );
    let binding = BufferBinding {
        buffer: resource.buffer(),
        offset: resource.memory_offset() + aligned.offset,
        range: aligned.range,
    };
    (binding, aligned.byte_offset)
}

/// Byte offset and size of `elements`, rejecting ranges that do not fit
/// inside `resource`
fn element_byte_range(resource: &Resource, elements: &BufferElements, stride: u64) -> Result<(u64, u64)> {
    let width = resource.desc().width;
    let offset = elements.first_element.checked_mul(stride);
    let size = (elements.num_elements as u64).checked_mul(stride);
    match (offset, size) {
        (Some(offset), Some(size)) if offset.checked_add(size).is_some_and(|end| end <= width) => {
            Ok((offset, size))
        }
        _ => Err(bridge_err!(InvalidArgument, SOURCE,
            "Elements {}+{} of {} bytes do not fit buffer {:#x} of {} bytes",
            elements.first_element, elements.num_elements, stride, resource.cookie(), width)),
    }
}

/// Typed (possibly quantized) view of a buffer element range
fn typed_buffer_view(
    ctx: &DeviceContext,
    resource: &Resource,
    format: Format,
    elements: &BufferElements,
) -> Result<(ViewRef, QuantizedRange)> {
    let stride = elements.structure_byte_stride as u64;
    let structured = format == Format::Unknown && stride != 0;

    let (view_format, mut element_size) =
        if format == Format::R32_TYPELESS && elements.flags.contains(BufferViewFlags::RAW) {
            (Format::R32_UINT, 4)
        } else if structured {
            (Format::R32_UINT, stride)
        } else {
            let resolved = format.or_resource(resource.desc().format);
            if resolved == Format::Unknown || resolved.byte_count() == 0 {
                bridge_bail!(InvalidArgument, SOURCE,
                    "No format for buffer view (view {:?}, resource {:?})", format, resource.desc().format);
            }
            (resolved, resolved.byte_count() as u64)
        };

    element_byte_range(resource, elements, element_size)?;
    let mut first = elements.first_element;
    let mut count = elements.num_elements as u64;
    let width = resource.desc().width;

    let range = if ctx.bindless.flags().contains(BindlessFlags::TYPED_OFFSET_BUFFER) {
        let max_resource_elements = if structured {
            // Offsets are published in words for structured buffers
            first = first * stride / 4;
            count = count * stride / 4;
            element_size = 4;
            width / 4
        } else {
            width / element_size
        };
        quantize_typed_range(first, count, max_resource_elements, ctx.caps.max_texel_buffer_elements)
    } else {
        QuantizedRange::exact(first, count)
    };

    let key = ViewKey::Buffer(BufferViewDesc {
        buffer: resource.buffer(),
        format: view_format,
        offset: resource.memory_offset() + range.view_first * element_size,
        size: range.view_count * element_size,
    });
    let view = resource.view(&key)?;
    Ok((view, range))
}

/// Bytes per element as seen by the storage buffer path
fn raw_stride(resource: &Resource, format: Format, elements: &BufferElements) -> u64 {
    if format == Format::Unknown && elements.structure_byte_stride != 0 {
        elements.structure_byte_stride as u64
    } else {
        format.or_resource(resource.desc().format).byte_count() as u64
    }
}

/// State shared by buffer SRVs and UAVs before the typed write
struct BufferDescriptor {
    state: DescriptorState,
    writes: WriteBatch,
    bound: BoundBufferRange,
    qa_types: QaTypeFlags,
}

impl BufferDescriptor {
    fn new(cookie: u64, flags: DescriptorFlags) -> Self {
        let mut metadata = non_null_metadata(cookie);
        metadata.flags |= flags;
        Self {
            state: DescriptorState { metadata, payload: DescriptorPayload::default() },
            writes: WriteBatch::new(),
            bound: BoundBufferRange::default(),
            qa_types: QaTypeFlags::empty(),
        }
    }

    fn add_ssbo(
        &mut self,
        ctx: &DeviceContext,
        slot: DescriptorRef<'_>,
        resource: &Resource,
        format: Format,
        elements: &BufferElements,
        set: BindlessSetFlags,
    ) -> Result<()> {
        let stride = raw_stride(resource, format, elements);
        let (first_byte, byte_count) = element_byte_range(resource, elements, stride)?;
        let (binding, byte_offset) = ssbo_binding(ctx, resource, first_byte, byte_count);
        let target = find_binding(ctx, set | BindlessSetFlags::RAW_SSBO)?;

        push_write(&mut self.writes, slot, target, DescriptorType::StorageBuffer, WritePayload::Buffer(binding));
        self.bound.byte_offset = byte_offset as u32;
        self.bound.byte_count = byte_count as u32;

        let metadata = &mut self.state.metadata;
        metadata.cookie = resource.cookie();
        metadata.set_info_mask |= 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::OFFSET_RANGE;
        if ctx.bindless.flags().contains(BindlessFlags::SSBO_OFFSET_BUFFER) {
            metadata.flags |= DescriptorFlags::BUFFER_OFFSET;
        }
        self.state.payload.buffer = Some(binding);
        self.qa_types |= QaTypeFlags::STORAGE_BUFFER;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_typed(
        &mut self,
        ctx: &DeviceContext,
        slot: DescriptorRef<'_>,
        resource: &Resource,
        format: Format,
        elements: &BufferElements,
        set: BindlessSetFlags,
        descriptor_type: DescriptorType,
    ) -> Result<()> {
        let (view, range) = typed_buffer_view(ctx, resource, format, elements)?;
        let target = find_binding(ctx, set | BindlessSetFlags::BUFFER)?;

        push_write(&mut self.writes, slot, target, descriptor_type, WritePayload::TexelBuffer(view.handle()));
        self.bound.element_offset = range.element_offset as u32;
        self.bound.element_count = range.element_count as u32;

        // The view identifies the descriptor more precisely than the resource
        let metadata = &mut self.state.metadata;
        metadata.cookie = view.cookie();
        metadata.set_info_mask |= 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::VIEW;
        if ctx.bindless.flags().contains(BindlessFlags::TYPED_OFFSET_BUFFER) {
            metadata.flags |= DescriptorFlags::BUFFER_OFFSET;
        }
        self.state.payload.view = Some(view);
        self.qa_types |= match descriptor_type {
            DescriptorType::StorageTexelBuffer => QaTypeFlags::STORAGE_TEXEL_BUFFER,
            _ => QaTypeFlags::UNIFORM_TEXEL_BUFFER,
        };
        Ok(())
    }

    fn commit(self, slot: DescriptorRef<'_>) {
        if self.state.metadata.flags.contains(DescriptorFlags::BUFFER_OFFSET) {
            slot.heap().store_buffer_range(slot.index(), self.bound);
        }
        commit(slot, self.state, &self.writes, self.qa_types);
    }
}

// ============================================================================
// TEXTURE VIEWS
// ============================================================================

/// Whole-resource view of a texture with a single mip
fn default_texture_view(resource: &Resource, view_format: Format, usage: ImageUsage) -> Result<ImageViewDesc> {
    let desc = resource.desc();
    let format = view_format.or_resource(desc.format);
    if format == Format::Unknown {
        bridge_bail!(InvalidArgument, SOURCE,
            "No format for texture view of resource {:#x}", resource.cookie());
    }

    let view_type = match desc.dimension {
        ResourceDimension::Texture1D if desc.depth_or_array_size > 1 => ImageViewType::D1Array,
        ResourceDimension::Texture1D => ImageViewType::D1,
        ResourceDimension::Texture2D if desc.depth_or_array_size > 1 => ImageViewType::D2Array,
        ResourceDimension::Texture2D => ImageViewType::D2,
        ResourceDimension::Texture3D => ImageViewType::D3,
        ResourceDimension::Buffer => {
            bridge_bail!(InvalidArgument, SOURCE,
                "Texture view requested for buffer resource {:#x}", resource.cookie());
        }
    };

    Ok(ImageViewDesc {
        image: resource.image(),
        view_type,
        format,
        aspects: format.aspects(),
        usage,
        base_mip: 0,
        mip_count: 1,
        min_lod_clamp: 0.0,
        base_layer: 0,
        layer_count: desc.layer_count(),
        swizzle: Swizzle::IDENTITY,
        allow_swizzle: false,
    })
}

fn unsupported_dimension<T: std::fmt::Debug>(resource: &Resource, dimension: &T) -> crate::error::Error {
    bridge_err!(InvalidArgument, SOURCE,
        "Unsupported view dimension {:?} for {:?} resource {:#x}",
        dimension, resource.desc().dimension, resource.cookie())
}

fn require_dimension<T: std::fmt::Debug>(resource: &Resource, expected: ResourceDimension, dimension: &T) -> Result<()> {
    if resource.desc().dimension != expected {
        return Err(unsupported_dimension(resource, dimension));
    }
    Ok(())
}

fn apply_texture_srv(key: &mut ImageViewDesc, view_type: ImageViewType, texture: &TextureSrv, layers: Option<u32>) {
    key.view_type = view_type;
    key.base_mip = texture.most_detailed_mip;
    key.mip_count = texture.mip_levels;
    key.min_lod_clamp = texture.min_lod_clamp;
    match layers {
        Some(count) => {
            key.base_layer = 0;
            key.layer_count = count;
        }
        None => {
            key.base_layer = texture.first_array_slice;
            key.layer_count = texture.array_size;
        }
    }
}

fn apply_slice(key: &mut ImageViewDesc, view_type: ImageViewType, slice: &TextureSlice, array: bool) {
    key.view_type = view_type;
    key.base_mip = slice.mip_slice;
    if array {
        key.base_layer = slice.first_array_slice;
        key.layer_count = slice.array_size;
    } else {
        key.base_layer = 0;
        key.layer_count = 1;
    }
}

/// Clamp mip and layer counts to what the resource has, resolving
/// `REMAINING`, and reject ranges starting past the end
fn resolve_ranges(resource: &Resource, key: &mut ImageViewDesc, max_layers: u32) -> Result<()> {
    let mips = resource.desc().mip_levels;
    if key.base_mip >= mips || key.base_layer >= max_layers {
        bridge_bail!(InvalidArgument, SOURCE,
            "View range mip {} layer {} outside resource {:#x} ({} mips, {} layers)",
            key.base_mip, key.base_layer, resource.cookie(), mips, max_layers);
    }
    key.mip_count = key.mip_count.min(mips - key.base_mip);
    key.layer_count = key.layer_count.min(max_layers - key.base_layer);
    Ok(())
}

fn texture_srv_key(resource: &Resource, desc: Option<&ShaderResourceViewDesc>) -> Result<ImageViewDesc> {
    let mut key = default_texture_view(resource, desc.map_or(Format::Unknown, |d| d.format), ImageUsage::Sampled)?;
    key.mip_count = REMAINING;
    key.allow_swizzle = true;

    if let Some(desc) = desc {
        key.swizzle = Swizzle::from_component_mapping(desc.component_mapping);

        use ResourceDimension as Dim;
        match &desc.dimension {
            SrvDimension::Texture1D(t) => {
                require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::D1, t, Some(1));
            }
            SrvDimension::Texture1DArray(t) => {
                require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::D1Array, t, None);
            }
            SrvDimension::Texture2D(t) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::D2, t, Some(1));
            }
            SrvDimension::Texture2DArray(t) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::D2Array, t, None);
            }
            SrvDimension::Texture2DMs => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                key.view_type = ImageViewType::D2;
                key.layer_count = 1;
            }
            SrvDimension::Texture2DMsArray { first_array_slice, array_size } => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                key.view_type = ImageViewType::D2Array;
                key.base_layer = *first_array_slice;
                key.layer_count = *array_size;
            }
            SrvDimension::Texture3D(t) => {
                require_dimension(resource, Dim::Texture3D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::D3, t, Some(1));
            }
            SrvDimension::TextureCube(t) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::Cube, t, Some(6));
            }
            SrvDimension::TextureCubeArray(t) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_texture_srv(&mut key, ImageViewType::CubeArray, t, None);
                if key.layer_count != REMAINING {
                    key.layer_count = key.layer_count.saturating_mul(6);
                }
            }
            SrvDimension::Buffer(_) | SrvDimension::RaytracingAccelerationStructure { .. } => {
                return Err(unsupported_dimension(resource, &desc.dimension));
            }
        }
    }

    // Sample the depth plane of depth/stencil formats
    if key.aspects.contains(FormatAspects::DEPTH) {
        key.aspects = FormatAspects::DEPTH;
    }

    resolve_ranges(resource, &mut key, resource.desc().layer_count())?;
    let last_mip = (resource.desc().mip_levels - 1) as f32;
    key.min_lod_clamp = key.min_lod_clamp.min(last_mip);
    Ok(key)
}

fn texture_uav_key(resource: &Resource, desc: Option<&UnorderedAccessViewDesc>) -> Result<ImageViewDesc> {
    let mut key = default_texture_view(resource, desc.map_or(Format::Unknown, |d| d.format), ImageUsage::Storage)?;
    if key.format.is_compressed() {
        bridge_bail!(InvalidArgument, SOURCE,
            "UAVs cannot be created for compressed format {:?}", key.format);
    }

    if let Some(desc) = desc {
        use ResourceDimension as Dim;
        match &desc.dimension {
            UavDimension::Texture1D(s) => {
                require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                apply_slice(&mut key, ImageViewType::D1, s, false);
            }
            UavDimension::Texture1DArray(s) => {
                require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                apply_slice(&mut key, ImageViewType::D1Array, s, true);
            }
            UavDimension::Texture2D(s) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_slice(&mut key, ImageViewType::D2, s, false);
            }
            UavDimension::Texture2DArray(s) => {
                require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                apply_slice(&mut key, ImageViewType::D2Array, s, true);
            }
            UavDimension::Texture3D(s) => {
                require_dimension(resource, Dim::Texture3D, &desc.dimension)?;
                apply_slice(&mut key, ImageViewType::D3, s, false);
                warn_partial_w_range(resource, s);
            }
            UavDimension::Buffer(_) => return Err(unsupported_dimension(resource, &desc.dimension)),
        }
    }

    resolve_ranges(resource, &mut key, resource.desc().layer_count())?;
    Ok(key)
}

/// 3D storage views always cover every W slice of their mip
fn warn_partial_w_range(resource: &Resource, slice: &TextureSlice) {
    let depth = resource.desc().depth_at_mip(slice.mip_slice);
    let partial = slice.first_array_slice != 0
        || (slice.array_size != REMAINING && slice.array_size < depth);
    if partial {
        bridge_warn!(SOURCE,
            "W slices {}+{} of resource {:#x} mip {} cannot be selected, binding all {} slices",
            slice.first_array_slice, slice.array_size, resource.cookie(), slice.mip_slice, depth);
    }
}

// ============================================================================
// CREATE OPERATIONS
// ============================================================================

impl Device {
    /// Write a constant buffer view into `slot`
    ///
    /// A zero `buffer_location` writes a null descriptor.
    pub fn create_constant_buffer_view(&self, slot: DescriptorRef<'_>, desc: &ConstantBufferViewDesc) -> Result<()> {
        expect_heap(slot, HeapKind::CbvSrvUav, "CBV")?;
        let ctx = self.context();

        let alignment = ctx.config.constant_buffer_alignment.max(1);
        if desc.size_in_bytes as u64 % alignment != 0 {
            bridge_bail!(InvalidArgument, SOURCE,
                "Constant buffer view size {} is not {} bytes aligned", desc.size_in_bytes, alignment);
        }

        let descriptor_type = ctx.bindless.cbv_descriptor_type();
        if desc.buffer_location == 0 {
            write_null_descriptor(slot, descriptor_type);
            return Ok(());
        }

        let range = ctx.va_map.lookup(desc.buffer_location).ok_or_else(|| {
            bridge_err!(InvalidArgument, SOURCE,
                "Constant buffer location {:#x} is not inside any buffer", desc.buffer_location)
        })?;
        let offset = range.resource_offset(desc.buffer_location);
        let binding = BufferBinding {
            buffer: range.buffer,
            offset: range.buffer_offset(desc.buffer_location),
            range: (desc.size_in_bytes as u64).min(range.size - offset),
        };
        let target = find_binding(ctx, BindlessSetFlags::CBV)?;

        let mut writes = WriteBatch::new();
        push_write(&mut writes, slot, target, descriptor_type, WritePayload::Buffer(binding));

        let mut metadata = non_null_metadata(range.cookie);
        metadata.set_info_mask = 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::OFFSET_RANGE;
        let state = DescriptorState {
            metadata,
            payload: DescriptorPayload { buffer: Some(binding), ..Default::default() },
        };

        let qa_types = match descriptor_type {
            DescriptorType::UniformBuffer => QaTypeFlags::UNIFORM_BUFFER,
            _ => QaTypeFlags::STORAGE_BUFFER,
        };
        commit(slot, state, &writes, qa_types);
        Ok(())
    }

    /// Write a shader resource view into `slot`
    ///
    /// `resource: None` writes a null descriptor of the kind `desc`
    /// describes. Acceleration structures are addressed by location and
    /// take no resource.
    pub fn create_shader_resource_view(
        &self,
        slot: DescriptorRef<'_>,
        resource: Option<&Resource>,
        desc: Option<&ShaderResourceViewDesc>,
    ) -> Result<()> {
        expect_heap(slot, HeapKind::CbvSrvUav, "SRV")?;

        if let Some(desc) = desc {
            match &desc.dimension {
                SrvDimension::RaytracingAccelerationStructure { location } => {
                    return self.create_acceleration_structure_srv(slot, *location);
                }
                SrvDimension::Buffer(elements) => {
                    return self.create_buffer_srv(slot, resource, desc.format, elements);
                }
                _ => {}
            }
        }

        let Some(resource) = resource else {
            if desc.is_none() {
                bridge_bail!(InvalidArgument, SOURCE, "Null SRV requires a view description");
            }
            write_null_descriptor(slot, DescriptorType::SampledImage);
            return Ok(());
        };

        if resource.is_buffer() {
            bridge_bail!(NotImplemented, SOURCE,
                "Default SRV of buffer resource {:#x} is not supported", resource.cookie());
        }
        self.create_texture_srv(slot, resource, desc)
    }

    fn create_acceleration_structure_srv(&self, slot: DescriptorRef<'_>, location: u64) -> Result<()> {
        if location == 0 {
            write_null_descriptor(slot, DescriptorType::SampledImage);
            return Ok(());
        }

        let ctx = self.context();
        if !ctx.caps.ray_tracing {
            bridge_bail!(NotImplemented, SOURCE,
                "Acceleration structure SRV on a device without ray tracing");
        }
        if !slot.heap().has_raw_va_table() {
            bridge_bail!(NotImplemented, SOURCE,
                "Acceleration structure SRV requires the raw VA side table");
        }
        if ctx.va_map.lookup(location).is_none() {
            bridge_bail!(InvalidArgument, SOURCE,
                "Acceleration structure location {:#x} is not inside any buffer", location);
        }

        // A naked address: no view, no set write, no identity
        let mut metadata = non_null_metadata(0);
        metadata.flags |= DescriptorFlags::RAW_VA_AUX_BUFFER;
        let state = DescriptorState { metadata, payload: DescriptorPayload::default() };

        slot.heap().store_raw_va(slot.index(), location);
        commit(slot, state, &[], QaTypeFlags::RT_ACCELERATION_STRUCTURE | QaTypeFlags::RAW_VA);
        Ok(())
    }

    fn create_buffer_srv(
        &self,
        slot: DescriptorRef<'_>,
        resource: Option<&Resource>,
        format: Format,
        elements: &BufferElements,
    ) -> Result<()> {
        let Some(resource) = resource else {
            write_null_descriptor(slot, DescriptorType::UniformTexelBuffer);
            return Ok(());
        };
        if !resource.is_buffer() {
            bridge_bail!(InvalidArgument, SOURCE,
                "Buffer SRV of texture resource {:#x}", resource.cookie());
        }

        let ctx = self.context();
        let mut descriptor = BufferDescriptor::new(resource.cookie(), DescriptorFlags::empty());
        if ctx.bindless.flags().contains(BindlessFlags::SSBO_RAW_BUFFERS) {
            descriptor.add_ssbo(ctx, slot, resource, format, elements, BindlessSetFlags::SRV)?;
        }
        descriptor.add_typed(
            ctx,
            slot,
            resource,
            format,
            elements,
            BindlessSetFlags::SRV,
            DescriptorType::UniformTexelBuffer,
        )?;
        descriptor.commit(slot);
        Ok(())
    }

    fn create_texture_srv(
        &self,
        slot: DescriptorRef<'_>,
        resource: &Resource,
        desc: Option<&ShaderResourceViewDesc>,
    ) -> Result<()> {
        let ctx = self.context();
        let key = texture_srv_key(resource, desc)?;
        let view = resource.view(&ViewKey::Image(key))?;
        let target = find_binding(ctx, BindlessSetFlags::SRV | BindlessSetFlags::IMAGE)?;

        let mut writes = WriteBatch::new();
        push_write(
            &mut writes,
            slot,
            target,
            DescriptorType::SampledImage,
            WritePayload::Image { view: view.handle(), layout: resource.common_layout() },
        );

        let mut metadata = non_null_metadata(view.cookie());
        metadata.set_info_mask = 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::VIEW;
        let state = DescriptorState {
            metadata,
            payload: DescriptorPayload { view: Some(view), ..Default::default() },
        };
        commit(slot, state, &writes, QaTypeFlags::SAMPLED_IMAGE);
        Ok(())
    }

    /// Write an unordered access view into `slot`
    ///
    /// `counter` provides the append/consume counter of buffer UAVs.
    pub fn create_unordered_access_view(
        &self,
        slot: DescriptorRef<'_>,
        resource: Option<&Resource>,
        counter: Option<&Resource>,
        desc: Option<&UnorderedAccessViewDesc>,
    ) -> Result<()> {
        expect_heap(slot, HeapKind::CbvSrvUav, "UAV")?;

        if let Some(UnorderedAccessViewDesc { format, dimension: UavDimension::Buffer(uav) }) = desc {
            return self.create_buffer_uav(slot, resource, counter, *format, uav);
        }

        let Some(resource) = resource else {
            if desc.is_none() {
                bridge_bail!(InvalidArgument, SOURCE, "Null UAV requires a view description");
            }
            write_null_descriptor(slot, DescriptorType::StorageImage);
            return Ok(());
        };

        if resource.is_buffer() {
            bridge_bail!(NotImplemented, SOURCE,
                "Default UAV of buffer resource {:#x} is not supported", resource.cookie());
        }
        if counter.is_some() {
            bridge_warn!(SOURCE, "Ignoring counter resource of texture UAV");
        }
        self.create_texture_uav(slot, resource, desc)
    }

    fn create_buffer_uav(
        &self,
        slot: DescriptorRef<'_>,
        resource: Option<&Resource>,
        counter: Option<&Resource>,
        format: Format,
        uav: &BufferUav,
    ) -> Result<()> {
        let Some(resource) = resource else {
            write_null_descriptor(slot, DescriptorType::StorageTexelBuffer);
            return Ok(());
        };
        if !resource.is_buffer() {
            bridge_bail!(InvalidArgument, SOURCE,
                "Buffer UAV of texture resource {:#x}", resource.cookie());
        }

        let ctx = self.context();
        let flags = ctx.bindless.flags();
        let mut descriptor = BufferDescriptor::new(resource.cookie(), DescriptorFlags::RAW_VA_AUX_BUFFER);
        if flags.contains(BindlessFlags::SSBO_RAW_BUFFERS) {
            descriptor.add_ssbo(ctx, slot, resource, format, &uav.elements, BindlessSetFlags::UAV)?;
        }
        descriptor.add_typed(
            ctx,
            slot,
            resource,
            format,
            &uav.elements,
            BindlessSetFlags::UAV,
            DescriptorType::StorageTexelBuffer,
        )?;

        let mut counter_va = 0;
        let mut counter_view = None;
        if let Some(counter) = counter {
            if !counter.is_buffer() {
                bridge_bail!(InvalidArgument, SOURCE,
                    "UAV counter resource {:#x} is not a buffer", counter.cookie());
            }
            let counter_end = uav.counter_offset_in_bytes.checked_add(4);
            if !counter_end.is_some_and(|end| end <= counter.desc().width) {
                bridge_bail!(InvalidArgument, SOURCE,
                    "UAV counter offset {} outside counter resource {:#x} of {} bytes",
                    uav.counter_offset_in_bytes, counter.cookie(), counter.desc().width);
            }
            if flags.contains(BindlessFlags::RAW_VA_AUX_BUFFER) {
                counter_va = counter.va() + uav.counter_offset_in_bytes;
            } else {
                let key = ViewKey::Buffer(BufferViewDesc {
                    buffer: counter.buffer(),
                    format: Format::R32_UINT,
                    offset: counter.memory_offset() + uav.counter_offset_in_bytes / 4 * 4,
                    size: 4,
                });
                counter_view = Some(counter.view(&key)?);
            }
            descriptor.qa_types |= QaTypeFlags::RAW_VA;
        }

        if flags.contains(BindlessFlags::RAW_VA_AUX_BUFFER) {
            slot.heap().store_raw_va(slot.index(), counter_va);
        } else {
            // Counter set is not part of the slot's set mask; copies reach it
            // through the RAW_VA_AUX_BUFFER flag
            let target = find_binding(ctx, BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER)?;
            let payload = counter_view
                .as_ref()
                .map_or(WritePayload::Null, |view| WritePayload::TexelBuffer(view.handle()));
            push_write(&mut descriptor.writes, slot, target, DescriptorType::StorageTexelBuffer, payload);
            descriptor.state.payload.counter_view = counter_view;
        }

        descriptor.commit(slot);
        Ok(())
    }

    fn create_texture_uav(
        &self,
        slot: DescriptorRef<'_>,
        resource: &Resource,
        desc: Option<&UnorderedAccessViewDesc>,
    ) -> Result<()> {
        let ctx = self.context();
        let key = texture_uav_key(resource, desc)?;
        let view = resource.view(&ViewKey::Image(key))?;
        let target = find_binding(ctx, BindlessSetFlags::UAV | BindlessSetFlags::IMAGE)?;

        let mut writes = WriteBatch::new();
        push_write(
            &mut writes,
            slot,
            target,
            DescriptorType::StorageImage,
            WritePayload::Image { view: view.handle(), layout: ImageLayout::General },
        );

        let mut metadata = non_null_metadata(view.cookie());
        metadata.set_info_mask = 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::VIEW;
        let state = DescriptorState {
            metadata,
            payload: DescriptorPayload { view: Some(view), ..Default::default() },
        };
        commit(slot, state, &writes, QaTypeFlags::STORAGE_IMAGE);
        Ok(())
    }

    /// Write a sampler into a sampler heap slot
    pub fn create_sampler_descriptor(&self, slot: DescriptorRef<'_>, desc: &SamplerDesc) -> Result<()> {
        expect_heap(slot, HeapKind::Sampler, "Sampler")?;
        let ctx = self.context();

        let info = SamplerInfo::from_desc(desc, &ctx.caps)?;
        let view = self.sampler_cache().find_or_create(ctx, &ViewKey::Sampler(info))?;
        let target = find_binding(ctx, BindlessSetFlags::SAMPLER)?;

        let mut writes = WriteBatch::new();
        push_write(&mut writes, slot, target, DescriptorType::Sampler, WritePayload::Sampler(view.handle()));

        let mut metadata = non_null_metadata(view.cookie());
        metadata.set_info_mask = 1u32 << target.set_info_index;
        metadata.flags |= DescriptorFlags::VIEW;
        let state = DescriptorState {
            metadata,
            payload: DescriptorPayload { view: Some(view), ..Default::default() },
        };
        commit(slot, state, &writes, QaTypeFlags::SAMPLER);
        Ok(())
    }

    /// Fill an RTV slot; `resource: None` clears it
    pub fn create_render_target_view(
        &self,
        slot: RtvRef<'_>,
        resource: Option<&Arc<Resource>>,
        desc: Option<&RenderTargetViewDesc>,
    ) -> Result<()> {
        if slot.heap().kind() != HeapKind::Rtv {
            bridge_bail!(InvalidArgument, SOURCE, "RTV written to a {:?} heap", slot.heap().kind());
        }
        let Some(resource) = resource else {
            *slot.lock() = RtvDescriptor::default();
            return Ok(());
        };

        let mut key = default_texture_view(
            resource,
            desc.map_or(Format::Unknown, |d| d.format),
            ImageUsage::ColorAttachment,
        )?;
        if key.aspects != FormatAspects::COLOR {
            bridge_bail!(InvalidArgument, SOURCE,
                "Trying to create RTV for depth/stencil format {:?}", key.format);
        }

        let resource_desc = resource.desc();
        if let Some(desc) = desc {
            use ResourceDimension as Dim;
            match &desc.dimension {
                RtvDimension::Texture1D(s) => {
                    require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D1, s, false);
                }
                RtvDimension::Texture1DArray(s) => {
                    require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D1Array, s, true);
                }
                RtvDimension::Texture2D(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2, s, false);
                }
                RtvDimension::Texture2DArray(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2Array, s, true);
                }
                RtvDimension::Texture2DMs => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    key.view_type = ImageViewType::D2;
                    key.layer_count = 1;
                }
                RtvDimension::Texture2DMsArray(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2Array, s, true);
                    key.base_mip = 0;
                }
                RtvDimension::Texture3D(s) => {
                    require_dimension(resource, Dim::Texture3D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2Array, s, true);
                }
            }
        } else if resource_desc.dimension == ResourceDimension::Texture3D {
            key.view_type = ImageViewType::D2Array;
            key.base_layer = 0;
            key.layer_count = resource_desc.depth_or_array_size;
        }

        self.fill_rtv(slot, resource, key)
    }

    /// Fill a DSV slot; `resource: None` clears it
    pub fn create_depth_stencil_view(
        &self,
        slot: RtvRef<'_>,
        resource: Option<&Arc<Resource>>,
        desc: Option<&DepthStencilViewDesc>,
    ) -> Result<()> {
        if slot.heap().kind() != HeapKind::Dsv {
            bridge_bail!(InvalidArgument, SOURCE, "DSV written to a {:?} heap", slot.heap().kind());
        }
        let Some(resource) = resource else {
            *slot.lock() = RtvDescriptor::default();
            return Ok(());
        };

        if resource.desc().dimension == ResourceDimension::Texture3D {
            bridge_bail!(InvalidArgument, SOURCE,
                "Cannot create DSV for 3D texture {:#x}", resource.cookie());
        }
        let mut key = default_texture_view(
            resource,
            desc.map_or(Format::Unknown, |d| d.format),
            ImageUsage::DepthStencilAttachment,
        )?;
        if !key.format.is_depth_stencil() {
            bridge_bail!(InvalidArgument, SOURCE,
                "Trying to create DSV for format {:?}", key.format);
        }

        if let Some(desc) = desc {
            use ResourceDimension as Dim;
            match &desc.dimension {
                DsvDimension::Texture1D(s) => {
                    require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D1, s, false);
                }
                DsvDimension::Texture1DArray(s) => {
                    require_dimension(resource, Dim::Texture1D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D1Array, s, true);
                }
                DsvDimension::Texture2D(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2, s, false);
                }
                DsvDimension::Texture2DArray(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2Array, s, true);
                }
                DsvDimension::Texture2DMs => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    key.view_type = ImageViewType::D2;
                    key.layer_count = 1;
                }
                DsvDimension::Texture2DMsArray(s) => {
                    require_dimension(resource, Dim::Texture2D, &desc.dimension)?;
                    apply_slice(&mut key, ImageViewType::D2Array, s, true);
                    key.base_mip = 0;
                }
            }
        }

        self.fill_rtv(slot, resource, key)
    }

    fn fill_rtv(&self, slot: RtvRef<'_>, resource: &Arc<Resource>, mut key: ImageViewDesc) -> Result<()> {
        let desc = resource.desc();
        let max_layers = match desc.dimension {
            ResourceDimension::Texture3D => desc.depth_at_mip(key.base_mip),
            _ => desc.depth_or_array_size,
        };
        resolve_ranges(resource, &mut key, max_layers)?;

        let view = resource.view(&ViewKey::Image(key))?;
        *slot.lock() = RtvDescriptor {
            view: Some(view),
            resource: Some(resource.clone()),
            format: key.format,
            width: desc.width_at_mip(key.base_mip),
            height: desc.height_at_mip(key.base_mip),
            sample_count: desc.sample_count,
            layer_count: key.layer_count,
        };
        Ok(())
    }
}

#[cfg(test)]
#[path = "descriptor_create_tests.rs"]
mod tests;
