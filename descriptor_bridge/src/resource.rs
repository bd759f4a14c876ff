//! Buffers and textures known to the bridge
//!
//! A `Resource` is the bridge's record of an application resource: its
//! description, the low-level object backing it and the view cache every
//! descriptor created for it goes through. Memory allocation happens
//! elsewhere; resources are imported with their final placement.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::ImageLayout;
use crate::context::DeviceContext;
use crate::error::Result;
use crate::format::Format;
use crate::handle::{BufferHandle, ImageHandle};
use crate::va_map::VaRange;
use crate::view::ViewRef;
use crate::view_cache::ViewCache;
use crate::view_key::{BufferViewDesc, ViewKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
}

bitflags! {
    /// Allowed usages (`D3D12_RESOURCE_FLAGS`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 1 << 0;
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
        const DENY_SHADER_RESOURCE = 1 << 3;
        const SIMULTANEOUS_ACCESS = 1 << 4;
        const ACCELERATION_STRUCTURE = 1 << 5;
    }
}

/// Subset of `D3D12_RESOURCE_DESC` relevant to view creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    /// Byte size for buffers, texel width for textures
    pub width: u64,
    pub height: u32,
    /// Depth of 3D textures, array size otherwise
    pub depth_or_array_size: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub sample_count: u32,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    pub fn buffer(size: u64) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: Format::Unknown,
            sample_count: 1,
            flags: ResourceFlags::empty(),
        }
    }

    pub fn texture_2d(width: u32, height: u32, array_size: u32, mip_levels: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: width as u64,
            height,
            depth_or_array_size: array_size,
            mip_levels,
            format,
            sample_count: 1,
            flags: ResourceFlags::empty(),
        }
    }

    pub fn texture_3d(width: u32, height: u32, depth: u32, mip_levels: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture3D,
            ..Self::texture_2d(width, height, depth, mip_levels, format)
        }
    }

    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_buffer(&self) -> bool {
        self.dimension == ResourceDimension::Buffer
    }

    /// Array layers of the image; 3D textures have a single layer
    pub fn layer_count(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Texture3D => 1,
            _ => self.depth_or_array_size,
        }
    }

    pub fn width_at_mip(&self, mip: u32) -> u32 {
        ((self.width >> mip) as u32).max(1)
    }

    pub fn height_at_mip(&self, mip: u32) -> u32 {
        (self.height >> mip).max(1)
    }

    pub fn depth_at_mip(&self, mip: u32) -> u32 {
        match self.dimension {
            ResourceDimension::Texture3D => (self.depth_or_array_size >> mip).max(1),
            _ => 1,
        }
    }
}

/// Where a buffer resource lives inside a low-level buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlacement {
    pub buffer: BufferHandle,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    Buffer(BufferHandle),
    Image(ImageHandle),
}

pub struct Resource {
    ctx: Arc<DeviceContext>,
    cookie: u64,
    desc: ResourceDesc,
    backing: Backing,
    memory_offset: u64,
    va: u64,
    common_layout: ImageLayout,
    views: ViewCache,
}

impl Resource {
    pub(crate) fn new_buffer(
        ctx: &Arc<DeviceContext>,
        desc: ResourceDesc,
        placement: BufferPlacement,
    ) -> Arc<Resource> {
        let cookie = ctx.cookies.allocate();
        let va = ctx.backend.buffer_device_address(placement.buffer) + placement.offset;
        ctx.va_map.insert(VaRange {
            buffer: placement.buffer,
            va,
            size: desc.width,
            memory_offset: placement.offset,
            cookie,
        });

        Arc::new(Resource {
            ctx: ctx.clone(),
            cookie,
            desc,
            backing: Backing::Buffer(placement.buffer),
            memory_offset: placement.offset,
            va,
            common_layout: ImageLayout::General,
            views: ViewCache::new(cookie),
        })
    }

    pub(crate) fn new_texture(ctx: &Arc<DeviceContext>, desc: ResourceDesc, image: ImageHandle) -> Arc<Resource> {
        let cookie = ctx.cookies.allocate();
        let common_layout = if desc.flags.intersects(
            ResourceFlags::ALLOW_UNORDERED_ACCESS | ResourceFlags::SIMULTANEOUS_ACCESS,
        ) {
            ImageLayout::General
        } else if desc.format.is_depth_stencil() {
            ImageLayout::DepthStencilReadOnly
        } else {
            ImageLayout::ShaderReadOnly
        };

        Arc::new(Resource {
            ctx: ctx.clone(),
            cookie,
            desc,
            backing: Backing::Image(image),
            memory_offset: 0,
            va: 0,
            common_layout,
            views: ViewCache::new(cookie),
        })
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.backing, Backing::Buffer(_))
    }

    /// Backing buffer, null for textures
    pub fn buffer(&self) -> BufferHandle {
        match self.backing {
            Backing::Buffer(buffer) => buffer,
            Backing::Image(_) => BufferHandle::NULL,
        }
    }

    /// Backing image, null for buffers
    pub fn image(&self) -> ImageHandle {
        match self.backing {
            Backing::Image(image) => image,
            Backing::Buffer(_) => ImageHandle::NULL,
        }
    }

    /// Offset of a buffer resource inside its buffer object
    pub fn memory_offset(&self) -> u64 {
        self.memory_offset
    }

    /// Device address of a buffer resource, 0 for textures
    pub fn va(&self) -> u64 {
        self.va
    }

    /// Layout shader-visible descriptors of this resource are written with
    pub fn common_layout(&self) -> ImageLayout {
        self.common_layout
    }

    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Cached view for `key`, created on first use
    pub fn view(&self, key: &ViewKey) -> Result<ViewRef> {
        self.views.find_or_create(&self.ctx, key)
    }

    /// Acceleration structure object over `size` bytes at `va`
    ///
    /// Used by build and copy commands; SRVs of acceleration structures
    /// only publish the raw address.
    pub fn acceleration_structure_view(&self, va: u64, size: u64) -> Result<ViewRef> {
        if !self.is_buffer() || va < self.va || va - self.va + size > self.desc.width {
            crate::bridge_bail!(InvalidArgument, "bridge::Resource",
                "Acceleration structure range {:#x}+{} outside resource {:#x}", va, size, self.cookie);
        }
        self.view(&ViewKey::AccelerationStructure(BufferViewDesc {
            buffer: self.buffer(),
            format: Format::Unknown,
            offset: self.memory_offset + (va - self.va),
            size,
        }))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("cookie", &self.cookie)
            .field("desc", &self.desc)
            .field("backing", &self.backing)
            .field("va", &self.va)
            .finish()
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        if self.is_buffer() {
            self.ctx.va_map.remove(self.va);
        }
        self.views.clear();
        self.ctx.notify_qa(|qa| qa.unregister(self.cookie));
    }
}
