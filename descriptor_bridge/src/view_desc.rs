//! Descriptor creation parameters
//!
//! Rust renditions of the D3D12 view descriptions. Dimension-specific
//! fields live in the dimension variant instead of a union.

use bitflags::bitflags;

use crate::format::Format;
use crate::view_key::DEFAULT_COMPONENT_MAPPING;

/// Mip or layer count meaning "everything from the first one on"
pub const REMAINING: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    /// Device address of the first byte, 0 for a null descriptor
    pub buffer_location: u64,
    pub size_in_bytes: u32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferViewFlags: u32 {
        /// Byte address buffer over `R32_TYPELESS`
        const RAW = 1 << 0;
    }
}

/// Element range of a buffer SRV or UAV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferElements {
    pub first_element: u64,
    pub num_elements: u32,
    /// Non-zero for structured buffers (format must be `Unknown`)
    pub structure_byte_stride: u32,
    pub flags: BufferViewFlags,
}

/// Mip and array range of a texture SRV
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSrv {
    pub most_detailed_mip: u32,
    pub mip_levels: u32,
    /// First array slice, or first 2D face for cube arrays
    pub first_array_slice: u32,
    /// Array size, or number of cubes for cube arrays
    pub array_size: u32,
    pub min_lod_clamp: f32,
}

impl Default for TextureSrv {
    fn default() -> Self {
        Self {
            most_detailed_mip: 0,
            mip_levels: REMAINING,
            first_array_slice: 0,
            array_size: REMAINING,
            min_lod_clamp: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SrvDimension {
    Buffer(BufferElements),
    Texture1D(TextureSrv),
    Texture1DArray(TextureSrv),
    Texture2D(TextureSrv),
    Texture2DArray(TextureSrv),
    Texture2DMs,
    Texture2DMsArray { first_array_slice: u32, array_size: u32 },
    Texture3D(TextureSrv),
    TextureCube(TextureSrv),
    TextureCubeArray(TextureSrv),
    RaytracingAccelerationStructure { location: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderResourceViewDesc {
    pub format: Format,
    pub dimension: SrvDimension,
    pub component_mapping: u32,
}

impl ShaderResourceViewDesc {
    pub fn new(format: Format, dimension: SrvDimension) -> Self {
        Self {
            format,
            dimension,
            component_mapping: DEFAULT_COMPONENT_MAPPING,
        }
    }

    pub fn buffer(format: Format, elements: BufferElements) -> Self {
        Self::new(format, SrvDimension::Buffer(elements))
    }

    pub fn texture_2d(format: Format, texture: TextureSrv) -> Self {
        Self::new(format, SrvDimension::Texture2D(texture))
    }

    pub fn acceleration_structure(location: u64) -> Self {
        Self::new(Format::Unknown, SrvDimension::RaytracingAccelerationStructure { location })
    }
}

/// Buffer UAV with optional append/consume counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferUav {
    pub elements: BufferElements,
    pub counter_offset_in_bytes: u64,
}

/// Single mip of a texture UAV/RTV/DSV
///
/// For 3D textures the slice range selects W slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlice {
    pub mip_slice: u32,
    pub first_array_slice: u32,
    pub array_size: u32,
}

impl Default for TextureSlice {
    fn default() -> Self {
        Self {
            mip_slice: 0,
            first_array_slice: 0,
            array_size: REMAINING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UavDimension {
    Buffer(BufferUav),
    Texture1D(TextureSlice),
    Texture1DArray(TextureSlice),
    Texture2D(TextureSlice),
    Texture2DArray(TextureSlice),
    Texture3D(TextureSlice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnorderedAccessViewDesc {
    pub format: Format,
    pub dimension: UavDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtvDimension {
    Texture1D(TextureSlice),
    Texture1DArray(TextureSlice),
    Texture2D(TextureSlice),
    Texture2DArray(TextureSlice),
    Texture2DMs,
    Texture2DMsArray(TextureSlice),
    Texture3D(TextureSlice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetViewDesc {
    pub format: Format,
    pub dimension: RtvDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsvDimension {
    Texture1D(TextureSlice),
    Texture1DArray(TextureSlice),
    Texture2D(TextureSlice),
    Texture2DArray(TextureSlice),
    Texture2DMs,
    Texture2DMsArray(TextureSlice),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DsvFlags: u32 {
        const READ_ONLY_DEPTH = 1 << 0;
        const READ_ONLY_STENCIL = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub dimension: DsvDimension,
    pub flags: DsvFlags,
}
