//! Resource and view formats
//!
//! Only the properties the descriptor engine needs are modelled here
//! (element size, aspects, block compression, typeless resolution). The
//! backend owns the translation to its native format enum.

use bitflags::bitflags;

bitflags! {
    /// Image aspects covered by a format
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// View and resource formats understood by the bridge
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Inherit the resource format
    Unknown,

    R8_UNORM,
    R8_UINT,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_UNORM_SRGB,
    R8G8B8A8_UINT,
    R8G8B8A8_SNORM,
    B8G8R8A8_UNORM,
    B8G8R8A8_UNORM_SRGB,
    R10G10B10A2_UNORM,
    R11G11B10_FLOAT,

    R16_FLOAT,
    R16_UINT,
    R16G16_FLOAT,
    R16G16B16A16_FLOAT,
    R16G16B16A16_UINT,

    R32_TYPELESS,
    R32_FLOAT,
    R32_UINT,
    R32_SINT,
    R32G32_FLOAT,
    R32G32_UINT,
    R32G32B32_FLOAT,
    R32G32B32A32_FLOAT,
    R32G32B32A32_UINT,

    D16_UNORM,
    D24_UNORM_S8_UINT,
    D32_FLOAT,
    D32_FLOAT_S8X24_UINT,

    BC1_UNORM,
    BC3_UNORM,
    BC5_UNORM,
    BC7_UNORM,
}

impl Format {
    /// Size in bytes of one element (one block for compressed formats)
    pub fn byte_count(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R8_UNORM | Format::R8_UINT => 1,
            Format::R8G8_UNORM
            | Format::R16_FLOAT
            | Format::R16_UINT
            | Format::D16_UNORM => 2,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_UNORM_SRGB
            | Format::R8G8B8A8_UINT
            | Format::R8G8B8A8_SNORM
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_UNORM_SRGB
            | Format::R10G10B10A2_UNORM
            | Format::R11G11B10_FLOAT
            | Format::R16G16_FLOAT
            | Format::R32_TYPELESS
            | Format::R32_FLOAT
            | Format::R32_UINT
            | Format::R32_SINT
            | Format::D24_UNORM_S8_UINT
            | Format::D32_FLOAT => 4,
            Format::R16G16B16A16_FLOAT
            | Format::R16G16B16A16_UINT
            | Format::R32G32_FLOAT
            | Format::R32G32_UINT
            | Format::D32_FLOAT_S8X24_UINT
            | Format::BC1_UNORM => 8,
            Format::R32G32B32_FLOAT => 12,
            Format::R32G32B32A32_FLOAT
            | Format::R32G32B32A32_UINT
            | Format::BC3_UNORM
            | Format::BC5_UNORM
            | Format::BC7_UNORM => 16,
        }
    }

    pub fn aspects(self) -> FormatAspects {
        match self {
            Format::Unknown => FormatAspects::empty(),
            Format::D16_UNORM | Format::D32_FLOAT => FormatAspects::DEPTH,
            Format::D24_UNORM_S8_UINT | Format::D32_FLOAT_S8X24_UINT => {
                FormatAspects::DEPTH | FormatAspects::STENCIL
            }
            _ => FormatAspects::COLOR,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        self.aspects().intersects(FormatAspects::DEPTH | FormatAspects::STENCIL)
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Format::BC1_UNORM | Format::BC3_UNORM | Format::BC5_UNORM | Format::BC7_UNORM
        )
    }

    pub fn is_typeless(self) -> bool {
        matches!(self, Format::R32_TYPELESS)
    }

    /// Resolve `Unknown` against the format of the viewed resource
    pub fn or_resource(self, resource_format: Format) -> Format {
        if self == Format::Unknown {
            resource_format
        } else {
            self
        }
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
