//! Structural keys of the view caches
//!
//! A key is also the complete creation description handed to the backend,
//! so two equal keys always describe interchangeable low-level views.
//! Floating-point fields compare bit-for-bit.

use std::hash::{Hash, Hasher};

use crate::format::{Format, FormatAspects};
use crate::handle::{BufferHandle, ImageHandle};
use crate::sampler::SamplerInfo;

/// Typed view of a buffer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferViewDesc {
    pub buffer: BufferHandle,
    pub format: Format,
    /// Byte offset from the start of `buffer` (memory placement included)
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageViewType {
    D1,
    D1Array,
    D2,
    D2Array,
    Cube,
    CubeArray,
    D3,
}

/// Intended access of an image view
///
/// Part of the key: an SRV and a UAV of the same subresources are
/// distinct views because they are used in different layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    Sampled,
    Storage,
    ColorAttachment,
    DepthStencilAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentSwizzle {
    Identity,
    Zero,
    One,
    R,
    G,
    B,
    A,
}

/// Per-channel source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle {
    pub r: ComponentSwizzle,
    pub g: ComponentSwizzle,
    pub b: ComponentSwizzle,
    pub a: ComponentSwizzle,
}

/// D3D12 identity mapping (`D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING`)
pub const DEFAULT_COMPONENT_MAPPING: u32 = 0x1688;

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle {
        r: ComponentSwizzle::Identity,
        g: ComponentSwizzle::Identity,
        b: ComponentSwizzle::Identity,
        a: ComponentSwizzle::Identity,
    };

    /// Decode a D3D12 shader 4-component mapping (3 bits per channel)
    pub fn from_component_mapping(mapping: u32) -> Swizzle {
        let channel = |index: u32| {
            match (mapping >> (3 * index)) & 0x7 {
                source if source == index => ComponentSwizzle::Identity,
                0 => ComponentSwizzle::R,
                1 => ComponentSwizzle::G,
                2 => ComponentSwizzle::B,
                3 => ComponentSwizzle::A,
                4 => ComponentSwizzle::Zero,
                _ => ComponentSwizzle::One,
            }
        };
        Swizzle {
            r: channel(0),
            g: channel(1),
            b: channel(2),
            a: channel(3),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Swizzle::IDENTITY
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Swizzle::IDENTITY
    }
}

/// Image view over a subresource range
#[derive(Debug, Clone, Copy)]
pub struct ImageViewDesc {
    pub image: ImageHandle,
    pub view_type: ImageViewType,
    pub format: Format,
    pub aspects: FormatAspects,
    pub usage: ImageUsage,
    pub base_mip: u32,
    pub mip_count: u32,
    /// Minimum LOD clamp, already limited to the last mip level
    pub min_lod_clamp: f32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub swizzle: Swizzle,
    /// Render targets and storage images must keep an identity swizzle
    pub allow_swizzle: bool,
}

impl ImageViewDesc {
    #[allow(clippy::type_complexity)]
    fn identity(
        &self,
    ) -> (ImageHandle, ImageViewType, Format, FormatAspects, ImageUsage, u32, u32, u32, u32, u32, Swizzle, bool) {
        (
            self.image,
            self.view_type,
            self.format,
            self.aspects,
            self.usage,
            self.base_mip,
            self.mip_count,
            self.min_lod_clamp.to_bits(),
            self.base_layer,
            self.layer_count,
            self.swizzle,
            self.allow_swizzle,
        )
    }
}

impl PartialEq for ImageViewDesc {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ImageViewDesc {}

impl Hash for ImageViewDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Key of a view cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Buffer(BufferViewDesc),
    Image(ImageViewDesc),
    Sampler(SamplerInfo),
    AccelerationStructure(BufferViewDesc),
}

#[cfg(test)]
#[path = "view_key_tests.rs"]
mod tests;
