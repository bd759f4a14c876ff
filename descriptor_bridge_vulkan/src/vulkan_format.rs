//! Bridge enums to Vulkan enums
//!
//! Pure mapping functions, no device access.

use ash::vk;
use descriptor_bridge::bridge::{
    AddressMode, BorderColor, ComparisonFunc, ComponentSwizzle, DescriptorType, FilterMode, Format,
    FormatAspects, ImageLayout, ImageUsage, ImageViewType, ReductionMode, Swizzle,
};

pub(crate) fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::Unknown => vk::Format::UNDEFINED,

        Format::R8_UNORM => vk::Format::R8_UNORM,
        Format::R8_UINT => vk::Format::R8_UINT,
        Format::R8G8_UNORM => vk::Format::R8G8_UNORM,
        Format::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8_UNORM_SRGB => vk::Format::R8G8B8A8_SRGB,
        Format::R8G8B8A8_UINT => vk::Format::R8G8B8A8_UINT,
        Format::R8G8B8A8_SNORM => vk::Format::R8G8B8A8_SNORM,
        Format::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8_UNORM_SRGB => vk::Format::B8G8R8A8_SRGB,
        Format::R10G10B10A2_UNORM => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::R11G11B10_FLOAT => vk::Format::B10G11R11_UFLOAT_PACK32,

        Format::R16_FLOAT => vk::Format::R16_SFLOAT,
        Format::R16_UINT => vk::Format::R16_UINT,
        Format::R16G16_FLOAT => vk::Format::R16G16_SFLOAT,
        Format::R16G16B16A16_FLOAT => vk::Format::R16G16B16A16_SFLOAT,
        Format::R16G16B16A16_UINT => vk::Format::R16G16B16A16_UINT,

        // Typeless views are only created after resolution to a typed format
        Format::R32_TYPELESS => vk::Format::R32_UINT,
        Format::R32_FLOAT => vk::Format::R32_SFLOAT,
        Format::R32_UINT => vk::Format::R32_UINT,
        Format::R32_SINT => vk::Format::R32_SINT,
        Format::R32G32_FLOAT => vk::Format::R32G32_SFLOAT,
        Format::R32G32_UINT => vk::Format::R32G32_UINT,
        Format::R32G32B32_FLOAT => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,
        Format::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,

        Format::D16_UNORM => vk::Format::D16_UNORM,
        Format::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        Format::D32_FLOAT => vk::Format::D32_SFLOAT,
        Format::D32_FLOAT_S8X24_UINT => vk::Format::D32_SFLOAT_S8_UINT,

        Format::BC1_UNORM => vk::Format::BC1_RGBA_UNORM_BLOCK,
        Format::BC3_UNORM => vk::Format::BC3_UNORM_BLOCK,
        Format::BC5_UNORM => vk::Format::BC5_UNORM_BLOCK,
        Format::BC7_UNORM => vk::Format::BC7_UNORM_BLOCK,
    }
}

pub(crate) fn aspects_to_vk(aspects: FormatAspects) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspects.contains(FormatAspects::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspects.contains(FormatAspects::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspects.contains(FormatAspects::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub(crate) fn view_type_to_vk(view_type: ImageViewType) -> vk::ImageViewType {
    match view_type {
        ImageViewType::D1 => vk::ImageViewType::TYPE_1D,
        ImageViewType::D1Array => vk::ImageViewType::TYPE_1D_ARRAY,
        ImageViewType::D2 => vk::ImageViewType::TYPE_2D,
        ImageViewType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        ImageViewType::Cube => vk::ImageViewType::CUBE,
        ImageViewType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
        ImageViewType::D3 => vk::ImageViewType::TYPE_3D,
    }
}

pub(crate) fn usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    match usage {
        ImageUsage::Sampled => vk::ImageUsageFlags::SAMPLED,
        ImageUsage::Storage => vk::ImageUsageFlags::STORAGE,
        ImageUsage::ColorAttachment => vk::ImageUsageFlags::COLOR_ATTACHMENT,
        ImageUsage::DepthStencilAttachment => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    }
}

fn component_to_vk(component: ComponentSwizzle) -> vk::ComponentSwizzle {
    match component {
        ComponentSwizzle::Identity => vk::ComponentSwizzle::IDENTITY,
        ComponentSwizzle::Zero => vk::ComponentSwizzle::ZERO,
        ComponentSwizzle::One => vk::ComponentSwizzle::ONE,
        ComponentSwizzle::R => vk::ComponentSwizzle::R,
        ComponentSwizzle::G => vk::ComponentSwizzle::G,
        ComponentSwizzle::B => vk::ComponentSwizzle::B,
        ComponentSwizzle::A => vk::ComponentSwizzle::A,
    }
}

pub(crate) fn swizzle_to_vk(swizzle: &Swizzle) -> vk::ComponentMapping {
    vk::ComponentMapping {
        r: component_to_vk(swizzle.r),
        g: component_to_vk(swizzle.g),
        b: component_to_vk(swizzle.b),
        a: component_to_vk(swizzle.a),
    }
}

/// `Mutable` maps to the extension type; writes never carry it
pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        DescriptorType::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::Mutable => vk::DescriptorType::MUTABLE_EXT,
    }
}

/// Every concrete type a mutable binding may hold
pub(crate) const MUTABLE_DESCRIPTOR_TYPES: [vk::DescriptorType; 6] = [
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
];

pub(crate) fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    }
}

pub(crate) fn filter_to_vk(filter: FilterMode) -> vk::Filter {
    match filter {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode_to_vk(filter: FilterMode) -> vk::SamplerMipmapMode {
    match filter {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub(crate) fn compare_op_to_vk(func: ComparisonFunc) -> vk::CompareOp {
    match func {
        ComparisonFunc::Never => vk::CompareOp::NEVER,
        ComparisonFunc::Less => vk::CompareOp::LESS,
        ComparisonFunc::Equal => vk::CompareOp::EQUAL,
        ComparisonFunc::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        ComparisonFunc::Greater => vk::CompareOp::GREATER,
        ComparisonFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        ComparisonFunc::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        ComparisonFunc::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn border_color_to_vk(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        BorderColor::OpaqueBlackUint => vk::BorderColor::INT_OPAQUE_BLACK,
        BorderColor::OpaqueWhiteUint => vk::BorderColor::INT_OPAQUE_WHITE,
        BorderColor::Custom(_) => vk::BorderColor::FLOAT_CUSTOM_EXT,
    }
}

pub(crate) fn reduction_to_vk(reduction: ReductionMode) -> vk::SamplerReductionMode {
    match reduction {
        ReductionMode::WeightedAverage => vk::SamplerReductionMode::WEIGHTED_AVERAGE,
        ReductionMode::Min => vk::SamplerReductionMode::MIN,
        ReductionMode::Max => vk::SamplerReductionMode::MAX,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
