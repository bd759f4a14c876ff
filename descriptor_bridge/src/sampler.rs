//! Sampler descriptions
//!
//! `SamplerDesc` and `StaticSamplerDesc` mirror the D3D12 structures. Both
//! resolve into a `SamplerInfo`, the decoded form used as a cache key and
//! handed to the backend.

use std::hash::{Hash, Hasher};

use crate::config::DeviceCaps;
use crate::error::Result;

const SOURCE: &str = "bridge::sampler";

/// D3D12 filter bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Filter(pub u32);

impl Filter {
    pub const MIN_MAG_MIP_POINT: Filter = Filter(0x00);
    pub const MIN_MAG_MIP_LINEAR: Filter = Filter(0x15);
    pub const MIN_MAG_LINEAR_MIP_POINT: Filter = Filter(0x14);
    pub const ANISOTROPIC: Filter = Filter(0x55);
    pub const COMPARISON_MIN_MAG_MIP_LINEAR: Filter = Filter(0x95);
    pub const COMPARISON_ANISOTROPIC: Filter = Filter(0xd5);
    pub const MINIMUM_MIN_MAG_MIP_LINEAR: Filter = Filter(0x115);
    pub const MAXIMUM_MIN_MAG_MIP_LINEAR: Filter = Filter(0x195);

    const TYPE_MASK: u32 = 0x3;
    const MIP_SHIFT: u32 = 0;
    const MAG_SHIFT: u32 = 2;
    const MIN_SHIFT: u32 = 4;
    const REDUCTION_SHIFT: u32 = 7;
    const ANISOTROPIC_BIT: u32 = 0x40;

    fn filter_at(self, shift: u32) -> FilterMode {
        if (self.0 >> shift) & Self::TYPE_MASK == 0 {
            FilterMode::Nearest
        } else {
            FilterMode::Linear
        }
    }

    pub fn min_filter(self) -> FilterMode {
        self.filter_at(Self::MIN_SHIFT)
    }

    pub fn mag_filter(self) -> FilterMode {
        self.filter_at(Self::MAG_SHIFT)
    }

    pub fn mip_filter(self) -> FilterMode {
        self.filter_at(Self::MIP_SHIFT)
    }

    pub fn is_anisotropic(self) -> bool {
        self.0 & Self::ANISOTROPIC_BIT != 0
    }

    fn reduction_bits(self) -> u32 {
        (self.0 >> Self::REDUCTION_SHIFT) & Self::TYPE_MASK
    }

    pub fn is_comparison(self) -> bool {
        self.reduction_bits() == 1
    }

    pub fn reduction(self) -> ReductionMode {
        match self.reduction_bits() {
            2 => ReductionMode::Min,
            3 => ReductionMode::Max,
            _ => ReductionMode::WeightedAverage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionMode {
    WeightedAverage,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticBorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
    OpaqueBlackUint,
    OpaqueWhiteUint,
}

/// Border color as the backend sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
    OpaqueBlackUint,
    OpaqueWhiteUint,
    /// RGBA float bits, only produced on devices with custom border colors
    Custom([u32; 4]),
}

impl BorderColor {
    pub fn custom_rgba(self) -> Option<[f32; 4]> {
        match self {
            BorderColor::Custom(bits) => Some(bits.map(f32::from_bits)),
            _ => None,
        }
    }

    fn from_static(color: StaticBorderColor) -> BorderColor {
        match color {
            StaticBorderColor::TransparentBlack => BorderColor::TransparentBlack,
            StaticBorderColor::OpaqueBlack => BorderColor::OpaqueBlack,
            StaticBorderColor::OpaqueWhite => BorderColor::OpaqueWhite,
            StaticBorderColor::OpaqueBlackUint => BorderColor::OpaqueBlackUint,
            StaticBorderColor::OpaqueWhiteUint => BorderColor::OpaqueWhiteUint,
        }
    }

    fn from_rgba(rgba: [f32; 4], caps: &DeviceCaps) -> BorderColor {
        if rgba == [0.0, 0.0, 0.0, 0.0] {
            return BorderColor::TransparentBlack;
        }
        if rgba == [0.0, 0.0, 0.0, 1.0] {
            return BorderColor::OpaqueBlack;
        }
        if rgba == [1.0, 1.0, 1.0, 1.0] {
            return BorderColor::OpaqueWhite;
        }

        if caps.custom_border_color {
            return BorderColor::Custom(rgba.map(f32::to_bits));
        }

        let fallback = if rgba[3] < 0.5 {
            BorderColor::TransparentBlack
        } else if (rgba[0] + rgba[1] + rgba[2]) / 3.0 >= 0.5 {
            BorderColor::OpaqueWhite
        } else {
            BorderColor::OpaqueBlack
        };
        crate::bridge_warn!(SOURCE,
            "Custom border color {:?} unsupported, using {:?}", rgba, fallback);
        fallback
    }
}

/// Bindless sampler description (`D3D12_SAMPLER_DESC`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::MIN_MAG_MIP_LINEAR,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison_func: ComparisonFunc::Never,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

/// Root-signature sampler description (`D3D12_STATIC_SAMPLER_DESC`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSamplerDesc {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: StaticBorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
    pub shader_register: u32,
    pub register_space: u32,
}

/// Decoded sampler state
#[derive(Debug, Clone, Copy)]
pub struct SamplerInfo {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mip_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    /// `Some(max)` when anisotropic filtering is enabled
    pub max_anisotropy: Option<f32>,
    /// `Some(op)` for comparison samplers
    pub compare_op: Option<ComparisonFunc>,
    pub min_lod: f32,
    pub max_lod: f32,
    /// Always `TransparentBlack` unless an address mode is `Border`
    pub border_color: BorderColor,
    pub reduction: ReductionMode,
}

#[allow(clippy::too_many_arguments)]
fn decode(
    filter: Filter,
    address: [AddressMode; 3],
    mip_lod_bias: f32,
    max_anisotropy: u32,
    comparison_func: ComparisonFunc,
    min_lod: f32,
    max_lod: f32,
    border: impl FnOnce() -> BorderColor,
    caps: &DeviceCaps,
) -> Result<SamplerInfo> {
    let reduction = filter.reduction();
    if reduction != ReductionMode::WeightedAverage && !caps.sampler_min_max_reduction {
        crate::bridge_bail!(NotImplemented, SOURCE,
            "Sampler reduction {:?} requires min/max reduction support", reduction);
    }

    let uses_border = address.contains(&AddressMode::Border);
    let border_color = if uses_border { border() } else { BorderColor::TransparentBlack };

    Ok(SamplerInfo {
        mag_filter: filter.mag_filter(),
        min_filter: filter.min_filter(),
        mip_filter: filter.mip_filter(),
        address_u: address[0],
        address_v: address[1],
        address_w: address[2],
        mip_lod_bias,
        max_anisotropy: filter
            .is_anisotropic()
            .then(|| max_anisotropy.clamp(1, 16) as f32),
        compare_op: filter.is_comparison().then_some(comparison_func),
        min_lod,
        max_lod,
        border_color,
        reduction,
    })
}

impl SamplerInfo {
    pub fn from_desc(desc: &SamplerDesc, caps: &DeviceCaps) -> Result<SamplerInfo> {
        decode(
            desc.filter,
            [desc.address_u, desc.address_v, desc.address_w],
            desc.mip_lod_bias,
            desc.max_anisotropy,
            desc.comparison_func,
            desc.min_lod,
            desc.max_lod,
            || BorderColor::from_rgba(desc.border_color, caps),
            caps,
        )
    }

    pub fn from_static_desc(desc: &StaticSamplerDesc, caps: &DeviceCaps) -> Result<SamplerInfo> {
        decode(
            desc.filter,
            [desc.address_u, desc.address_v, desc.address_w],
            desc.mip_lod_bias,
            desc.max_anisotropy,
            desc.comparison_func,
            desc.min_lod,
            desc.max_lod,
            || BorderColor::from_static(desc.border_color),
            caps,
        )
    }

    #[allow(clippy::type_complexity)]
    fn identity(
        &self,
    ) -> (
        (FilterMode, FilterMode, FilterMode),
        (AddressMode, AddressMode, AddressMode),
        (u32, Option<u32>, u32, u32),
        Option<ComparisonFunc>,
        BorderColor,
        ReductionMode,
    ) {
        (
            (self.mag_filter, self.min_filter, self.mip_filter),
            (self.address_u, self.address_v, self.address_w),
            (
                self.mip_lod_bias.to_bits(),
                self.max_anisotropy.map(f32::to_bits),
                self.min_lod.to_bits(),
                self.max_lod.to_bits(),
            ),
            self.compare_op,
            self.border_color,
            self.reduction,
        )
    }
}

impl PartialEq for SamplerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for SamplerInfo {}

impl Hash for SamplerInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
