//! Bindless set layout selection
//!
//! Decides, once per device, which physical descriptor sets back each heap
//! kind. With mutable descriptors one set holds every CBV/SRV/UAV; without
//! them each descriptor type gets its own set and a logical descriptor may
//! be written to several sets at once.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::config::{Config, DeviceCaps};
use crate::descriptor::DescriptorType;
use crate::heap::HeapKind;

/// Upper bound of set infos across all heap kinds
pub const MAX_BINDLESS_DESCRIPTOR_SETS: usize = 8;

bitflags! {
    /// Device-wide bindless features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindlessFlags: u32 {
        const MUTABLE_TYPE = 1 << 0;
        const RAW_VA_AUX_BUFFER = 1 << 1;
        const TYPED_OFFSET_BUFFER = 1 << 2;
        const SSBO_OFFSET_BUFFER = 1 << 3;
        const SSBO_RAW_BUFFERS = 1 << 4;
    }
}

bitflags! {
    /// What a physical set can hold
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindlessSetFlags: u32 {
        const SAMPLER = 1 << 0;
        const CBV = 1 << 1;
        const SRV = 1 << 2;
        const UAV = 1 << 3;
        const BUFFER = 1 << 4;
        const IMAGE = 1 << 5;
        const RAW_SSBO = 1 << 6;
        /// UAV counters when there is no raw VA side table
        const AUX_BUFFER = 1 << 7;

        /// Raw VA side table bound ahead of the descriptor array
        const EXTRA_RAW_VA_AUX_BUFFER = 1 << 16;
        /// Buffer range side table bound ahead of the descriptor array
        const EXTRA_OFFSET_BUFFER = 1 << 17;
    }
}

impl BindlessSetFlags {
    pub const EXTRA_MASK: BindlessSetFlags = BindlessSetFlags::EXTRA_RAW_VA_AUX_BUFFER
        .union(BindlessSetFlags::EXTRA_OFFSET_BUFFER);
}

/// One physical descriptor set shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessSetInfo {
    pub heap_kind: HeapKind,
    pub flags: BindlessSetFlags,
    pub descriptor_type: DescriptorType,
    /// Binding of the descriptor array; extra bindings occupy 0..binding_index
    pub binding_index: u32,
}

impl BindlessSetInfo {
    fn new(heap_kind: HeapKind, flags: BindlessSetFlags, descriptor_type: DescriptorType) -> Self {
        Self {
            heap_kind,
            flags,
            descriptor_type,
            binding_index: (flags & BindlessSetFlags::EXTRA_MASK).bits().count_ones(),
        }
    }

    /// Extra storage buffer bindings in binding order
    pub fn extra_bindings(&self) -> ArrayVec<BindlessSetFlags, 2> {
        let mut extras = ArrayVec::new();
        for flag in [
            BindlessSetFlags::EXTRA_RAW_VA_AUX_BUFFER,
            BindlessSetFlags::EXTRA_OFFSET_BUFFER,
        ] {
            if self.flags.contains(flag) {
                extras.push(flag);
            }
        }
        extras
    }

    pub fn is_mutable(&self) -> bool {
        self.descriptor_type == DescriptorType::Mutable
    }
}

/// Physical set and binding of one set info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub set_info_index: usize,
    pub binding: u32,
}

/// Static bindless layout of a device
#[derive(Debug, Clone)]
pub struct BindlessState {
    flags: BindlessFlags,
    set_infos: ArrayVec<BindlessSetInfo, MAX_BINDLESS_DESCRIPTOR_SETS>,
}

impl BindlessState {
    pub fn new(caps: &DeviceCaps, config: &Config) -> Self {
        let mut flags = BindlessFlags::empty();
        if caps.mutable_descriptor_type && config.use_mutable_descriptors {
            flags |= BindlessFlags::MUTABLE_TYPE;
        }
        if config.raw_va_aux_buffer {
            flags |= BindlessFlags::RAW_VA_AUX_BUFFER;
        }
        if config.typed_offset_buffer {
            flags |= BindlessFlags::TYPED_OFFSET_BUFFER;
        }
        if config.ssbo_raw_buffers {
            flags |= BindlessFlags::SSBO_RAW_BUFFERS;
            if config.ssbo_offset_buffer {
                flags |= BindlessFlags::SSBO_OFFSET_BUFFER;
            }
        }

        let mut set_infos = ArrayVec::new();
        set_infos.push(BindlessSetInfo::new(
            HeapKind::Sampler,
            BindlessSetFlags::SAMPLER,
            DescriptorType::Sampler,
        ));

        let mut extras = BindlessSetFlags::empty();
        if flags.contains(BindlessFlags::RAW_VA_AUX_BUFFER) {
            extras |= BindlessSetFlags::EXTRA_RAW_VA_AUX_BUFFER;
        }
        if flags.intersects(BindlessFlags::TYPED_OFFSET_BUFFER | BindlessFlags::SSBO_OFFSET_BUFFER) {
            extras |= BindlessSetFlags::EXTRA_OFFSET_BUFFER;
        }

        let mut resource_sets: ArrayVec<(BindlessSetFlags, DescriptorType), 5> = ArrayVec::new();
        if flags.contains(BindlessFlags::MUTABLE_TYPE) {
            resource_sets.push((
                BindlessSetFlags::CBV
                    | BindlessSetFlags::SRV
                    | BindlessSetFlags::UAV
                    | BindlessSetFlags::BUFFER
                    | BindlessSetFlags::IMAGE,
                DescriptorType::Mutable,
            ));
        } else {
            resource_sets.extend([
                (BindlessSetFlags::CBV, DescriptorType::UniformBuffer),
                (BindlessSetFlags::SRV | BindlessSetFlags::BUFFER, DescriptorType::UniformTexelBuffer),
                (BindlessSetFlags::SRV | BindlessSetFlags::IMAGE, DescriptorType::SampledImage),
                (BindlessSetFlags::UAV | BindlessSetFlags::BUFFER, DescriptorType::StorageTexelBuffer),
                (BindlessSetFlags::UAV | BindlessSetFlags::IMAGE, DescriptorType::StorageImage),
            ]);
        }

        for (index, &(set_flags, descriptor_type)) in resource_sets.iter().enumerate() {
            let set_flags = if index == 0 { set_flags | extras } else { set_flags };
            set_infos.push(BindlessSetInfo::new(HeapKind::CbvSrvUav, set_flags, descriptor_type));
        }

        if flags.contains(BindlessFlags::SSBO_RAW_BUFFERS) {
            set_infos.push(BindlessSetInfo::new(
                HeapKind::CbvSrvUav,
                BindlessSetFlags::SRV | BindlessSetFlags::UAV | BindlessSetFlags::RAW_SSBO,
                DescriptorType::StorageBuffer,
            ));
        }

        if !flags.contains(BindlessFlags::RAW_VA_AUX_BUFFER) {
            set_infos.push(BindlessSetInfo::new(
                HeapKind::CbvSrvUav,
                BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER,
                DescriptorType::StorageTexelBuffer,
            ));
        }

        Self { flags, set_infos }
    }

    pub fn flags(&self) -> BindlessFlags {
        self.flags
    }

    pub fn has_mutable_descriptors(&self) -> bool {
        self.flags.contains(BindlessFlags::MUTABLE_TYPE)
    }

    pub fn set_infos(&self) -> &[BindlessSetInfo] {
        &self.set_infos
    }

    pub fn set_info(&self, index: usize) -> &BindlessSetInfo {
        &self.set_infos[index]
    }

    /// First set info able to hold everything in `flags`
    pub fn find_set_info_index(&self, flags: BindlessSetFlags) -> Option<usize> {
        self.set_infos.iter().position(|info| info.flags.contains(flags))
    }

    /// Set and binding a descriptor described by `flags` is written to
    pub fn find_binding(&self, flags: BindlessSetFlags) -> Option<DescriptorBinding> {
        self.find_set_info_index(flags).map(|index| self.binding_from_info_index(index))
    }

    pub fn binding_from_info_index(&self, index: usize) -> DescriptorBinding {
        DescriptorBinding {
            set_info_index: index,
            binding: self.set_infos[index].binding_index,
        }
    }

    /// `(index, info)` of every set backing heaps of `kind`
    pub fn sets_for_heap(&self, kind: HeapKind) -> ArrayVec<(usize, BindlessSetInfo), MAX_BINDLESS_DESCRIPTOR_SETS> {
        self.set_infos
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, info)| info.heap_kind == kind)
            .collect()
    }

    pub fn cbv_descriptor_type(&self) -> DescriptorType {
        DescriptorType::UniformBuffer
    }
}

#[cfg(test)]
#[path = "bindless_tests.rs"]
mod tests;
