//! Unit tests for bindless.rs

use crate::bindless::*;
use crate::config::{Config, DeviceCaps};
use crate::descriptor::DescriptorType;
use crate::heap::HeapKind;

fn mutable_caps() -> DeviceCaps {
    DeviceCaps { mutable_descriptor_type: true, ..Default::default() }
}

// ============================================================================
// MUTABLE LAYOUT
// ============================================================================

#[test]
fn test_mutable_layout_uses_one_resource_set_plus_ssbo() {
    let state = BindlessState::new(&mutable_caps(), &Config::default());
    assert!(state.has_mutable_descriptors());

    let sets = state.sets_for_heap(HeapKind::CbvSrvUav);
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].1.descriptor_type, DescriptorType::Mutable);
    assert_eq!(sets[1].1.descriptor_type, DescriptorType::StorageBuffer);

    // CBV, typed SRV and typed UAV all resolve to the mutable set
    let mutable_index = sets[0].0;
    for flags in [
        BindlessSetFlags::CBV,
        BindlessSetFlags::SRV | BindlessSetFlags::BUFFER,
        BindlessSetFlags::UAV | BindlessSetFlags::IMAGE,
    ] {
        assert_eq!(state.find_set_info_index(flags), Some(mutable_index));
    }
    assert_eq!(
        state.find_set_info_index(BindlessSetFlags::SRV | BindlessSetFlags::RAW_SSBO),
        Some(sets[1].0)
    );
}

#[test]
fn test_extra_bindings_precede_descriptor_array() {
    let state = BindlessState::new(&mutable_caps(), &Config::default());
    let (_, first) = state.sets_for_heap(HeapKind::CbvSrvUav)[0];
    assert_eq!(
        first.extra_bindings().as_slice(),
        &[BindlessSetFlags::EXTRA_RAW_VA_AUX_BUFFER, BindlessSetFlags::EXTRA_OFFSET_BUFFER]
    );
    assert_eq!(first.binding_index, 2);

    let (_, ssbo) = state.sets_for_heap(HeapKind::CbvSrvUav)[1];
    assert!(ssbo.extra_bindings().is_empty());
    assert_eq!(ssbo.binding_index, 0);
}

// ============================================================================
// TYPED LAYOUT
// ============================================================================

#[test]
fn test_typed_layout_without_mutable_support() {
    let state = BindlessState::new(&DeviceCaps::default(), &Config::default());
    assert!(!state.has_mutable_descriptors());

    let types: Vec<DescriptorType> = state
        .sets_for_heap(HeapKind::CbvSrvUav)
        .iter()
        .map(|(_, info)| info.descriptor_type)
        .collect();
    assert_eq!(
        types,
        vec![
            DescriptorType::UniformBuffer,
            DescriptorType::UniformTexelBuffer,
            DescriptorType::SampledImage,
            DescriptorType::StorageTexelBuffer,
            DescriptorType::StorageImage,
            DescriptorType::StorageBuffer,
        ]
    );
}

#[test]
fn test_mutable_support_can_be_disabled_by_config() {
    let config = Config { use_mutable_descriptors: false, ..Default::default() };
    let state = BindlessState::new(&mutable_caps(), &config);
    assert!(!state.has_mutable_descriptors());
}

#[test]
fn test_aux_buffer_set_without_raw_va_table() {
    let config = Config { raw_va_aux_buffer: false, ssbo_raw_buffers: false, ..Default::default() };
    let state = BindlessState::new(&DeviceCaps::default(), &config);

    assert_eq!(state.set_infos().len(), MAX_BINDLESS_DESCRIPTOR_SETS - 1);
    let aux = state
        .find_binding(BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER)
        .unwrap();
    assert_eq!(
        state.set_info(aux.set_info_index).descriptor_type,
        DescriptorType::StorageTexelBuffer
    );
    // Typed UAVs must not land in the counter set
    let uav = state.find_binding(BindlessSetFlags::UAV | BindlessSetFlags::BUFFER).unwrap();
    assert_ne!(uav.set_info_index, aux.set_info_index);
}

#[test]
fn test_full_typed_layout_fits_set_limit() {
    let config = Config { raw_va_aux_buffer: false, ..Default::default() };
    let state = BindlessState::new(&DeviceCaps::default(), &config);
    assert_eq!(state.set_infos().len(), MAX_BINDLESS_DESCRIPTOR_SETS);
}

#[test]
fn test_sampler_heap_has_single_set() {
    let state = BindlessState::new(&DeviceCaps::default(), &Config::default());
    let sets = state.sets_for_heap(HeapKind::Sampler);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].1.descriptor_type, DescriptorType::Sampler);
    assert!(state.sets_for_heap(HeapKind::Rtv).is_empty());
}
