//! Descriptor copy engine
//!
//! Typed-set devices copy slot by slot and skip the physical copy when the
//! destination already describes the same thing. Devices with a mutable
//! set copy the whole range unconditionally with one physical copy per
//! touched set.

use std::sync::atomic::Ordering;

use arrayvec::ArrayVec;

use crate::backend::DescriptorCopy;
use crate::bindless::{BindlessFlags, BindlessSetFlags, MAX_BINDLESS_DESCRIPTOR_SETS};
use crate::context::DeviceContext;
use crate::descriptor::DescriptorFlags;
use crate::device::{Device, SOURCE};
use crate::error::Result;
use crate::heap::{DescriptorHeap, DescriptorRef, HeapKind, RtvRef};
use crate::{bridge_bail, bridge_trace};

type CopyBatch = ArrayVec<DescriptorCopy, { MAX_BINDLESS_DESCRIPTOR_SETS + 1 }>;

/// Indices of the set bits of `mask`, lowest first
fn set_bits(mut mask: u32) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let index = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(index)
    })
}

fn set_copy(
    ctx: &DeviceContext,
    set_info_index: usize,
    dst: DescriptorRef<'_>,
    src: DescriptorRef<'_>,
    count: u32,
) -> DescriptorCopy {
    let binding = ctx.bindless.binding_from_info_index(set_info_index).binding;
    DescriptorCopy {
        src_set: src.heap().set_handle(set_info_index),
        src_binding: binding,
        src_array_element: src.index(),
        dst_set: dst.heap().set_handle(set_info_index),
        dst_binding: binding,
        dst_array_element: dst.index(),
        count,
    }
}

/// Copy `count` raw VA words, or the UAV counter descriptors when the
/// heap has no raw VA table
fn copy_raw_va(ctx: &DeviceContext, dst: DescriptorRef<'_>, src: DescriptorRef<'_>, count: u32, copies: &mut CopyBatch) {
    if dst.heap().has_raw_va_table() {
        for i in 0..count {
            dst.heap().store_raw_va(dst.index() + i, src.heap().raw_va(src.index() + i));
        }
    } else if let Some(index) = ctx.bindless.find_set_info_index(BindlessSetFlags::UAV | BindlessSetFlags::AUX_BUFFER) {
        copies.push(set_copy(ctx, index, dst, src, count));
    }
}

fn copy_buffer_ranges(dst: DescriptorRef<'_>, src: DescriptorRef<'_>, count: u32) {
    let dst_table = dst.heap().buffer_range_table();
    let src_table = src.heap().buffer_range_table();
    let dst_words = dst_table.get(2 * dst.index() as usize..2 * (dst.index() + count) as usize);
    let src_words = src_table.get(2 * src.index() as usize..2 * (src.index() + count) as usize);
    if let (Some(dst_words), Some(src_words)) = (dst_words, src_words) {
        for (d, s) in dst_words.iter().zip(src_words) {
            d.store(s.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }
}

/// Copy one slot, issuing physical copies only when `dst` differs
fn copy_single(ctx: &DeviceContext, dst: DescriptorRef<'_>, src: DescriptorRef<'_>) {
    let state = src.slot().lock().clone();
    let metadata = state.metadata;
    let flags = metadata.flags;

    let mut current = dst.slot().lock();
    let needs_update = current.metadata.cookie != metadata.cookie
        || flags.contains(DescriptorFlags::RAW_VA_AUX_BUFFER)
        || current.metadata.flags != flags
        || current.metadata.current_null_type != metadata.current_null_type
        || (flags.contains(DescriptorFlags::OFFSET_RANGE) && current.payload.buffer != state.payload.buffer);

    *current = state;

    if needs_update {
        let mut copies = CopyBatch::new();
        for index in set_bits(metadata.set_info_mask) {
            copies.push(set_copy(ctx, index, dst, src, 1));
        }
        if flags.contains(DescriptorFlags::RAW_VA_AUX_BUFFER) {
            copy_raw_va(ctx, dst, src, 1, &mut copies);
        }
        if !copies.is_empty() {
            ctx.backend.copy_descriptors(&copies);
        }
    } else {
        bridge_trace!(SOURCE, "Skipping copy of unchanged descriptor {} -> {}", src.index(), dst.index());
    }
    drop(current);

    if flags.contains(DescriptorFlags::BUFFER_OFFSET) {
        copy_buffer_ranges(dst, src, 1);
    }
}

/// Copy `count` slots with one physical copy per touched set
fn copy_bulk(ctx: &DeviceContext, dst: DescriptorRef<'_>, src: DescriptorRef<'_>, count: u32, kind: HeapKind) {
    let (dst_heap, src_heap) = (dst.heap(), src.heap());
    let mut mask = 0u32;
    for i in 0..count {
        let state = src_heap.descriptor_slot(src.index() + i).lock().clone();
        mask |= state.metadata.set_info_mask;
        *dst_heap.descriptor_slot(dst.index() + i).lock() = state;
    }

    let mut copies = CopyBatch::new();
    for index in set_bits(mask) {
        copies.push(set_copy(ctx, index, dst, src, count));
    }

    if kind == HeapKind::CbvSrvUav {
        let flags = ctx.bindless.flags();
        copy_raw_va(ctx, dst, src, count, &mut copies);
        if flags.intersects(BindlessFlags::TYPED_OFFSET_BUFFER | BindlessFlags::SSBO_OFFSET_BUFFER) {
            copy_buffer_ranges(dst, src, count);
        }
    }

    if !copies.is_empty() {
        ctx.backend.copy_descriptors(&copies);
    }
}

fn check_heap(heap: &DescriptorHeap, kind: HeapKind, role: &str) -> Result<()> {
    if heap.kind() != kind {
        bridge_bail!(InvalidArgument, SOURCE,
            "Copy {} heap is {:?}, expected {:?}", role, heap.kind(), kind);
    }
    Ok(())
}

impl Device {
    /// Copy `count` consecutive descriptors of `kind` from `src` to `dst`
    ///
    /// Ranges must not overlap.
    pub fn copy_descriptor_range(
        &self,
        dst: DescriptorRef<'_>,
        src: DescriptorRef<'_>,
        count: u32,
        kind: HeapKind,
    ) -> Result<()> {
        if !kind.is_bindless() {
            bridge_bail!(InvalidArgument, SOURCE,
                "{:?} descriptors are copied with copy_rtv_descriptors", kind);
        }
        check_heap(dst.heap(), kind, "destination")?;
        check_heap(src.heap(), kind, "source")?;
        dst.check_count(count)?;
        src.check_count(count)?;
        if count == 0 {
            return Ok(());
        }

        let ctx = self.context();
        for i in 0..count {
            ctx.notify_qa(|qa| {
                qa.copy_descriptor(dst.heap().cookie(), dst.index() + i, src.heap().cookie(), src.index() + i)
            });
        }

        if ctx.bindless.has_mutable_descriptors() {
            copy_bulk(ctx, dst, src, count, kind);
        } else {
            for i in 0..count {
                copy_single(ctx, dst.offset(i)?, src.offset(i)?);
            }
        }
        Ok(())
    }

    /// Copy `count` RTV or DSV records from `src` to `dst`
    pub fn copy_rtv_descriptors(&self, dst: RtvRef<'_>, src: RtvRef<'_>, count: u32) -> Result<()> {
        let kind = src.heap().kind();
        if kind.is_bindless() {
            bridge_bail!(InvalidArgument, SOURCE,
                "{:?} descriptors are copied with copy_descriptor_range", kind);
        }
        check_heap(dst.heap(), kind, "destination")?;
        dst.check_count(count)?;
        src.check_count(count)?;

        for i in 0..count {
            let record = src.heap().rtv(src.index() + i).lock().clone();
            *dst.heap().rtv(dst.index() + i).lock() = record;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "descriptor_copy_tests.rs"]
mod tests;
