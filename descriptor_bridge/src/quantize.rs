//! Buffer range quantization
//!
//! Typed buffer views are widened to power-of-two aligned element ranges
//! so that the number of distinct views per buffer stays bounded; the
//! residual offset is published to shaders through the buffer range side
//! table. Storage buffer bindings are widened to the device's offset
//! alignment the same way, in bytes.

use crate::bridge_warn;

/// Element range a typed view is created with, plus the correction
/// shaders apply when indexing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedRange {
    pub view_first: u64,
    pub view_count: u64,
    /// Requested first element minus `view_first`
    pub element_offset: u64,
    /// Requested element count
    pub element_count: u64,
}

impl QuantizedRange {
    /// Range used as-is, no correction
    pub fn exact(first: u64, count: u64) -> Self {
        Self {
            view_first: first,
            view_count: count,
            element_offset: 0,
            element_count: count,
        }
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    value.saturating_add(align - 1) & !(align - 1)
}

/// Largest power of two not greater than `value` (`value` > 0)
fn floor_pow2(value: u64) -> u64 {
    1u64 << (63 - value.leading_zeros())
}

/// Quantize `[first, first + count)` of a buffer holding
/// `max_resource_elements` elements, for a device limited to
/// `max_elements` per texel buffer view
///
/// Aligning to N widens the view by at most N - 1 elements, so the
/// alignment is the largest power of two that keeps the view within
/// `max_elements`.
pub fn quantize_typed_range(
    first: u64,
    count: u64,
    max_resource_elements: u64,
    max_elements: u64,
) -> QuantizedRange {
    if count > max_elements {
        bridge_warn!("bridge::quantize",
            "Typed buffer view of {} elements exceeds device limit of {}", count, max_elements);
        return QuantizedRange::exact(first, count);
    }
    if count >= max_resource_elements {
        return QuantizedRange::exact(first, count);
    }

    let headroom = max_elements - count + 1;
    let align = floor_pow2(headroom);

    let begin = first & !(align - 1);
    let end = align_up(first.saturating_add(count), align).min(max_resource_elements);

    QuantizedRange {
        view_first: begin,
        view_count: end.saturating_sub(begin),
        element_offset: first - begin,
        element_count: count,
    }
}

/// Storage buffer binding covering a requested byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedByteRange {
    /// Aligned start, relative to the resource
    pub offset: u64,
    pub range: u64,
    /// Requested offset minus `offset`
    pub byte_offset: u64,
}

/// Widen `[offset, offset + range)` to `alignment`, clamped to `width`
pub fn align_byte_range(offset: u64, range: u64, alignment: u64, width: u64) -> AlignedByteRange {
    let alignment = alignment.max(1);
    let begin = offset & !(alignment - 1);
    let end = align_up(offset.saturating_add(range), alignment).min(width);
    AlignedByteRange {
        offset: begin,
        range: end.saturating_sub(begin),
        byte_offset: offset - begin,
    }
}

#[cfg(test)]
#[path = "quantize_tests.rs"]
mod tests;
