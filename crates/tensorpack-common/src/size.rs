//! Byte-size calculation for shapes and element types.

use crate::dtype::ElementType;
use crate::error::{Result, TensorPackError};

/// Alignment used for arena allocations.
pub const ALLOC_ALIGNMENT: usize = 64;

/// Number of bytes needed to hold `count` packed 4-bit values.
#[inline]
pub const fn calc_num_int4_pairs(count: usize) -> usize {
    count / 2 + count % 2
}

/// Round `value` up to `alignment`. An alignment of `0` leaves the value as is.
///
/// Returns `None` on overflow or when `alignment` is not a power of two.
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    if alignment == 0 {
        return Some(value);
    }
    if !alignment.is_power_of_two() {
        return None;
    }
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// `count * width`, rounded up to `alignment`.
pub fn array_byte_size(count: usize, width: usize, alignment: usize) -> Option<usize> {
    count.checked_mul(width).and_then(|n| align_up(n, alignment))
}

/// Product of `dims` as an element count.
///
/// An empty slice is a scalar with one element. Negative dimensions are
/// rejected.
pub fn element_count(dims: &[i64]) -> Result<usize> {
    let mut count: usize = 1;
    for &d in dims {
        let d = usize::try_from(d)
            .map_err(|_| TensorPackError::invalid(format!("Out of bounds dimensions: {dims:?}")))?;
        count = count
            .checked_mul(d)
            .ok_or_else(|| TensorPackError::overflow(format!("element count of {dims:?}")))?;
    }
    Ok(count)
}

/// Bytes required for `count` elements of `element_type`, rounded up to
/// `alignment`.
pub fn byte_size_for_count(count: usize, element_type: ElementType, alignment: usize) -> Result<usize> {
    let info = element_type
        .info()
        .ok_or_else(|| TensorPackError::NotImplemented(format!("size of element type {element_type}")))?;
    let units = if info.packed { calc_num_int4_pairs(count) } else { count };
    array_byte_size(units, info.byte_width, alignment).ok_or_else(|| {
        TensorPackError::overflow(format!("{count} elements of {element_type} aligned to {alignment}"))
    })
}

/// Total byte size of a tensor with `dims` and `element_type`.
pub fn tensor_byte_size(dims: &[i64], element_type: ElementType, alignment: usize) -> Result<usize> {
    let count = element_count(dims)?;
    byte_size_for_count(count, element_type, alignment)
}
