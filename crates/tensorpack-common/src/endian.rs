//! Byte-order helpers.
//!
//! Stored tensor bytes are always little-endian. The host order is passed in
//! explicitly as an [`Endian`] so decoders can be exercised as if running on
//! a big-endian target.

use crate::error::{Result, TensorPackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Byte order of the compilation target.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { Self::Big } else { Self::Little }
    }

    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }
}

fn check_width(element_size: usize, len: usize) -> Result<()> {
    if element_size == 0 || len % element_size != 0 {
        return Err(TensorPackError::invalid(format!(
            "buffer of {len} bytes is not a whole number of {element_size}-byte elements"
        )));
    }
    Ok(())
}

/// Reverse the bytes of every `element_size`-wide element in place.
pub fn swap_byte_order_in_place(element_size: usize, bytes: &mut [u8]) -> Result<()> {
    check_width(element_size, bytes.len())?;
    if element_size > 1 {
        for chunk in bytes.chunks_exact_mut(element_size) {
            chunk.reverse();
        }
    }
    Ok(())
}

/// Copy `src` into `dst`, reversing each `element_size`-wide element.
pub fn swap_byte_order_copy(element_size: usize, src: &[u8], dst: &mut [u8]) -> Result<()> {
    check_lengths(src.len(), dst.len())?;
    check_width(element_size, src.len())?;
    for (s, d) in src.chunks_exact(element_size).zip(dst.chunks_exact_mut(element_size)) {
        d.copy_from_slice(s);
        d.reverse();
    }
    Ok(())
}

fn check_lengths(src: usize, dst: usize) -> Result<()> {
    if src != dst {
        return Err(TensorPackError::invalid(format!(
            "source and destination buffer size mismatch: expected {dst} bytes, got {src}"
        )));
    }
    Ok(())
}

/// Copy little-endian `src` into host-order `dst`.
///
/// Both buffers must have the same length.
pub fn read_little_endian(host: Endian, element_size: usize, src: &[u8], dst: &mut [u8]) -> Result<()> {
    check_lengths(src.len(), dst.len())?;
    if host.is_little() || element_size <= 1 {
        dst.copy_from_slice(src);
        Ok(())
    } else {
        swap_byte_order_copy(element_size, src, dst)
    }
}

/// Copy host-order `src` into little-endian `dst`.
pub fn write_little_endian(host: Endian, element_size: usize, src: &[u8], dst: &mut [u8]) -> Result<()> {
    read_little_endian(host, element_size, src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_host_copies_verbatim() {
        let src = [0x00, 0x00, 0x80, 0x3F];
        let mut dst = [0u8; 4];
        read_little_endian(Endian::Little, 4, &src, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn big_host_swaps_each_element() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 8];
        read_little_endian(Endian::Big, 4, &src, &mut dst).unwrap();
        assert_eq!(dst, [4, 3, 2, 1, 8, 7, 6, 5]);

        let mut back = [0u8; 8];
        write_little_endian(Endian::Big, 4, &dst, &mut back).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut dst = [0u8; 3];
        let err = read_little_endian(Endian::Little, 1, &[0u8; 4], &mut dst).unwrap_err();
        assert!(err.to_string().contains("expected 3 bytes, got 4"));
    }

    #[test]
    fn ragged_swap_is_rejected() {
        let mut bytes = [0u8; 6];
        assert!(swap_byte_order_in_place(4, &mut bytes).is_err());
        assert!(swap_byte_order_in_place(2, &mut bytes).is_ok());
    }
}
