//! Mapping from Rust scalar types to [`ElementType`].

use half::{bf16, f16};

use crate::dtype::ElementType;
use crate::scalar::{Float8E4M3FN, Float8E4M3FNUZ, Float8E5M2, Float8E5M2FNUZ, Int4x2, UInt4x2};

/// A Rust type that can back a decoded tensor.
///
/// Buffers are exchanged as host-order bytes; implementations convert
/// between those bytes and typed slices. Packed 4-bit types count one pair
/// per slice element.
pub trait Element: Copy + Default + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    /// Write `src` into `dst` as host-order bytes. `dst` has exactly
    /// `size_of_val(src)` bytes.
    fn write_bytes(src: &[Self], dst: &mut [u8]);

    /// Fill `dst` from host-order bytes. `src` has exactly `size_of_val(dst)`
    /// bytes.
    fn read_bytes(src: &[u8], dst: &mut [Self]);

    /// Byte view of `dst` when every bit pattern is a valid `Self`.
    fn as_bytes_mut(dst: &mut [Self]) -> Option<&mut [u8]> {
        let _ = dst;
        None
    }
}

macro_rules! pod_element {
    ($($ty:ty => $et:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const ELEMENT_TYPE: ElementType = ElementType::$et;

                fn write_bytes(src: &[Self], dst: &mut [u8]) {
                    dst.copy_from_slice(bytemuck::cast_slice(src));
                }

                fn read_bytes(src: &[u8], dst: &mut [Self]) {
                    bytemuck::cast_slice_mut::<Self, u8>(dst).copy_from_slice(src);
                }

                fn as_bytes_mut(dst: &mut [Self]) -> Option<&mut [u8]> {
                    Some(bytemuck::cast_slice_mut(dst))
                }
            }
        )*
    };
}

pod_element! {
    f32 => Float,
    f64 => Double,
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u32 => Uint32,
    u64 => Uint64,
    f16 => Float16,
    bf16 => BFloat16,
    Float8E4M3FN => Float8E4M3FN,
    Float8E4M3FNUZ => Float8E4M3FNUZ,
    Float8E5M2 => Float8E5M2,
    Float8E5M2FNUZ => Float8E5M2FNUZ,
    Int4x2 => Int4,
    UInt4x2 => Uint4,
}

// bool is not Pod: any non-zero byte reads as true.
impl Element for bool {
    const ELEMENT_TYPE: ElementType = ElementType::Bool;

    fn write_bytes(src: &[Self], dst: &mut [u8]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = u8::from(s);
        }
    }

    fn read_bytes(src: &[u8], dst: &mut [Self]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = s != 0;
        }
    }
}

/// Reinterpret host-order bytes as a vector of `T`.
///
/// Trailing bytes that do not form a whole element are ignored.
pub fn bytes_to_vec<T: Element>(bytes: &[u8]) -> Vec<T> {
    let width = std::mem::size_of::<T>();
    let mut out = vec![T::default(); bytes.len() / width];
    T::read_bytes(&bytes[..out.len() * width], &mut out);
    out
}

/// Host-order bytes of `values`.
pub fn vec_to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; std::mem::size_of_val(values)];
    T::write_bytes(values, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_round_trip() {
        let v = [1.5f32, -2.0, 0.25];
        let bytes = vec_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_vec::<f32>(&bytes), v);
    }

    #[test]
    fn bool_reads_any_nonzero_as_true() {
        assert_eq!(bytes_to_vec::<bool>(&[0, 1, 2, 255]), [false, true, true, true]);
        assert_eq!(vec_to_bytes(&[true, false]), [1, 0]);
    }

    #[test]
    fn half_types() {
        let v = [f16::from_f32(1.0), f16::from_f32(-0.5)];
        assert_eq!(bytes_to_vec::<f16>(&vec_to_bytes(&v)), v);
        assert_eq!(<bf16 as Element>::ELEMENT_TYPE, ElementType::BFloat16);
    }
}
