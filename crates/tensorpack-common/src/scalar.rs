//! Scalar types without a native Rust counterpart: packed 4-bit pairs and
//! the 8-bit float formats.

use bytemuck::{Pod, Zeroable};

pub use crate::size::calc_num_int4_pairs;

// ── Packed 4-bit pairs ──────────────────────────────────────────────

/// Two signed 4-bit values in one byte. Element 0 is the low nibble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Int4x2(u8);

impl Int4x2 {
    pub const MIN_VAL: i8 = -8;
    pub const MAX_VAL: i8 = 7;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u8 {
        self.0
    }

    /// Pack two values; each is truncated to its low four bits.
    pub const fn from_pair(lo: i8, hi: i8) -> Self {
        Self(((lo as u8) & 0x0F) | (((hi as u8) & 0x0F) << 4))
    }

    /// Element `index` (0 or 1), sign-extended.
    pub const fn get(self, index: usize) -> i8 {
        let nibble = if index == 0 { self.0 << 4 } else { self.0 & 0xF0 };
        (nibble as i8) >> 4
    }
}

/// Two unsigned 4-bit values in one byte. Element 0 is the low nibble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct UInt4x2(u8);

impl UInt4x2 {
    pub const MIN_VAL: u8 = 0;
    pub const MAX_VAL: u8 = 15;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u8 {
        self.0
    }

    pub const fn from_pair(lo: u8, hi: u8) -> Self {
        Self((lo & 0x0F) | ((hi & 0x0F) << 4))
    }

    pub const fn get(self, index: usize) -> u8 {
        if index == 0 { self.0 & 0x0F } else { self.0 >> 4 }
    }
}

// ── 8-bit floats ────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Special {
    /// Only `S.1111.111` is NaN, no infinities.
    FiniteNanAllOnes,
    /// Exponent all ones encodes inf (zero mantissa) or NaN.
    Ieee,
    /// `0x80` is the single NaN, no negative zero, no infinities.
    Fnuz,
}

fn decode_f8(bits: u8, exp_bits: u32, man_bits: u32, bias: i32, special: Special) -> f32 {
    let negative = bits & 0x80 != 0;
    let exp_max = (1u8 << exp_bits) - 1;
    let man_max = (1u8 << man_bits) - 1;
    let exp = (bits >> man_bits) & exp_max;
    let man = bits & man_max;

    match special {
        Special::Fnuz if bits == 0x80 => return f32::NAN,
        Special::FiniteNanAllOnes if exp == exp_max && man == man_max => return f32::NAN,
        Special::Ieee if exp == exp_max => {
            let v = if man == 0 { f32::INFINITY } else { f32::NAN };
            return if negative { -v } else { v };
        }
        _ => {}
    }

    let scale = (1u32 << man_bits) as f32;
    let magnitude = if exp == 0 {
        f32::from(man) / scale * 2f32.powi(1 - bias)
    } else {
        (1.0 + f32::from(man) / scale) * 2f32.powi(i32::from(exp) - bias)
    };
    if negative { -magnitude } else { magnitude }
}

macro_rules! float8 {
    ($(#[$doc:meta])* $name:ident, $exp:expr, $man:expr, $bias:expr, $special:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name(u8);

        impl $name {
            pub const fn from_bits(bits: u8) -> Self {
                Self(bits)
            }

            pub const fn to_bits(self) -> u8 {
                self.0
            }

            pub fn to_f32(self) -> f32 {
                decode_f8(self.0, $exp, $man, $bias, $special)
            }
        }
    };
}

float8!(
    /// 4 exponent bits, 3 mantissa bits, finite only.
    Float8E4M3FN, 4, 3, 7, Special::FiniteNanAllOnes
);
float8!(
    /// 4 exponent bits, 3 mantissa bits, finite, no negative zero.
    Float8E4M3FNUZ, 4, 3, 8, Special::Fnuz
);
float8!(
    /// 5 exponent bits, 2 mantissa bits, with infinities.
    Float8E5M2, 5, 2, 15, Special::Ieee
);
float8!(
    /// 5 exponent bits, 2 mantissa bits, finite, no negative zero.
    Float8E5M2FNUZ, 5, 2, 16, Special::Fnuz
);
