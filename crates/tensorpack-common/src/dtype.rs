//! Element-type registry.
//!
//! Every element kind a descriptor can declare is listed in [`ElementType`],
//! with discriminants matching the serialized wire enum. Physical properties
//! used by the codec and the size calculator come from a single table,
//! [`ElementType::info`], instead of being repeated per type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
#[non_exhaustive]
pub enum ElementType {
    Undefined = 0,
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    BFloat16 = 16,
    Float8E4M3FN = 17,
    Float8E4M3FNUZ = 18,
    Float8E5M2 = 19,
    Float8E5M2FNUZ = 20,
    Uint4 = 21,
    Int4 = 22,
}

/// Which repeated field of a descriptor carries typed values for an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedField {
    Float,
    Double,
    Int32,
    Int64,
    Uint64,
    String,
}

impl fmt::Display for TypedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float => "float_data",
            Self::Double => "double_data",
            Self::Int32 => "int32_data",
            Self::Int64 => "int64_data",
            Self::Uint64 => "uint64_data",
            Self::String => "string_data",
        };
        f.write_str(s)
    }
}

/// How a typed-field value is narrowed into the destination element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldConversion {
    /// Plain numeric cast (truncating for narrower integers).
    Cast,
    /// Non-zero means `true`.
    Truthy,
    /// Value holds the element's bit pattern and must fit in `bits`.
    Bits(u32),
}

/// Physical description of one element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    /// Width in bytes of one in-memory unit. For packed 4-bit types the unit
    /// is a pair of elements.
    pub byte_width: usize,
    /// Two logical elements share one byte.
    pub packed: bool,
    /// Repeated field used for typed (non-raw) payloads.
    pub field: TypedField,
    pub conversion: FieldConversion,
    /// Byte width of one slot in the typed field container. 16-bit logical
    /// types live in 32-bit slots, uint32 lives in a 64-bit slot.
    pub swap_width: usize,
}

const fn numeric(byte_width: usize, field: TypedField, conversion: FieldConversion) -> TypeInfo {
    let swap_width = match field {
        TypedField::Float | TypedField::Int32 => 4,
        TypedField::Double | TypedField::Int64 | TypedField::Uint64 => 8,
        TypedField::String => 0,
    };
    TypeInfo { byte_width, packed: false, field, conversion, swap_width }
}

impl ElementType {
    /// All element types that can be decoded and sized.
    pub const SUPPORTED: [ElementType; 20] = [
        Self::Float,
        Self::Uint8,
        Self::Int8,
        Self::Uint16,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::String,
        Self::Bool,
        Self::Float16,
        Self::Double,
        Self::Uint32,
        Self::Uint64,
        Self::BFloat16,
        Self::Float8E4M3FN,
        Self::Float8E4M3FNUZ,
        Self::Float8E5M2,
        Self::Float8E5M2FNUZ,
        Self::Uint4,
        Self::Int4,
    ];

    /// Convert from the raw wire discriminant.
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Undefined),
            1 => Some(Self::Float),
            2 => Some(Self::Uint8),
            3 => Some(Self::Int8),
            4 => Some(Self::Uint16),
            5 => Some(Self::Int16),
            6 => Some(Self::Int32),
            7 => Some(Self::Int64),
            8 => Some(Self::String),
            9 => Some(Self::Bool),
            10 => Some(Self::Float16),
            11 => Some(Self::Double),
            12 => Some(Self::Uint32),
            13 => Some(Self::Uint64),
            14 => Some(Self::Complex64),
            15 => Some(Self::Complex128),
            16 => Some(Self::BFloat16),
            17 => Some(Self::Float8E4M3FN),
            18 => Some(Self::Float8E4M3FNUZ),
            19 => Some(Self::Float8E5M2),
            20 => Some(Self::Float8E5M2FNUZ),
            21 => Some(Self::Uint4),
            22 => Some(Self::Int4),
            _ => None,
        }
    }

    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Physical properties, or `None` for types this crate cannot decode
    /// (`Undefined`, complex types).
    pub const fn info(self) -> Option<TypeInfo> {
        use FieldConversion::{Bits, Cast, Truthy};
        use TypedField as F;

        let info = match self {
            Self::Float => numeric(4, F::Float, Cast),
            Self::Double => numeric(8, F::Double, Cast),
            Self::Uint8 | Self::Int8 => numeric(1, F::Int32, Cast),
            Self::Uint16 | Self::Int16 => numeric(2, F::Int32, Cast),
            Self::Int32 => numeric(4, F::Int32, Cast),
            Self::Int64 => numeric(8, F::Int64, Cast),
            Self::Uint32 => numeric(4, F::Uint64, Cast),
            Self::Uint64 => numeric(8, F::Uint64, Cast),
            Self::Bool => numeric(1, F::Int32, Truthy),
            Self::Float16 | Self::BFloat16 => numeric(2, F::Int32, Bits(16)),
            Self::Float8E4M3FN | Self::Float8E4M3FNUZ | Self::Float8E5M2 | Self::Float8E5M2FNUZ => {
                numeric(1, F::Int32, Bits(8))
            }
            Self::Uint4 | Self::Int4 => TypeInfo {
                byte_width: 1,
                packed: true,
                field: F::Int32,
                conversion: Cast,
                swap_width: 4,
            },
            Self::String => TypeInfo {
                byte_width: std::mem::size_of::<String>(),
                packed: false,
                field: F::String,
                conversion: Cast,
                swap_width: 0,
            },
            Self::Undefined | Self::Complex64 | Self::Complex128 => return None,
        };
        Some(info)
    }

    pub const fn is_string(self) -> bool {
        matches!(self, Self::String)
    }

    pub const fn is_packed(self) -> bool {
        matches!(self, Self::Uint4 | Self::Int4)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Float => "float",
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Float16 => "float16",
            Self::Double => "double",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::BFloat16 => "bfloat16",
            Self::Float8E4M3FN => "float8e4m3fn",
            Self::Float8E4M3FNUZ => "float8e4m3fnuz",
            Self::Float8E5M2 => "float8e5m2",
            Self::Float8E5M2FNUZ => "float8e5m2fnuz",
            Self::Uint4 => "uint4",
            Self::Int4 => "int4",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
