//! Serialized tensor descriptors.

use serde::{Deserialize, Serialize};
use tensorpack_common::{ElementType, Result, TensorPackError, TensorShape, TypedField, size};

use crate::external::{ExternalDataInfo, ExternalLocation};

/// Values carried in one of the type-specific repeated fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedData {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    String(Vec<String>),
}

impl TypedData {
    pub fn field(&self) -> TypedField {
        match self {
            Self::Float(_) => TypedField::Float,
            Self::Double(_) => TypedField::Double,
            Self::Int32(_) => TypedField::Int32,
            Self::Int64(_) => TypedField::Int64,
            Self::Uint64(_) => TypedField::Uint64,
            Self::String(_) => TypedField::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Uint64(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a descriptor's element data lives. The variants are mutually
/// exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorPayload {
    /// No data; valid only for zero-element tensors.
    #[default]
    Empty,
    Typed(TypedData),
    /// Contiguous little-endian element bytes.
    Raw(Vec<u8>),
    External(ExternalDataInfo),
}

/// A serialized, self-describing tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub name: String,
    pub data_type: ElementType,
    pub dims: Vec<i64>,
    #[serde(default)]
    pub payload: TensorPayload,
}

impl TensorDescriptor {
    pub fn new(name: impl Into<String>, data_type: ElementType, dims: impl Into<Vec<i64>>) -> Self {
        Self { name: name.into(), data_type, dims: dims.into(), payload: TensorPayload::Empty }
    }

    #[must_use]
    pub fn with_raw(mut self, bytes: Vec<u8>) -> Self {
        self.payload = TensorPayload::Raw(bytes);
        self
    }

    #[must_use]
    pub fn with_typed(mut self, data: TypedData) -> Self {
        self.payload = TensorPayload::Typed(data);
        self
    }

    #[must_use]
    pub fn with_external(mut self, info: ExternalDataInfo) -> Self {
        self.payload = TensorPayload::External(info);
        self
    }

    pub fn shape(&self) -> TensorShape {
        TensorShape::from(self.dims.as_slice())
    }

    /// Logical element count implied by `dims`.
    pub fn element_count(&self) -> Result<usize> {
        size::element_count(&self.dims)
    }

    /// Byte size implied by `dims` and `data_type`, rounded to `alignment`.
    pub fn byte_size(&self, alignment: usize) -> Result<usize> {
        size::tensor_byte_size(&self.dims, self.data_type, alignment)
    }

    pub fn raw_data(&self) -> Option<&[u8]> {
        match &self.payload {
            TensorPayload::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub fn typed_data(&self) -> Option<&TypedData> {
        match &self.payload {
            TensorPayload::Typed(t) => Some(t),
            _ => None,
        }
    }

    pub fn external_data(&self) -> Option<&ExternalDataInfo> {
        match &self.payload {
            TensorPayload::External(e) => Some(e),
            _ => None,
        }
    }

    pub fn has_raw_data(&self) -> bool {
        matches!(self.payload, TensorPayload::Raw(_))
    }

    pub fn has_external_data(&self) -> bool {
        matches!(self.payload, TensorPayload::External(_))
    }

    /// True when the external reference points into process memory.
    pub fn has_external_data_in_memory(&self) -> bool {
        matches!(
            self.external_data(),
            Some(ExternalDataInfo { location: ExternalLocation::InProcess { .. }, .. })
        )
    }

    /// Reject payload forms that can never be valid for `data_type`.
    pub fn check_payload_form(&self) -> Result<()> {
        if self.data_type.is_string() {
            match self.payload {
                TensorPayload::Raw(_) => {
                    return Err(TensorPackError::invalid(format!(
                        "string tensor '{}' can not have raw data",
                        self.name
                    )));
                }
                TensorPayload::External(_) => {
                    return Err(TensorPackError::invalid(format!(
                        "external data type of '{}' cannot be UNDEFINED or STRING",
                        self.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Coordinate-format sparse tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseTensorDescriptor {
    /// Non-zero values in order; a rank-1 descriptor of `nnz` elements.
    pub values: TensorDescriptor,
    /// Either `[nnz]` flat indices or `[nnz, rank]` coordinates.
    pub indices: TensorDescriptor,
    /// Dense shape.
    pub dims: Vec<i64>,
}
