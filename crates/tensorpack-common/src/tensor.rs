//! In-memory tensor produced by the codec.

use crate::dtype::ElementType;
use crate::element::{Element, bytes_to_vec, vec_to_bytes};
use crate::error::{Result, TensorPackError};
use crate::shape::TensorShape;
use crate::size;

/// Backing storage of a [`Tensor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorData {
    /// Host-order element bytes.
    Bytes(Vec<u8>),
    /// One owned string per element.
    Strings(Vec<String>),
}

/// A dense tensor owning its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    element_type: ElementType,
    shape: TensorShape,
    data: TensorData,
}

impl Tensor {
    /// Zero-filled tensor (empty strings for string tensors).
    pub fn zeros(element_type: ElementType, shape: impl Into<TensorShape>) -> Result<Self> {
        let shape = shape.into();
        let data = if element_type.is_string() {
            TensorData::Strings(vec![String::new(); shape.element_count()?])
        } else {
            TensorData::Bytes(vec![0u8; size::tensor_byte_size(shape.dims(), element_type, 0)?])
        };
        Ok(Self { element_type, shape, data })
    }

    /// Wrap host-order bytes. The length must match the shape exactly.
    pub fn from_bytes(element_type: ElementType, shape: impl Into<TensorShape>, bytes: Vec<u8>) -> Result<Self> {
        let shape = shape.into();
        if element_type.is_string() {
            return Err(TensorPackError::invalid("string tensors cannot be built from bytes"));
        }
        let expected = size::tensor_byte_size(shape.dims(), element_type, 0)?;
        if bytes.len() != expected {
            return Err(TensorPackError::invalid(format!(
                "tensor {shape} of {element_type} needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { element_type, shape, data: TensorData::Bytes(bytes) })
    }

    pub fn from_strings(shape: impl Into<TensorShape>, strings: Vec<String>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.element_count()?;
        if strings.len() != expected {
            return Err(TensorPackError::invalid(format!(
                "tensor {shape} needs {expected} strings, got {}",
                strings.len()
            )));
        }
        Ok(Self { element_type: ElementType::String, shape, data: TensorData::Strings(strings) })
    }

    pub fn from_slice<T: Element>(shape: impl Into<TensorShape>, values: &[T]) -> Result<Self> {
        Self::from_bytes(T::ELEMENT_TYPE, shape, vec_to_bytes(values))
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Host-order bytes, or `None` for string tensors.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            TensorData::Bytes(b) => Some(b),
            TensorData::Strings(_) => None,
        }
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.data {
            TensorData::Bytes(b) => Some(b),
            TensorData::Strings(_) => None,
        }
    }

    pub fn strings(&self) -> Option<&[String]> {
        match &self.data {
            TensorData::Strings(s) => Some(s),
            TensorData::Bytes(_) => None,
        }
    }

    pub fn strings_mut(&mut self) -> Option<&mut [String]> {
        match &mut self.data {
            TensorData::Strings(s) => Some(s),
            TensorData::Bytes(_) => None,
        }
    }

    /// Size of the element data in bytes; string tensors report the
    /// in-memory size of their string handles.
    pub fn size_in_bytes(&self) -> usize {
        match &self.data {
            TensorData::Bytes(b) => b.len(),
            TensorData::Strings(s) => std::mem::size_of_val(s.as_slice()),
        }
    }

    /// Copy the elements out as `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::ELEMENT_TYPE != self.element_type {
            return Err(TensorPackError::TypeMismatch { expected: T::ELEMENT_TYPE, actual: self.element_type });
        }
        match &self.data {
            TensorData::Bytes(b) => Ok(bytes_to_vec(b)),
            TensorData::Strings(_) => Err(TensorPackError::invalid("string tensor has no numeric view")),
        }
    }
}
