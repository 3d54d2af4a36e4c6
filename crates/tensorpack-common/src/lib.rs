//! Common types for tensor persistence and arena planning
//!
//! This crate provides the element-type registry, byte-size arithmetic,
//! endianness helpers, the in-memory tensor and the error and configuration
//! types used across the tensorpack crates.

pub mod config;
pub mod dtype;
pub mod element;
pub mod endian;
pub mod error;
pub mod scalar;
pub mod shape;
pub mod size;
pub mod tensor;

pub use config::{CodecConfig, ConfigError, PlannerConfig, TensorPackConfig};
pub use dtype::{ElementType, FieldConversion, TypeInfo, TypedField};
pub use element::{Element, bytes_to_vec, vec_to_bytes};
pub use endian::Endian;
pub use error::*;
pub use scalar::*;
pub use shape::TensorShape;
pub use size::{ALLOC_ALIGNMENT, align_up, tensor_byte_size};
pub use tensor::{Tensor, TensorData};
