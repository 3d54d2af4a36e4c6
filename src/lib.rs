//! Tensor persistence and arena planning for model initializers
//!
//! This crate ties the descriptor codec and the arena planner together:
//! initializer descriptors are traced, laid out into one arena per device
//! location and decoded in place.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tensorpack::{CpuAllocator, DeviceLocation, Initializer, InitializerLoader, TensorPackConfig};
//! # use tensorpack::{ElementType, TensorDescriptor};
//!
//! # fn main() -> tensorpack::Result<()> {
//! let config = TensorPackConfig::load(std::path::Path::new("tensorpack.toml"))?;
//! let mut loader = InitializerLoader::new(&config);
//! loader.register_allocator(Arc::new(CpuAllocator::new()))?;
//!
//! let bias = TensorDescriptor::new("bias", ElementType::Float, [2]).with_raw(vec![0; 8]);
//! let set = loader.load(&[Initializer::new(0, DeviceLocation::cpu(), bias)])?;
//! assert_eq!(set.bytes("bias")?.len(), 8);
//! # Ok(())
//! # }
//! ```

pub mod initializers;

pub use initializers::{Initializer, InitializerLoader, InitializerSet, InitializerStorage, LoadedInitializer};

pub use tensorpack_codec::{
    DefaultEnv, Env, ExternalDataInfo, ExternalLocation, SparseTensorDescriptor, TensorCodec, TensorDescriptor,
    TensorPayload, TypedData, dense_to_sparse, sparse_to_dense,
};
pub use tensorpack_common::{
    CodecConfig, ElementType, Endian, ErrorKind, PlannerConfig, Result, Tensor, TensorPackConfig, TensorPackError,
    TensorShape,
};
pub use tensorpack_planner::{
    Allocator, ArenaPlanner, BufferLookup, CpuAllocator, DeviceLocation, MemoryBlock, MemoryPattern,
};

pub use tensorpack_codec as codec;
pub use tensorpack_common as common;
pub use tensorpack_planner as planner;
