//! Tensor descriptor codec
//!
//! Decodes serialized tensor descriptors (typed fields, raw little-endian
//! bytes, or references to external files and process memory) into
//! in-memory tensors and encodes them back, plus coordinate-format
//! sparse/dense conversion.

pub mod codec;
pub mod descriptor;
pub mod env;
pub mod external;
pub mod sparse;

pub use codec::{TensorCodec, convert_raw_data_in_place};
pub use descriptor::{SparseTensorDescriptor, TensorDescriptor, TensorPayload, TypedData};
pub use env::{DefaultEnv, Env, ExternalBytes, MappedRegion};
pub use external::{
    BlobRegion, ExternalDataInfo, ExternalLocation, LoadedExternal, MEMORY_ADDRESS_TAG, PrepackedBlobs,
    ResolvedExternal, ResolvedSource, resolve_external_data,
};
pub use sparse::{dense_to_sparse, sparse_to_dense};
