//! Coordinate-format sparse ↔ dense conversion.
//!
//! Values are moved as opaque `byte_width` chunks, so any fixed-width
//! element type is supported without per-type code. An element counts as
//! zero only when all of its bytes are zero.

use tensorpack_common::endian::write_little_endian;
use tensorpack_common::{ElementType, Endian, Result, TensorPackError, TypeInfo, size};
use tracing::debug;

use crate::codec::TensorCodec;
use crate::descriptor::{SparseTensorDescriptor, TensorDescriptor, TensorPayload};
use crate::env::Env;

/// Expand `sparse` into a dense descriptor with little-endian raw data.
///
/// Indices are either `[nnz]` flat offsets or `[nnz, rank]` coordinates
/// with `rank == dims.len()`. Elements not addressed by an index are zero.
pub fn sparse_to_dense<E: Env>(codec: &TensorCodec<E>, sparse: &SparseTensorDescriptor) -> Result<TensorDescriptor> {
    let values = &sparse.values;
    let info = value_info(values.data_type)?;
    let width = info.byte_width;

    let dense_len = size::element_count(&sparse.dims)?;
    let dense_bytes = dense_len
        .checked_mul(width)
        .ok_or_else(|| TensorPackError::overflow(format!("dense size of '{}'", values.name)))?;
    let mut dense = vec![0u8; dense_bytes];

    let nnz = values.element_count()?;
    let value_bytes = codec.unpack_initializer_data(values)?;
    if value_bytes.len() != nnz * width {
        return Err(TensorPackError::DataCorruption {
            name: values.name.clone(),
            expected: nnz,
            actual: value_bytes.len() / width,
        });
    }

    if nnz > 0 {
        let offsets = linear_offsets(codec, sparse, nnz)?;
        for (k, offset) in offsets.into_iter().enumerate() {
            let dst = usize::try_from(offset)
                .ok()
                .filter(|&o| o < dense_len)
                .ok_or_else(|| TensorPackError::IndexOutOfBounds {
                    name: values.name.clone(),
                    index: offset,
                    dense_len,
                })?;
            dense[dst * width..(dst + 1) * width].copy_from_slice(&value_bytes[k * width..(k + 1) * width]);
        }
    }
    debug!(name = %values.name, nnz, dense_len, "expanded sparse tensor");

    let mut raw = vec![0u8; dense.len()];
    write_little_endian(codec.endian(), width, &dense, &mut raw)?;
    Ok(TensorDescriptor::new(values.name.clone(), values.data_type, sparse.dims.clone()).with_raw(raw))
}

/// Collect the non-zero elements of `dense` in flat coordinate form.
///
/// The index type is the narrowest signed integer able to hold the largest
/// index. An all-zero input yields empty `[0]`-shaped values and `Int8`
/// indices.
pub fn dense_to_sparse<E: Env>(codec: &TensorCodec<E>, dense: &TensorDescriptor) -> Result<SparseTensorDescriptor> {
    let info = value_info(dense.data_type)?;
    let width = info.byte_width;
    let tensor = codec.descriptor_to_tensor(dense)?;
    let bytes = tensor
        .as_bytes()
        .ok_or_else(|| TensorPackError::invalid(format!("sparse conversion of '{}' needs a numeric tensor", dense.name)))?;

    let mut values = Vec::new();
    let mut indices: Vec<i64> = Vec::new();
    for (i, chunk) in bytes.chunks_exact(width).enumerate() {
        if chunk.iter().any(|&b| b != 0) {
            values.extend_from_slice(chunk);
            indices.push(i as i64);
        }
    }
    let nnz = indices.len();
    debug!(name = %dense.name, nnz, "collected non-zero elements");

    let mut raw_values = vec![0u8; values.len()];
    write_little_endian(codec.endian(), width, &values, &mut raw_values)?;

    let index_type = narrowest_index_type(indices.last().copied().unwrap_or(0));
    let index_width = index_width(index_type);
    let raw_indices: Vec<u8> =
        indices.iter().flat_map(|i| i.to_le_bytes().into_iter().take(index_width)).collect();

    let nnz = nnz as i64;
    Ok(SparseTensorDescriptor {
        values: TensorDescriptor::new(dense.name.clone(), dense.data_type, [nnz]).with_raw(raw_values),
        indices: TensorDescriptor::new(format!("{}_indices", dense.name), index_type, [nnz]).with_raw(raw_indices),
        dims: dense.dims.clone(),
    })
}

fn value_info(ty: ElementType) -> Result<TypeInfo> {
    if ty.is_string() {
        return Err(TensorPackError::NotImplemented("sparse string tensors".into()));
    }
    let info = ty.info().ok_or_else(|| TensorPackError::NotImplemented(format!("sparse tensors of {ty}")))?;
    if info.packed {
        return Err(TensorPackError::NotImplemented(format!("sparse tensors of packed type {ty}")));
    }
    Ok(info)
}

fn narrowest_index_type(max_index: i64) -> ElementType {
    if max_index <= i64::from(i8::MAX) {
        ElementType::Int8
    } else if max_index <= i64::from(i16::MAX) {
        ElementType::Int16
    } else if max_index <= i64::from(i32::MAX) {
        ElementType::Int32
    } else {
        ElementType::Int64
    }
}

fn index_width(ty: ElementType) -> usize {
    match ty {
        ElementType::Int8 => 1,
        ElementType::Int16 => 2,
        ElementType::Int32 => 4,
        _ => 8,
    }
}

/// Decode the index tensor and turn every entry into a flat offset.
fn linear_offsets<E: Env>(codec: &TensorCodec<E>, sparse: &SparseTensorDescriptor, nnz: usize) -> Result<Vec<i64>> {
    let indices = &sparse.indices;
    match indices.data_type {
        ElementType::Int64 | ElementType::Int32 => {}
        ElementType::Int16 | ElementType::Int8 => {
            if matches!(indices.payload, TensorPayload::Typed(_)) {
                return Err(TensorPackError::invalid(format!(
                    "sparse indices '{}' of type {} must be stored as raw data",
                    indices.name, indices.data_type
                )));
            }
        }
        other => {
            return Err(TensorPackError::invalid(format!(
                "sparse indices '{}' have unsupported type {other}",
                indices.name
            )));
        }
    }

    let width = index_width(indices.data_type);
    let bytes = codec.unpack_initializer_data(indices)?;
    let flat: Vec<i64> = bytes.chunks_exact(width).map(|c| read_index(c, codec.endian())).collect();
    let count = indices.element_count()?;
    if flat.len() != count {
        return Err(TensorPackError::DataCorruption { name: indices.name.clone(), expected: count, actual: flat.len() });
    }

    let dims = &sparse.dims;
    match indices.dims.as_slice() {
        [n] => {
            check_leading_dim(indices, *n, nnz)?;
            Ok(flat)
        }
        [n, rank] => {
            check_leading_dim(indices, *n, nnz)?;
            let rank = usize::try_from(*rank).ok().filter(|&r| r > 0 && r == dims.len()).ok_or_else(|| {
                TensorPackError::invalid(format!(
                    "sparse indices '{}' have coordinate width {rank}, dense rank is {}",
                    indices.name,
                    dims.len()
                ))
            })?;
            let multipliers = row_major_multipliers(dims, &indices.name)?;
            flat.chunks_exact(rank)
                .map(|coords| {
                    coords.iter().zip(&multipliers).try_fold(0i64, |acc, (&c, &m)| {
                        c.checked_mul(m)
                            .and_then(|v| acc.checked_add(v))
                            .ok_or_else(|| TensorPackError::overflow(format!("sparse offset in '{}'", indices.name)))
                    })
                })
                .collect()
        }
        other => Err(TensorPackError::invalid(format!(
            "sparse indices '{}' have unsupported rank {}",
            indices.name,
            other.len()
        ))),
    }
}

fn check_leading_dim(indices: &TensorDescriptor, leading: i64, nnz: usize) -> Result<()> {
    if usize::try_from(leading).ok() != Some(nnz) {
        return Err(TensorPackError::invalid(format!(
            "sparse indices '{}' describe {leading} entries, values hold {nnz}",
            indices.name
        )));
    }
    Ok(())
}

fn row_major_multipliers(dims: &[i64], name: &str) -> Result<Vec<i64>> {
    let mut multipliers = vec![1i64; dims.len()];
    for r in (1..dims.len()).rev() {
        multipliers[r - 1] = dims[r]
            .checked_mul(multipliers[r])
            .ok_or_else(|| TensorPackError::overflow(format!("sparse strides of '{name}'")))?;
    }
    Ok(multipliers)
}

/// Sign-extend one host-order index of 1, 2, 4 or 8 bytes.
fn read_index(chunk: &[u8], endian: Endian) -> i64 {
    let mut buf = [0u8; 8];
    match endian {
        Endian::Little => {
            buf[..chunk.len()].copy_from_slice(chunk);
            let shift = 64 - 8 * chunk.len() as u32;
            (i64::from_le_bytes(buf) << shift) >> shift
        }
        Endian::Big => {
            buf[8 - chunk.len()..].copy_from_slice(chunk);
            let shift = 64 - 8 * chunk.len() as u32;
            (i64::from_be_bytes(buf) << shift) >> shift
        }
    }
}
