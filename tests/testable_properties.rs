//! End-to-end checks of the codec, resolver, converter and planner
//! working together through the facade crate.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tensorpack::{
    ArenaPlanner, BufferLookup, CpuAllocator, DeviceLocation, ElementType, Endian, ErrorKind, ExternalDataInfo,
    PlannerConfig, SparseTensorDescriptor, TensorCodec, TensorDescriptor, TypedData, dense_to_sparse,
    sparse_to_dense,
};

#[test]
fn external_region_bounds_follow_file_size() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = TensorDescriptor::new("w", ElementType::Uint8, [20])
        .with_external(ExternalDataInfo::file("blob.bin", 10, 20));
    let codec = TensorCodec::default().with_base_dir(dir.path());

    fs::write(dir.path().join("blob.bin"), [0u8; 25])?;
    let err = codec.descriptor_to_tensor(&desc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);

    fs::write(dir.path().join("blob.bin"), (0u8..30).collect::<Vec<_>>())?;
    let tensor = codec.descriptor_to_tensor(&desc)?;
    assert_eq!(tensor.as_bytes().map(<[u8]>::len), Some(20));
    assert_eq!(tensor.to_vec::<u8>()?, (10u8..30).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn big_endian_float_decode_and_encode() -> anyhow::Result<()> {
    let wire = vec![0x00, 0x00, 0x80, 0x3F];
    let desc = TensorDescriptor::new("one", ElementType::Float, [1]).with_raw(wire.clone());
    let codec = TensorCodec::default().with_endian(Endian::Big);

    let host = codec.unpack_initializer_data(&desc)?;
    assert_eq!(f32::from_be_bytes(host[..].try_into()?), 1.0);

    let tensor = codec.descriptor_to_tensor(&desc)?;
    let encoded = codec.tensor_to_descriptor(&tensor, "one", false)?;
    assert_eq!(encoded.raw_data(), Some(wire.as_slice()));
    Ok(())
}

#[test]
fn coordinate_sparse_expansion() -> anyhow::Result<()> {
    let sparse = SparseTensorDescriptor {
        values: TensorDescriptor::new("v", ElementType::Int32, [1]).with_typed(TypedData::Int32(vec![9])),
        indices: TensorDescriptor::new("i", ElementType::Int64, [1, 2]).with_typed(TypedData::Int64(vec![1, 2])),
        dims: vec![2, 3],
    };
    let codec = TensorCodec::default();
    let dense = codec.descriptor_to_tensor(&sparse_to_dense(&codec, &sparse)?)?;
    assert_eq!(dense.to_vec::<i32>()?, [0, 0, 0, 0, 0, 9]);

    let back = dense_to_sparse(&codec, &sparse_to_dense(&codec, &sparse)?)?;
    assert_eq!(back.indices.raw_data(), Some(&[5u8][..]));
    assert_eq!(back.values.raw_data(), Some(&9i32.to_le_bytes()[..]));
    Ok(())
}

#[test]
fn planner_peak_and_lookups() -> anyhow::Result<()> {
    let cpu = DeviceLocation::cpu();
    let mut planner = ArenaPlanner::new(PlannerConfig { alignment: 0 });
    planner.register_allocator(Arc::new(CpuAllocator::new()))?;
    for (id, len) in [(0usize, 100i64), (1, 0), (2, 50)] {
        planner.trace(id, cpu, &TensorDescriptor::new(format!("t{id}"), ElementType::Uint8, [len]))?;
    }
    let planned = planner.finalize()?;
    assert_eq!(planned.get(&cpu), Some(&150));

    assert!(matches!(planner.get_buffer(1, &cpu)?, BufferLookup::Empty));
    assert!(matches!(planner.get_buffer(3, &cpu)?, BufferLookup::NotTraced(_)));
    Ok(())
}
