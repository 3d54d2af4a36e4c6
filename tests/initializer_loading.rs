//! Loading initializers into planned arenas.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tensorpack::{
    ArenaPlanner, CodecConfig, CpuAllocator, DeviceLocation, ElementType, ErrorKind, ExternalDataInfo, Initializer,
    InitializerLoader, InitializerStorage, PlannerConfig, TensorCodec, TensorDescriptor, TensorPackConfig,
    TypedData,
};

fn f32_raw(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn loader(base_dir: &std::path::Path) -> InitializerLoader {
    let codec = TensorCodec::new(CodecConfig::default()).with_base_dir(base_dir);
    let mut loader = InitializerLoader::with_codec(codec, ArenaPlanner::new(PlannerConfig::default()));
    loader.register_allocator(Arc::new(CpuAllocator::new())).unwrap();
    loader
}

#[test]
fn mixed_initializers_land_in_expected_storage() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = TempDir::new()?;
    fs::write(dir.path().join("weights.bin"), f32_raw(&[0.0, 1.0, 2.0, 3.0]))?;

    let cpu = DeviceLocation::cpu();
    let w = TensorDescriptor::new("w", ElementType::Float, [2, 2])
        .with_external(ExternalDataInfo::file("weights.bin", 0, 16));
    let b = TensorDescriptor::new("b", ElementType::Int64, [2]).with_typed(TypedData::Int64(vec![-1, 1]));
    let empty = TensorDescriptor::new("empty", ElementType::Float, [0, 4]);
    let labels = TensorDescriptor::new("labels", ElementType::String, [2])
        .with_typed(TypedData::String(vec!["cat".into(), "dog".into()]));
    let scale = TensorDescriptor::new("scale", ElementType::Float, [1]).with_raw(f32_raw(&[0.5]));
    let inits = [
        Initializer::new(0, cpu, w),
        Initializer::new(1, cpu, b),
        Initializer::new(2, cpu, empty),
        Initializer::new(3, cpu, labels),
        Initializer::new(4, cpu, scale).unplanned(),
    ];

    let set = loader(dir.path()).load(&inits)?;
    assert_eq!(set.len(), 5);

    assert!(matches!(set.get("w").map(|e| &e.storage), Some(InitializerStorage::Arena { .. })));
    assert_eq!(set.bytes("w")?, f32_raw(&[0.0, 1.0, 2.0, 3.0]).as_slice());

    let b = set.bytes("b")?;
    assert_eq!(b.len(), 16);
    assert_eq!(i64::from_ne_bytes(b[..8].try_into()?), -1);

    assert!(matches!(set.get("empty").map(|e| &e.storage), Some(InitializerStorage::Empty)));
    assert!(set.bytes("empty")?.is_empty());

    assert_eq!(set.strings("labels")?, ["cat", "dog"]);
    assert!(set.bytes("labels").is_err());

    assert!(matches!(set.get("scale").map(|e| &e.storage), Some(InitializerStorage::Private { .. })));
    assert_eq!(set.bytes("scale")?, f32_raw(&[0.5]).as_slice());

    // w and b are 64-byte aligned blocks
    let patterns = set.planner().memory_patterns()?;
    assert_eq!(patterns.pattern(&cpu).map(|p| p.peak_size()), Some(128));
    Ok(())
}

#[test]
fn decoding_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let inits = [Initializer::new(
        0,
        DeviceLocation::cpu(),
        TensorDescriptor::new("w", ElementType::Float, [4]).with_external(ExternalDataInfo::file("missing.bin", 0, 16)),
    )];
    let err = loader(dir.path()).load(&inits).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn duplicate_names_rejected() {
    let dir = TempDir::new().unwrap();
    let cpu = DeviceLocation::cpu();
    let raw = || TensorDescriptor::new("dup", ElementType::Uint8, [1]).with_raw(vec![1]);
    let inits = [Initializer::new(0, cpu, raw()), Initializer::new(1, cpu, raw())];
    assert!(loader(dir.path()).load(&inits).is_err());
}

#[test]
fn loader_from_config() -> anyhow::Result<()> {
    let mut loader = InitializerLoader::new(&TensorPackConfig::default());
    loader.register_allocator(Arc::new(CpuAllocator::new()))?;
    let bias = TensorDescriptor::new("bias", ElementType::Float, [2]).with_raw(f32_raw(&[1.0, 2.0]));
    let set = loader.load(&[Initializer::new(0, DeviceLocation::cpu(), bias)])?;
    assert_eq!(set.bytes("bias")?, f32_raw(&[1.0, 2.0]).as_slice());
    Ok(())
}

#[test]
fn odd_sized_tensor_keeps_its_length_under_default_alignment() -> anyhow::Result<()> {
    let mut loader = InitializerLoader::new(&TensorPackConfig::default());
    loader.register_allocator(Arc::new(CpuAllocator::new()))?;
    let cpu = DeviceLocation::cpu();
    let mask = TensorDescriptor::new("mask", ElementType::Uint8, [3]).with_raw(vec![1, 0, 1]);
    let bias = TensorDescriptor::new("bias", ElementType::Float, [2]).with_raw(f32_raw(&[1.0, 2.0]));
    let set = loader.load(&[Initializer::new(0, cpu, mask), Initializer::new(1, cpu, bias)])?;

    assert_eq!(set.bytes("mask")?, [1, 0, 1]);
    assert_eq!(set.bytes("bias")?.len(), 8);
    assert!(matches!(
        set.get("mask").map(|e| &e.storage),
        Some(InitializerStorage::Arena { len: 3, block, .. }) if block.size == 64
    ));
    Ok(())
}
