//! External data resolution against real files.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tensorpack_codec::{
    BlobRegion, ExternalDataInfo, ResolvedSource, TensorCodec, TensorDescriptor, resolve_external_data,
};
use tensorpack_common::{CodecConfig, ElementType, ErrorKind, TensorPackError};

fn model_dir(file_len: u8) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("weights.bin"), (0..file_len).collect::<Vec<u8>>()).unwrap();
    dir
}

fn external_u8(offset: i64, len: usize) -> TensorDescriptor {
    TensorDescriptor::new("w", ElementType::Uint8, [len as i64])
        .with_external(ExternalDataInfo::file("weights.bin", offset, len))
}

#[test]
fn region_past_end_of_file_is_out_of_bounds() {
    let dir = model_dir(25);
    let codec = TensorCodec::default().with_base_dir(dir.path());
    let err = codec.load_external(&external_u8(10, 20)).unwrap_err();
    assert!(matches!(err, TensorPackError::OutOfBounds { offset: 10, length: 20, file_length: 25, .. }));
}

#[test]
fn region_inside_file_returns_exact_bytes() {
    let dir = model_dir(30);
    for use_mmap in [true, false] {
        let codec = TensorCodec::new(CodecConfig { use_mmap, ..Default::default() }).with_base_dir(dir.path());
        let loaded = codec.load_external(&external_u8(10, 20)).unwrap();
        assert_eq!(loaded.bytes.len(), 20);
        assert_eq!(&loaded.bytes[..], (10u8..30).collect::<Vec<_>>().as_slice());
        assert_eq!(loaded.bytes.is_mapped(), use_mmap);
    }
}

#[test]
fn negative_offset_is_out_of_bounds() {
    let dir = model_dir(30);
    let codec = TensorCodec::default().with_base_dir(dir.path());
    let err = codec.load_external(&external_u8(-1, 4)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let codec = TensorCodec::default().with_base_dir(dir.path());
    assert_eq!(codec.load_external(&external_u8(0, 4)).unwrap_err().kind(), ErrorKind::Io);
}

#[test]
fn recorded_length_must_match_shape() {
    let desc = TensorDescriptor::new("w", ElementType::Float, [4])
        .with_external(ExternalDataInfo::file("weights.bin", 0, 12));
    let err = resolve_external_data(&desc, Path::new("/models")).unwrap_err();
    assert!(err.to_string().contains("Computed size: 16, external_data.length: 12"));

    let unrecorded = TensorDescriptor::new("w", ElementType::Float, [4])
        .with_external(ExternalDataInfo::file("weights.bin", 8, 0));
    let resolved = resolve_external_data(&unrecorded, Path::new("/models")).unwrap();
    assert_eq!(resolved.byte_length, 16);
    assert_eq!(resolved.source, ResolvedSource::File { path: "/models/weights.bin".into(), offset: 8 });
    assert!(resolved.prepacked.is_none());
}

#[test]
fn string_tensors_cannot_be_external() {
    let desc = TensorDescriptor::new("s", ElementType::String, [1])
        .with_external(ExternalDataInfo::file("weights.bin", 0, 0));
    assert!(resolve_external_data(&desc, Path::new(".")).is_err());

    let inline = TensorDescriptor::new("w", ElementType::Float, [1]).with_raw(vec![0; 4]);
    assert!(resolve_external_data(&inline, Path::new(".")).is_err());
}

#[test]
fn prepacked_blobs_are_bounds_checked_independently() {
    let dir = model_dir(30);
    let codec = TensorCodec::default().with_base_dir(dir.path());

    let mut info = ExternalDataInfo::file("weights.bin", 0, 4);
    info.prepacked.insert("gemm".into(), vec![BlobRegion { offset: 4, length: 2 }, BlobRegion { offset: 20, length: 3 }]);
    info.prepacked.insert("unused".into(), Vec::new());
    let desc = TensorDescriptor::new("w", ElementType::Uint8, [4]).with_external(info.clone());

    let loaded = codec.load_external(&desc).unwrap();
    assert_eq!(&loaded.bytes[..], &[0, 1, 2, 3]);
    assert_eq!(loaded.prepacked.len(), 1);
    let gemm = &loaded.prepacked["gemm"];
    assert_eq!(&gemm[0][..], &[4, 5]);
    assert_eq!(&gemm[1][..], &[20, 21, 22]);

    info.prepacked.insert("bad".into(), vec![BlobRegion { offset: 28, length: 4 }]);
    let desc = TensorDescriptor::new("w", ElementType::Uint8, [4]).with_external(info);
    assert_eq!(codec.load_external(&desc).unwrap_err().kind(), ErrorKind::OutOfBounds);
}

#[test]
fn external_floats_decode_and_inline() {
    let dir = TempDir::new().unwrap();
    let values = [1.0f32, -2.0, 0.5];
    let mut bytes = vec![0xAAu8; 8];
    bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    fs::write(dir.path().join("weights.bin"), &bytes).unwrap();

    let codec = TensorCodec::default().with_base_dir(dir.path());
    let desc = TensorDescriptor::new("w", ElementType::Float, [3])
        .with_external(ExternalDataInfo::file("weights.bin", 8, 12));

    let mut out = [0f32; 3];
    codec.unpack(&desc, &mut out, 3).unwrap();
    assert_eq!(out, values);

    let tensor = codec.descriptor_to_tensor(&desc).unwrap();
    assert_eq!(tensor.to_vec::<f32>().unwrap(), values);

    let inline = codec.external_to_inline(&desc).unwrap();
    assert_eq!(inline.name, "w");
    assert_eq!(inline.raw_data().unwrap(), &bytes[8..]);
    assert!(codec.in_memory_to_inline(&desc).unwrap().is_none());
}

#[test]
fn zero_length_region_reads_nothing() {
    let dir = model_dir(4);
    let codec = TensorCodec::default().with_base_dir(dir.path());
    let desc = TensorDescriptor::new("w", ElementType::Float, [0])
        .with_external(ExternalDataInfo::file("weights.bin", 4, 0));
    let loaded = codec.load_external(&desc).unwrap();
    assert!(loaded.bytes.is_empty());
}

#[test]
fn parsed_memory_address_is_rejected_by_default() {
    let info = ExternalDataInfo::from_entries(&[
        ("location", "*/_ORT_MEM_ADDR_/*"),
        ("offset", "16"),
        ("length", "4"),
    ])
    .unwrap();
    let desc = TensorDescriptor::new("w", ElementType::Uint8, [4]).with_external(info);
    let codec = TensorCodec::default();
    assert!(!codec.in_process_refs_allowed());

    for err in [
        codec.descriptor_to_tensor(&desc).unwrap_err(),
        codec.unpack_initializer_data(&desc).unwrap_err(),
        codec.external_to_inline(&desc).unwrap_err(),
        codec.load_external(&desc).unwrap_err(),
        codec.in_memory_to_inline(&desc).unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("in-process references are disabled"));
    }
    let mut out = [0u8; 4];
    assert!(codec.unpack(&desc, &mut out, 4).is_err());
}
