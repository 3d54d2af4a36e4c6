//! Snapshot tests pinning user-visible error messages.

use tensorpack_common::{ConfigError, ElementType, ErrorKind, TensorPackError};

#[test]
fn type_mismatch_message() {
    let e = TensorPackError::TypeMismatch { expected: ElementType::Float, actual: ElementType::BFloat16 };
    insta::assert_snapshot!(e.to_string(), @"Type mismatch: descriptor holds bfloat16, destination expects float");
}

#[test]
fn corruption_message() {
    let e = TensorPackError::DataCorruption { name: "weight".into(), expected: 6, actual: 4 };
    insta::assert_snapshot!(
        e.to_string(),
        @"Corrupted data in 'weight': tensor shape size (6) does not match the data size (4)"
    );
}

#[test]
fn out_of_bounds_message() {
    let e = TensorPackError::OutOfBounds { name: "w".into(), offset: 10, length: 20, file_length: 25 };
    insta::assert_snapshot!(
        e.to_string(),
        @"External data for 'w' out of bounds: offset 10, length 20, file length 25"
    );
    assert_eq!(e.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn sparse_index_message() {
    let e = TensorPackError::IndexOutOfBounds { name: "values".into(), index: 7, dense_len: 6 };
    insta::assert_snapshot!(e.to_string(), @"Sparse index 7 of 'values' out of bounds for 6 dense elements");
    assert_eq!(e.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn data_overflow_message() {
    let e = TensorPackError::DataOverflow { value: 65536, bits: 16 };
    insta::assert_snapshot!(e.to_string(), @"Data overflow: value 65536 does not fit in 16 bits");
}

#[test]
fn config_error_wraps() {
    let e: TensorPackError = ConfigError::Validation("alignment must be 0 or a power of two, got 3".into()).into();
    assert_eq!(e.kind(), ErrorKind::Config);
    insta::assert_snapshot!(
        e.to_string(),
        @"Configuration error: validation error: alignment must be 0 or a power of two, got 3"
    );
}

#[test]
fn error_kind_display() {
    let all = [
        ErrorKind::InvalidArgument,
        ErrorKind::SizeOverflow,
        ErrorKind::DataCorruption,
        ErrorKind::OutOfBounds,
        ErrorKind::NotImplemented,
        ErrorKind::InternalUsage,
        ErrorKind::Io,
        ErrorKind::Config,
    ];
    let joined = all.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    insta::assert_snapshot!(
        joined,
        @"invalid argument, size overflow, data corruption, out of bounds, not implemented, internal usage error, io, config"
    );
}
