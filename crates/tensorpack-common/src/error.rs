//! Error types shared by every tensorpack crate.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dtype::ElementType;

/// Coarse classification of a [`TensorPackError`].
///
/// Callers that only need to branch on the failure class (retry I/O, report a
/// malformed model, surface an API misuse) match on this instead of the
/// detailed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    SizeOverflow,
    DataCorruption,
    OutOfBounds,
    NotImplemented,
    InternalUsage,
    Io,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid argument",
            Self::SizeOverflow => "size overflow",
            Self::DataCorruption => "data corruption",
            Self::OutOfBounds => "out of bounds",
            Self::NotImplemented => "not implemented",
            Self::InternalUsage => "internal usage error",
            Self::Io => "io",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

/// Main error type for descriptor decoding, encoding and arena planning.
#[derive(Error, Debug)]
pub enum TensorPackError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type mismatch: descriptor holds {actual}, destination expects {expected}")]
    TypeMismatch { expected: ElementType, actual: ElementType },

    #[error("Size overflow: {context}")]
    SizeOverflow { context: String },

    #[error(
        "Corrupted data in '{name}': tensor shape size ({expected}) does not match the data size ({actual})"
    )]
    DataCorruption { name: String, expected: usize, actual: usize },

    #[error("Data overflow: value {value} does not fit in {bits} bits")]
    DataOverflow { value: i64, bits: u32 },

    #[error(
        "External data for '{name}' out of bounds: offset {offset}, length {length}, file length {file_length}"
    )]
    OutOfBounds { name: String, offset: i64, length: usize, file_length: u64 },

    #[error("Sparse index {index} of '{name}' out of bounds for {dense_len} dense elements")]
    IndexOutOfBounds { name: String, index: i64, dense_len: usize },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal usage error: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TensorPackError {
    /// Classify this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::TypeMismatch { .. } | Self::DataOverflow { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::SizeOverflow { .. } => ErrorKind::SizeOverflow,
            Self::DataCorruption { .. } => ErrorKind::DataCorruption,
            Self::OutOfBounds { .. } | Self::IndexOutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Usage(_) => ErrorKind::InternalUsage,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        Self::SizeOverflow { context: context.into() }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

/// Result type alias for tensorpack operations.
pub type Result<T> = std::result::Result<T, TensorPackError>;
