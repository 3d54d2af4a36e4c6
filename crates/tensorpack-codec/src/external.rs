//! External tensor data: reference metadata, resolution against a base
//! directory, and bounds-checked loading through an [`Env`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tensorpack_common::{ElementType, Result, TensorPackError};
use tracing::{debug, warn};

use crate::descriptor::TensorDescriptor;
use crate::env::{Env, ExternalBytes};

/// Location value marking data that lives in process memory, with the
/// offset holding the address.
pub const MEMORY_ADDRESS_TAG: &str = "*/_ORT_MEM_ADDR_/*";

const PREPACKED_PREFIX: &str = "prepacked:";

/// A byte range inside the external file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRegion {
    pub offset: i64,
    pub length: usize,
}

/// Pre-packed blob regions keyed by name.
pub type PrepackedBlobs = BTreeMap<String, Vec<BlobRegion>>;

/// Where external bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalLocation {
    /// A region of a file relative to the model directory. A `length` of 0
    /// means no length was recorded.
    File { path: PathBuf, offset: i64, length: usize },
    /// A region of the current process' memory.
    InProcess { address: usize, length: usize },
}

/// External-reference metadata attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataInfo {
    pub location: ExternalLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prepacked: PrepackedBlobs,
}

impl ExternalDataInfo {
    pub fn file(path: impl Into<PathBuf>, offset: i64, length: usize) -> Self {
        Self {
            location: ExternalLocation::File { path: path.into(), offset, length },
            checksum: None,
            prepacked: PrepackedBlobs::new(),
        }
    }

    pub fn in_process(address: usize, length: usize) -> Self {
        Self {
            location: ExternalLocation::InProcess { address, length },
            checksum: None,
            prepacked: PrepackedBlobs::new(),
        }
    }

    /// Length recorded in the metadata, 0 when absent.
    pub fn recorded_length(&self) -> usize {
        match self.location {
            ExternalLocation::File { length, .. } | ExternalLocation::InProcess { length, .. } => length,
        }
    }

    /// Parse the serialized key/value entry list.
    ///
    /// Recognised keys are `location`, `offset`, `length`, `checksum` and
    /// `prepacked:<key>` whose value is `offset;length` pairs joined by `|`.
    pub fn from_entries<K: AsRef<str>, V: AsRef<str>>(entries: &[(K, V)]) -> Result<Self> {
        let mut location = None;
        let mut offset: i64 = 0;
        let mut length: usize = 0;
        let mut checksum = None;
        let mut prepacked = PrepackedBlobs::new();

        for (key, value) in entries {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "location" => location = Some(value.to_string()),
                "offset" => offset = parse_number(key, value)?,
                "length" => length = parse_number(key, value)?,
                "checksum" => checksum = Some(value.to_string()),
                _ => {
                    let Some(blob_key) = key.strip_prefix(PREPACKED_PREFIX) else {
                        return Err(TensorPackError::invalid(format!(
                            "unknown external data key: {key}"
                        )));
                    };
                    prepacked.insert(blob_key.to_string(), parse_blob_list(blob_key, value)?);
                }
            }
        }

        let location = location
            .filter(|l| !l.is_empty())
            .ok_or_else(|| TensorPackError::invalid("external data is missing a location"))?;

        let location = if location == MEMORY_ADDRESS_TAG {
            let address = usize::try_from(offset).map_err(|_| {
                TensorPackError::invalid(format!("in-process address {offset} is not a valid pointer"))
            })?;
            ExternalLocation::InProcess { address, length }
        } else {
            ExternalLocation::File { path: PathBuf::from(location), offset, length }
        };

        Ok(Self { location, checksum, prepacked })
    }

    /// Emit the serialized key/value entry list.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(4 + self.prepacked.len());
        let (location, offset, length) = match &self.location {
            ExternalLocation::File { path, offset, length } => {
                (path.to_string_lossy().into_owned(), offset.to_string(), *length)
            }
            ExternalLocation::InProcess { address, length } => {
                (MEMORY_ADDRESS_TAG.to_string(), address.to_string(), *length)
            }
        };
        out.push(("location".to_string(), location));
        out.push(("offset".to_string(), offset));
        out.push(("length".to_string(), length.to_string()));
        if let Some(checksum) = &self.checksum {
            out.push(("checksum".to_string(), checksum.clone()));
        }
        for (key, blobs) in &self.prepacked {
            let value = blobs
                .iter()
                .map(|b| format!("{};{}", b.offset, b.length))
                .collect::<Vec<_>>()
                .join("|");
            out.push((format!("{PREPACKED_PREFIX}{key}"), value));
        }
        out
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TensorPackError::invalid(format!("parsing {key} failed: {value:?}")))
}

fn parse_blob_list(key: &str, value: &str) -> Result<Vec<BlobRegion>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split('|')
        .map(|pair| {
            let (offset, length) = pair.split_once(';').ok_or_else(|| {
                TensorPackError::invalid(format!("pre-packed blob {key}: malformed entry {pair:?}"))
            })?;
            Ok(BlobRegion { offset: parse_number(key, offset)?, length: parse_number(key, length)? })
        })
        .collect()
}

// ── Resolution ──────────────────────────────────────────────────────

/// Resolved source of external bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    File { path: PathBuf, offset: i64 },
    InProcess { address: usize },
}

/// Result of [`resolve_external_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExternal {
    pub source: ResolvedSource,
    /// Byte length computed from the descriptor's shape and type.
    pub byte_length: usize,
    /// Present only when the descriptor declares pre-packed blobs.
    pub prepacked: Option<PrepackedBlobs>,
}

/// Resolve a descriptor's external reference against `base_dir`.
///
/// The byte length is computed from dims and type and cross-checked with
/// any recorded length. In-process references skip all path handling.
pub fn resolve_external_data(desc: &TensorDescriptor, base_dir: &Path) -> Result<ResolvedExternal> {
    let info = desc.external_data().ok_or_else(|| {
        TensorPackError::invalid(format!("tensor '{}' does not have external data to read from", desc.name))
    })?;
    if matches!(desc.data_type, ElementType::Undefined | ElementType::String) {
        return Err(TensorPackError::invalid(format!(
            "external data type of '{}' cannot be UNDEFINED or STRING",
            desc.name
        )));
    }

    let byte_length = desc.byte_size(0)?;
    let recorded = info.recorded_length();
    if recorded != 0 && recorded != byte_length {
        return Err(TensorPackError::invalid(format!(
            "tensor '{}' external data size mismatch. Computed size: {byte_length}, external_data.length: {recorded}",
            desc.name
        )));
    }

    let source = match &info.location {
        ExternalLocation::File { path, offset, .. } => {
            ResolvedSource::File { path: base_dir.join(path), offset: *offset }
        }
        ExternalLocation::InProcess { address, .. } => ResolvedSource::InProcess { address: *address },
    };
    let prepacked = (!info.prepacked.is_empty()).then(|| info.prepacked.clone());

    Ok(ResolvedExternal { source, byte_length, prepacked })
}

// ── Loading ─────────────────────────────────────────────────────────

/// Bytes of an externally stored tensor plus any pre-packed blobs.
#[derive(Debug)]
pub struct LoadedExternal {
    pub bytes: ExternalBytes,
    pub prepacked: BTreeMap<String, Vec<ExternalBytes>>,
}

fn check_region(name: &str, offset: i64, length: usize, file_length: u64) -> Result<u64> {
    let out_of_bounds = || TensorPackError::OutOfBounds {
        name: name.to_string(),
        offset,
        length,
        file_length,
    };
    let start = u64::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(length as u64).ok_or_else(out_of_bounds)?;
    if end > file_length {
        return Err(out_of_bounds());
    }
    Ok(start)
}

/// Read `[offset, offset + length)`, mapping first when `use_mmap` is set
/// and falling back to a buffered read if mapping fails.
pub fn read_file_content<E: Env + ?Sized>(
    env: &E,
    path: &Path,
    offset: u64,
    length: usize,
    use_mmap: bool,
) -> Result<ExternalBytes> {
    if length == 0 {
        return Ok(ExternalBytes::Owned(Vec::new()));
    }
    if use_mmap {
        match env.map_file_into_memory(path, offset, length) {
            Ok(region) => {
                debug!(path = %path.display(), offset, length, "mapped external data");
                return Ok(ExternalBytes::Mapped(region));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "memory mapping failed; using buffered read");
            }
        }
    }
    let mut buf = vec![0u8; length];
    env.read_file_into_buffer(path, offset, &mut buf)?;
    debug!(path = %path.display(), offset, length, "read external data into buffer");
    Ok(ExternalBytes::Owned(buf))
}

/// Load the bytes of a resolved file reference.
///
/// The region and every pre-packed blob are checked against the file size
/// reported by `env` before anything is read.
pub fn load_file_region<E: Env + ?Sized>(
    env: &E,
    name: &str,
    path: &Path,
    offset: i64,
    resolved: &ResolvedExternal,
    use_mmap: bool,
) -> Result<LoadedExternal> {
    let file_length = env.file_size(path)?;
    let start = check_region(name, offset, resolved.byte_length, file_length)?;
    let bytes = read_file_content(env, path, start, resolved.byte_length, use_mmap)?;

    let mut prepacked = BTreeMap::new();
    if let Some(blobs) = &resolved.prepacked {
        for (key, regions) in blobs {
            let mut loaded = Vec::with_capacity(regions.len());
            for region in regions {
                let start = check_region(key, region.offset, region.length, file_length)?;
                loaded.push(read_file_content(env, path, start, region.length, use_mmap)?);
            }
            if !loaded.is_empty() {
                prepacked.insert(key.clone(), loaded);
            }
        }
    }

    Ok(LoadedExternal { bytes, prepacked })
}
