//! Filesystem access used to load external tensor data.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

/// A read-only mapped file region.
pub struct MappedRegion {
    mmap: Mmap,
}

impl MappedRegion {
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion").field("len", &self.mmap.len()).finish()
    }
}

/// Bytes loaded from an external file, either mapped or copied.
#[derive(Debug)]
pub enum ExternalBytes {
    Mapped(MappedRegion),
    Owned(Vec<u8>),
}

impl ExternalBytes {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Self::Mapped(m) => m.as_slice().to_vec(),
            Self::Owned(v) => v,
        }
    }
}

impl Deref for ExternalBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m.as_slice(),
            Self::Owned(v) => v,
        }
    }
}

impl AsRef<[u8]> for ExternalBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Filesystem operations needed by the external blob resolver.
pub trait Env: Send + Sync {
    /// Size of the file at `path`, read from the filesystem.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Map `[offset, offset + length)` of `path` read-only.
    fn map_file_into_memory(&self, path: &Path, offset: u64, length: usize) -> io::Result<MappedRegion>;

    /// Read `dest.len()` bytes of `path` starting at `offset`.
    fn read_file_into_buffer(&self, path: &Path, offset: u64, dest: &mut [u8]) -> io::Result<()>;
}

/// [`Env`] backed by `std::fs` and `memmap2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnv;

impl Env for DefaultEnv {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn map_file_into_memory(&self, path: &Path, offset: u64, length: usize) -> io::Result<MappedRegion> {
        if length == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot map an empty region"));
        }
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and owned by the returned region.
        // Files backing model weights are not expected to be truncated while
        // mapped; memmap2 aligns the offset to the page size internally.
        let mmap = unsafe { MmapOptions::new().offset(offset).len(length).map(&file)? };
        Ok(MappedRegion { mmap })
    }

    fn read_file_into_buffer(&self, path: &Path, offset: u64, dest: &mut [u8]) -> io::Result<()> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_file() -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&(0u8..32).collect::<Vec<_>>()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn map_region_at_offset() {
        let f = sample_file();
        let region = DefaultEnv.map_file_into_memory(f.path(), 10, 5).unwrap();
        assert_eq!(region.as_slice(), &[10, 11, 12, 13, 14]);
    }

    #[test]
    fn buffered_read_at_offset() {
        let f = sample_file();
        let mut buf = [0u8; 4];
        DefaultEnv.read_file_into_buffer(f.path(), 28, &mut buf).unwrap();
        assert_eq!(buf, [28, 29, 30, 31]);

        let mut too_long = [0u8; 8];
        assert!(DefaultEnv.read_file_into_buffer(f.path(), 28, &mut too_long).is_err());
    }

    #[test]
    fn file_size_reads_metadata() {
        let f = sample_file();
        assert_eq!(DefaultEnv.file_size(f.path()).unwrap(), 32);
    }
}
