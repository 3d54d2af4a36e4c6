//! Allocator collaborator used to back each location's arena.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tensorpack_common::{Result, TensorPackError};
use tracing::debug;

use crate::location::DeviceLocation;

/// One allocation handed out by an [`Allocator`]. The planner owns it for
/// its whole lifetime.
pub struct ArenaBuffer {
    location: DeviceLocation,
    data: Box<[u8]>,
}

impl ArenaBuffer {
    pub fn new(location: DeviceLocation, data: Box<[u8]>) -> Self {
        Self { location, data }
    }

    pub fn location(&self) -> DeviceLocation {
        self.location
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaBuffer").field("location", &self.location).field("len", &self.data.len()).finish()
    }
}

/// Source of arena memory for one location.
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Location this allocator serves.
    fn location(&self) -> DeviceLocation;

    /// Allocate `size` bytes outside any arena growth policy. The planner
    /// calls this at most once per location.
    fn reserve(&self, size: usize) -> Result<ArenaBuffer>;

    /// Allocate `size` bytes for a single tensor the planner did not trace.
    fn alloc(&self, size: usize) -> Result<ArenaBuffer> {
        self.reserve(size)
    }
}

/// Zero-initialized host memory allocator.
#[derive(Debug, Default)]
pub struct CpuAllocator {
    location: Option<DeviceLocation>,
    reserved: AtomicU64,
    reserve_calls: AtomicU64,
}

impl CpuAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host allocator serving a non-CPU location, such as host-accessible
    /// device memory.
    pub fn for_location(location: DeviceLocation) -> Self {
        Self { location: Some(location), ..Self::default() }
    }

    /// Total bytes handed out through [`Allocator::reserve`].
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Number of [`Allocator::reserve`] calls.
    pub fn reserve_calls(&self) -> u64 {
        self.reserve_calls.load(Ordering::Relaxed)
    }
}

impl Allocator for CpuAllocator {
    fn location(&self) -> DeviceLocation {
        self.location.unwrap_or_else(DeviceLocation::cpu)
    }

    fn reserve(&self, size: usize) -> Result<ArenaBuffer> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|e| {
            TensorPackError::invalid(format!("failed to reserve {size} bytes on {}: {e}", self.location()))
        })?;
        data.resize(size, 0u8);
        self.reserved.fetch_add(size as u64, Ordering::Relaxed);
        self.reserve_calls.fetch_add(1, Ordering::Relaxed);
        debug!(location = %self.location(), size, "reserved arena buffer");
        Ok(ArenaBuffer::new(self.location(), data.into_boxed_slice()))
    }
}
