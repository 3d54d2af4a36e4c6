//! Arena planner for initializer tensors.
//!
//! Every initializer is traced with its byte size, then [`ArenaPlanner::finalize`]
//! reserves one arena per location and freezes the layout. After that the
//! planner is read-only and hands out sub-buffers of the arenas.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tensorpack_codec::TensorDescriptor;
use tensorpack_common::{PlannerConfig, Result, TensorPackError};
use tracing::{debug, info};

use crate::allocator::{Allocator, ArenaBuffer};
use crate::block_planner::{BlockPlanner, MemPatternPlanner};
use crate::location::DeviceLocation;
use crate::pattern::{MemoryBlock, MemoryPatternGroup, TensorId};

/// Lifecycle of an [`ArenaPlanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Tracing,
    Finalized,
}

/// Outcome of a buffer lookup after finalization.
#[derive(Debug)]
pub enum BufferLookup<B> {
    /// The tensor's sub-range of its location's arena.
    Planned(B),
    /// The tensor was traced with size 0; no arena memory backs it.
    Empty,
    /// The tensor was never traced. Allocate it privately with the
    /// location's allocator.
    NotTraced(Arc<dyn Allocator>),
}

impl<B> BufferLookup<B> {
    pub fn is_planned(&self) -> bool {
        matches!(self, Self::Planned(_))
    }
}

/// Plans and owns the arenas backing initializer tensors.
#[derive(Debug)]
pub struct ArenaPlanner<P: BlockPlanner = MemPatternPlanner> {
    config: PlannerConfig,
    allocators: HashMap<DeviceLocation, Arc<dyn Allocator>>,
    block_planner: P,
    state: PlannerState,
    patterns: MemoryPatternGroup,
    buffers: BTreeMap<DeviceLocation, ArenaBuffer>,
}

impl ArenaPlanner<MemPatternPlanner> {
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_block_planner(config, MemPatternPlanner::new())
    }
}

impl<P: BlockPlanner> ArenaPlanner<P> {
    pub fn with_block_planner(config: PlannerConfig, block_planner: P) -> Self {
        Self {
            config,
            allocators: HashMap::new(),
            block_planner,
            state: PlannerState::Tracing,
            patterns: MemoryPatternGroup::default(),
            buffers: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Register the allocator serving its location. One allocator per location.
    pub fn register_allocator(&mut self, allocator: Arc<dyn Allocator>) -> Result<()> {
        let location = allocator.location();
        if self.allocators.contains_key(&location) {
            return Err(TensorPackError::usage(format!("duplicated location {location}")));
        }
        self.allocators.insert(location, allocator);
        Ok(())
    }

    pub fn allocator(&self, location: &DeviceLocation) -> Result<Arc<dyn Allocator>> {
        self.allocators
            .get(location)
            .cloned()
            .ok_or_else(|| TensorPackError::invalid(format!("Failed to get allocator for location: {location}")))
    }

    /// Record `desc` as living at `location`. Its size is the descriptor's
    /// byte size rounded to the configured alignment.
    pub fn trace(&mut self, id: TensorId, location: DeviceLocation, desc: &TensorDescriptor) -> Result<()> {
        if self.state == PlannerState::Finalized {
            return Err(TensorPackError::usage(format!("cannot trace '{}' after finalize", desc.name)));
        }
        let size = desc.byte_size(self.config.alignment)?;
        debug!(id, name = %desc.name, %location, size, "tracing initializer");
        self.block_planner.trace_allocation(id, location, size)
    }

    /// Reserve one arena per location with a non-zero peak and freeze the
    /// layout. Returns the planned bytes per location.
    pub fn finalize(&mut self) -> Result<BTreeMap<DeviceLocation, usize>> {
        if self.state == PlannerState::Finalized {
            return Err(TensorPackError::usage("finalize called twice"));
        }
        let patterns = self.block_planner.generate_patterns()?;

        let mut buffers = BTreeMap::new();
        let mut planned = BTreeMap::new();
        for (location, pattern) in patterns.iter() {
            let peak = pattern.peak_size();
            if peak == 0 {
                continue;
            }
            let allocator = self.allocator(location)?;
            let buffer = allocator.reserve(peak)?;
            if buffer.len() < peak {
                return Err(TensorPackError::invalid(format!(
                    "allocator for {location} returned {} bytes, arena needs {peak}",
                    buffer.len()
                )));
            }
            if buffers.insert(*location, buffer).is_some() {
                return Err(TensorPackError::usage(format!("duplicated location {location}")));
            }
            planned.insert(*location, peak);
        }

        for (location, bytes) in &planned {
            info!(%location, bytes, "planned initializer arena");
        }
        self.buffers = buffers;
        self.patterns = patterns;
        self.state = PlannerState::Finalized;
        Ok(planned)
    }

    /// Patterns produced by [`finalize`](Self::finalize).
    pub fn memory_patterns(&self) -> Result<&MemoryPatternGroup> {
        self.ensure_finalized()?;
        Ok(&self.patterns)
    }

    /// Look up the block planned for `id` at `location`.
    pub fn block(&self, id: TensorId, location: &DeviceLocation) -> Result<Option<MemoryBlock>> {
        self.ensure_finalized()?;
        let pattern = self.patterns.pattern(location).ok_or_else(|| {
            TensorPackError::invalid(format!("memory pattern for tensor {id} not found on {location}"))
        })?;
        Ok(pattern.block(id).copied())
    }

    pub fn get_buffer(&self, id: TensorId, location: &DeviceLocation) -> Result<BufferLookup<&[u8]>> {
        self.ensure_finalized()?;
        let allocator = self.allocator(location)?;
        match self.block(id, location)? {
            None => Ok(BufferLookup::NotTraced(allocator)),
            Some(block) if block.size == 0 => Ok(BufferLookup::Empty),
            Some(block) => {
                let arena = self.arena(location)?;
                Ok(BufferLookup::Planned(&arena.as_slice()[block.offset..block.end()]))
            }
        }
    }

    pub fn get_buffer_mut(&mut self, id: TensorId, location: &DeviceLocation) -> Result<BufferLookup<&mut [u8]>> {
        self.ensure_finalized()?;
        let allocator = self.allocator(location)?;
        match self.block(id, location)? {
            None => Ok(BufferLookup::NotTraced(allocator)),
            Some(block) if block.size == 0 => Ok(BufferLookup::Empty),
            Some(block) => {
                let arena = self
                    .buffers
                    .get_mut(location)
                    .ok_or_else(|| TensorPackError::usage(format!("no arena reserved on {location}")))?;
                Ok(BufferLookup::Planned(&mut arena.as_mut_slice()[block.offset..block.end()]))
            }
        }
    }

    /// The arena reserved for `location`.
    pub fn arena(&self, location: &DeviceLocation) -> Result<&ArenaBuffer> {
        self.ensure_finalized()?;
        self.buffers.get(location).ok_or_else(|| TensorPackError::usage(format!("no arena reserved on {location}")))
    }

    fn ensure_finalized(&self) -> Result<()> {
        if self.state != PlannerState::Finalized {
            return Err(TensorPackError::usage("buffer requested before finalize"));
        }
        Ok(())
    }
}
