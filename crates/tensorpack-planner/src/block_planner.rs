//! Block planners turn traced allocations into memory patterns.

use std::collections::{BTreeMap, HashMap};

use tensorpack_common::{Result, TensorPackError};

use crate::location::DeviceLocation;
use crate::pattern::{MemoryBlock, MemoryPattern, MemoryPatternGroup, TensorId};

/// Records allocation requests and lays them out per location.
pub trait BlockPlanner {
    /// Record that `id` needs `size` bytes at `location`.
    fn trace_allocation(&mut self, id: TensorId, location: DeviceLocation, size: usize) -> Result<()>;

    /// Produce one pattern per traced location.
    fn generate_patterns(&self) -> Result<MemoryPatternGroup>;
}

/// Lays tensors out back to back in trace order.
///
/// Initializers live for the whole session, so blocks never overlap and
/// the peak is the sum of the traced sizes. Zero-sized tensors still get a
/// block of size 0 so they stay distinguishable from untraced ones.
#[derive(Debug, Default)]
pub struct MemPatternPlanner {
    locations: HashMap<DeviceLocation, Vec<(TensorId, usize)>>,
    traced: HashMap<TensorId, DeviceLocation>,
}

impl MemPatternPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traced_count(&self) -> usize {
        self.traced.len()
    }
}

impl BlockPlanner for MemPatternPlanner {
    fn trace_allocation(&mut self, id: TensorId, location: DeviceLocation, size: usize) -> Result<()> {
        if let Some(previous) = self.traced.get(&id) {
            return Err(TensorPackError::invalid(format!("tensor {id} already traced on {previous}")));
        }
        self.traced.insert(id, location);
        self.locations.entry(location).or_default().push((id, size));
        Ok(())
    }

    fn generate_patterns(&self) -> Result<MemoryPatternGroup> {
        let mut group = MemoryPatternGroup::default();
        for (location, requests) in &self.locations {
            let mut blocks = BTreeMap::new();
            let mut end = 0usize;
            for &(id, size) in requests {
                blocks.insert(id, MemoryBlock::new(end, size));
                end = end
                    .checked_add(size)
                    .ok_or_else(|| TensorPackError::overflow(format!("arena size on {location}")))?;
            }
            group.insert(*location, MemoryPattern::new(blocks, end));
        }
        Ok(group)
    }
}
