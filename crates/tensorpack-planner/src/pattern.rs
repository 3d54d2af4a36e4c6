//! Memory patterns: where each tensor lives inside a location's arena.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::location::DeviceLocation;

/// Index of a tensor value in the owning graph.
pub type TensorId = usize;

/// A sub-range of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub offset: usize,
    pub size: usize,
}

impl MemoryBlock {
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte.
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Block assignment for every traced tensor of one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPattern {
    blocks: BTreeMap<TensorId, MemoryBlock>,
    peak_size: usize,
}

impl MemoryPattern {
    pub fn new(blocks: BTreeMap<TensorId, MemoryBlock>, peak_size: usize) -> Self {
        Self { blocks, peak_size }
    }

    pub fn block(&self, id: TensorId) -> Option<&MemoryBlock> {
        self.blocks.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (TensorId, &MemoryBlock)> {
        self.blocks.iter().map(|(id, b)| (*id, b))
    }

    /// Bytes the arena must hold.
    pub fn peak_size(&self) -> usize {
        self.peak_size
    }
}

/// Patterns for every location that saw at least one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPatternGroup {
    patterns: BTreeMap<DeviceLocation, MemoryPattern>,
}

impl MemoryPatternGroup {
    pub fn insert(&mut self, location: DeviceLocation, pattern: MemoryPattern) -> Option<MemoryPattern> {
        self.patterns.insert(location, pattern)
    }

    pub fn pattern(&self, location: &DeviceLocation) -> Option<&MemoryPattern> {
        self.patterns.get(location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceLocation, &MemoryPattern)> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
