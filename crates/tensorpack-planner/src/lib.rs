//! Arena memory planning for initializer tensors
//!
//! Initializers are traced with their aligned byte sizes, laid out into one
//! contiguous arena per device location, and served as sub-buffers once
//! the plan is finalized.

pub mod allocator;
pub mod block_planner;
pub mod location;
pub mod pattern;
pub mod planner;

pub use allocator::{Allocator, ArenaBuffer, CpuAllocator};
pub use block_planner::{BlockPlanner, MemPatternPlanner};
pub use location::{DeviceLocation, DeviceType, MemoryKind};
pub use pattern::{MemoryBlock, MemoryPattern, MemoryPatternGroup, TensorId};
pub use planner::{ArenaPlanner, BufferLookup, PlannerState};
