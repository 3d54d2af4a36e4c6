//! Initializer materialization.
//!
//! Plans one arena per device location for every initializer, then decodes
//! each descriptor straight into its planned sub-buffer. String tensors and
//! initializers excluded from planning get their own storage.

use std::collections::HashMap;
use std::sync::Arc;

use tensorpack_codec::{DefaultEnv, Env, TensorCodec, TensorDescriptor};
use tensorpack_common::{Result, Tensor, TensorPackConfig, TensorPackError, TensorShape};
use tensorpack_planner::{
    Allocator, ArenaBuffer, ArenaPlanner, BufferLookup, DeviceLocation, MemoryBlock, TensorId,
};
use tracing::{debug, info};

/// An initializer to load.
#[derive(Debug, Clone)]
pub struct Initializer {
    pub id: TensorId,
    pub location: DeviceLocation,
    pub descriptor: TensorDescriptor,
    /// Whether the tensor is laid out in the shared arena. Unplanned
    /// tensors are allocated individually.
    pub planned: bool,
}

impl Initializer {
    pub fn new(id: TensorId, location: DeviceLocation, descriptor: TensorDescriptor) -> Self {
        Self { id, location, descriptor, planned: true }
    }

    #[must_use]
    pub fn unplanned(mut self) -> Self {
        self.planned = false;
        self
    }
}

/// Where a loaded initializer's data lives.
#[derive(Debug)]
pub enum InitializerStorage {
    /// A block of the location's arena. `len` is the unpadded byte size
    /// at the start of the block.
    Arena { location: DeviceLocation, block: MemoryBlock, len: usize },
    /// A zero-byte tensor with no backing memory.
    Empty,
    /// A private allocation from the location's allocator. The allocator
    /// may hand out more than `len` bytes.
    Private { buffer: ArenaBuffer, len: usize },
    /// String tensors own their elements.
    Strings(Tensor),
}

/// A loaded initializer.
#[derive(Debug)]
pub struct LoadedInitializer {
    pub id: TensorId,
    pub descriptor_name: String,
    pub shape: TensorShape,
    pub storage: InitializerStorage,
}

/// Initializers loaded into planned arenas. Borrowed views stay valid as
/// long as the set is alive.
#[derive(Debug)]
pub struct InitializerSet {
    planner: ArenaPlanner,
    entries: Vec<LoadedInitializer>,
    by_name: HashMap<String, usize>,
}

impl InitializerSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn planner(&self) -> &ArenaPlanner {
        &self.planner
    }

    pub fn get(&self, name: &str) -> Option<&LoadedInitializer> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedInitializer> {
        self.entries.iter()
    }

    /// Host-order bytes of a numeric initializer.
    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        let entry = self.get(name).ok_or_else(|| TensorPackError::invalid(format!("unknown initializer '{name}'")))?;
        match &entry.storage {
            InitializerStorage::Arena { location, block, len } => {
                let arena = self.planner.arena(location)?.as_slice();
                arena
                    .get(block.offset..block.offset + (*len).min(block.size))
                    .ok_or_else(|| TensorPackError::usage(format!("initializer '{name}' lies outside its arena")))
            }
            InitializerStorage::Empty => Ok(&[]),
            InitializerStorage::Private { buffer, len } => buffer
                .as_slice()
                .get(..*len)
                .ok_or_else(|| TensorPackError::usage(format!("initializer '{name}' outlives its buffer"))),
            InitializerStorage::Strings(_) => {
                Err(TensorPackError::invalid(format!("initializer '{name}' holds strings")))
            }
        }
    }

    /// Strings of a string initializer.
    pub fn strings(&self, name: &str) -> Result<&[String]> {
        match self.get(name).map(|e| &e.storage) {
            Some(InitializerStorage::Strings(t)) => t
                .strings()
                .ok_or_else(|| TensorPackError::invalid(format!("initializer '{name}' holds no strings"))),
            Some(_) => Err(TensorPackError::invalid(format!("initializer '{name}' is not a string tensor"))),
            None => Err(TensorPackError::invalid(format!("unknown initializer '{name}'"))),
        }
    }
}

/// Loads initializers through a [`TensorCodec`] into arenas planned by an
/// [`ArenaPlanner`].
#[derive(Debug)]
pub struct InitializerLoader<E: Env = DefaultEnv> {
    codec: TensorCodec<E>,
    planner: ArenaPlanner,
}

impl InitializerLoader<DefaultEnv> {
    pub fn new(config: &TensorPackConfig) -> Self {
        Self::with_codec(TensorCodec::new(config.codec.clone()), ArenaPlanner::new(config.planner.clone()))
    }
}

impl<E: Env> InitializerLoader<E> {
    pub fn with_codec(codec: TensorCodec<E>, planner: ArenaPlanner) -> Self {
        Self { codec, planner }
    }

    pub fn codec(&self) -> &TensorCodec<E> {
        &self.codec
    }

    pub fn register_allocator(&mut self, allocator: Arc<dyn Allocator>) -> Result<()> {
        self.planner.register_allocator(allocator)
    }

    /// Trace, finalize and decode every initializer.
    pub fn load(self, initializers: &[Initializer]) -> Result<InitializerSet> {
        let Self { codec, mut planner } = self;

        for init in initializers {
            if init.planned && !init.descriptor.data_type.is_string() {
                planner.trace(init.id, init.location, &init.descriptor)?;
            }
        }
        let planned = planner.finalize()?;
        info!(locations = planned.len(), initializers = initializers.len(), "initializer arenas planned");

        let mut entries = Vec::with_capacity(initializers.len());
        let mut by_name = HashMap::with_capacity(initializers.len());
        for init in initializers {
            let storage = materialize(&codec, &mut planner, init)?;
            let desc = &init.descriptor;
            if by_name.insert(desc.name.clone(), entries.len()).is_some() {
                return Err(TensorPackError::invalid(format!("duplicate initializer name '{}'", desc.name)));
            }
            entries.push(LoadedInitializer {
                id: init.id,
                descriptor_name: desc.name.clone(),
                shape: desc.shape(),
                storage,
            });
        }

        Ok(InitializerSet { planner, entries, by_name })
    }
}

fn materialize<E: Env>(codec: &TensorCodec<E>, planner: &mut ArenaPlanner, init: &Initializer) -> Result<InitializerStorage> {
    let desc = &init.descriptor;
    if desc.data_type.is_string() {
        debug!(name = %desc.name, "decoding string initializer");
        return Ok(InitializerStorage::Strings(codec.descriptor_to_tensor(desc)?));
    }

    if !init.planned {
        let allocator = planner.allocator(&init.location)?;
        return private_copy(codec, allocator.as_ref(), desc);
    }

    let block = planner.block(init.id, &init.location)?;
    match planner.get_buffer_mut(init.id, &init.location)? {
        BufferLookup::Planned(buf) => {
            let len = codec.descriptor_into_buffer(desc, buf)?;
            let block = block.ok_or_else(|| TensorPackError::usage(format!("no block planned for '{}'", desc.name)))?;
            Ok(InitializerStorage::Arena { location: init.location, block, len })
        }
        BufferLookup::Empty => {
            // decode anyway so malformed payloads are still reported
            codec.descriptor_into_buffer(desc, &mut [])?;
            Ok(InitializerStorage::Empty)
        }
        BufferLookup::NotTraced(allocator) => private_copy(codec, allocator.as_ref(), desc),
    }
}

fn private_copy<E: Env>(codec: &TensorCodec<E>, allocator: &dyn Allocator, desc: &TensorDescriptor) -> Result<InitializerStorage> {
    let size = desc.byte_size(0)?;
    let mut buffer = allocator.alloc(size)?;
    let len = codec.descriptor_into_buffer(desc, buffer.as_mut_slice())?;
    debug!(name = %desc.name, size, location = %allocator.location(), "allocated private initializer");
    Ok(InitializerStorage::Private { buffer, len })
}
