//! Device memory locations that own an arena.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Cpu,
    Cuda(usize),
    Metal,
}

/// Kind of memory on a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    Default,
    /// Device memory the host can read directly.
    HostAccessible,
}

/// A place tensors can be allocated. Each location gets at most one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceLocation {
    pub device: DeviceType,
    #[serde(default)]
    pub memory: MemoryKind,
}

impl DeviceLocation {
    pub const fn new(device: DeviceType, memory: MemoryKind) -> Self {
        Self { device, memory }
    }

    pub const fn cpu() -> Self {
        Self::new(DeviceType::Cpu, MemoryKind::Default)
    }

    pub const fn cuda(ordinal: usize) -> Self {
        Self::new(DeviceType::Cuda(ordinal), MemoryKind::Default)
    }
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            DeviceType::Cpu => f.write_str("cpu")?,
            DeviceType::Cuda(i) => write!(f, "cuda:{i}")?,
            DeviceType::Metal => f.write_str("metal")?,
        }
        if self.memory == MemoryKind::HostAccessible {
            f.write_str(" (host accessible)")?;
        }
        Ok(())
    }
}
