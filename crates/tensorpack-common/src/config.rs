//! Codec and planner configuration with TOML, environment variable, and
//! default config sources.

use std::path::Path;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::size::ALLOC_ALIGNMENT;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── CodecConfig ─────────────────────────────────────────────────────

/// Options for decoding and encoding tensor descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Try memory-mapping external files before falling back to buffered reads.
    pub use_mmap: bool,
    /// Tensors strictly larger than this many bytes may be packed as
    /// in-process references instead of copied.
    pub small_tensor_threshold: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { use_mmap: true, small_tensor_threshold: 127 }
    }
}

impl CodecConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Override fields from `TENSORPACK_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("TENSORPACK_USE_MMAP") {
            self.use_mmap = parse_env_bool("TENSORPACK_USE_MMAP", &v)?;
        }
        if let Ok(v) = env::var("TENSORPACK_SMALL_TENSOR_THRESHOLD") {
            self.small_tensor_threshold = parse_env_u64("TENSORPACK_SMALL_TENSOR_THRESHOLD", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if i64::try_from(self.small_tensor_threshold).is_err() {
            return Err(ConfigError::Validation(format!(
                "small_tensor_threshold {} does not fit in a signed 64-bit offset",
                self.small_tensor_threshold
            )));
        }
        Ok(())
    }
}

// ── PlannerConfig ───────────────────────────────────────────────────

/// Options for the arena planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Byte alignment applied to every traced size. `0` disables rounding.
    pub alignment: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { alignment: ALLOC_ALIGNMENT }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Override fields from `TENSORPACK_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("TENSORPACK_PLANNER_ALIGNMENT") {
            self.alignment = parse_env_usize("TENSORPACK_PLANNER_ALIGNMENT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alignment != 0 && !self.alignment.is_power_of_two() {
            return Err(ConfigError::Validation(format!(
                "alignment must be 0 or a power of two, got {}",
                self.alignment
            )));
        }
        Ok(())
    }
}

// ── TensorPackConfig ────────────────────────────────────────────────

/// Combined configuration, stored as `[codec]` and `[planner]` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorPackConfig {
    pub codec: CodecConfig,
    pub planner: PlannerConfig,
}

impl TensorPackConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// If the file does not exist, returns `Ok(Self::default())`.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config file not found: {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build a config from `TENSORPACK_*` environment vars merged on defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self { codec: CodecConfig::from_env()?, planner: PlannerConfig::from_env()? })
    }

    /// Load from `path`, then apply any `TENSORPACK_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = Self::from_toml(path)?;
        cfg.codec.apply_env()?;
        cfg.planner.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.codec.validate()?;
        self.planner.validate()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_env_usize(key: &str, val: &str) -> Result<usize, ConfigError> {
    val.parse::<usize>()
        .map_err(|_| ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() })
}

fn parse_env_u64(key: &str, val: &str) -> Result<u64, ConfigError> {
    val.parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() })
}

fn parse_env_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() }),
    }
}
