//! # Configuration Management
//!
//! Handles all configuration for vecstash components. Every section has a
//! `Default`, so a TOML file only needs the keys it overrides:
//!
//! ```toml
//! [store]
//! dimension = 1024
//! metric = "cosine"
//! data_dir = "./data"
//!
//! [store.placement]
//! threshold_bytes = 2048
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ContentPolicy, DistanceMetric};

/// Overrides the configured data directory.
pub const ENV_DATA_DIR: &str = "VECSTASH_DATA_DIR";
/// Overrides the configured embedding dimension.
pub const ENV_DIMENSION: &str = "VECSTASH_DIMENSION";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ingestion: IngestionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Configuration {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config found at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(Error::Io {
                message: format!("Failed to read config {}", path.display()),
                source: err,
            }),
        }
    }

    /// Apply `VECSTASH_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                self.store.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(dim) = std::env::var(ENV_DIMENSION) {
            self.store.dimension = dim.parse().map_err(|_| Error::Configuration {
                message: format!("{} must be a positive integer, got {:?}", ENV_DIMENSION, dim),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.ingestion.validate()
    }
}

/// Store configuration. Immutable for the lifetime of a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub content_policy: ContentPolicy,
    pub placement: PlacementConfig,
    /// `None` keeps the store purely in memory.
    pub data_dir: Option<PathBuf>,
    pub journal: JournalConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: 384, // all-MiniLM-L6-v2
            metric: DistanceMetric::Cosine,
            content_policy: ContentPolicy::Required,
            placement: PlacementConfig::default(),
            data_dir: None,
            journal: JournalConfig::default(),
        }
    }
}

impl StoreConfig {
    /// In-memory store with the given shape.
    pub fn new(dimension: usize, metric: DistanceMetric, threshold_bytes: usize) -> Self {
        Self {
            dimension,
            metric,
            placement: PlacementConfig {
                threshold_bytes,
                ..PlacementConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Configuration {
                message: "dimension must be positive".into(),
            });
        }
        self.placement.validate()
    }
}

/// Inline/overflow placement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Embeddings larger than this many bytes go to an overflow segment.
    pub threshold_bytes: usize,
    /// Physical size at which the open segment rolls over.
    pub segment_capacity: usize,
    /// A segment is compacted once live bytes / physical bytes drops below this.
    pub compaction_ratio: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 2048,
            segment_capacity: 8 * 1024 * 1024, // 8MB
            compaction_ratio: 0.5,
        }
    }
}

impl PlacementConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold_bytes == 0 {
            return Err(Error::Configuration {
                message: "placement.threshold_bytes must be positive".into(),
            });
        }
        if self.segment_capacity == 0 {
            return Err(Error::Configuration {
                message: "placement.segment_capacity must be positive".into(),
            });
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(Error::Configuration {
                message: format!(
                    "placement.compaction_ratio must be in (0, 1], got {}",
                    self.compaction_ratio
                ),
            });
        }
        Ok(())
    }
}

/// Journal (write-ahead log) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// fsync after every committed batch.
    pub sync_on_commit: bool,
    pub buffer_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            buffer_size: 64 * 1024, // 64KB
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Records per atomic batch commit.
    pub batch_size: usize,
    /// Built-in embedder: `hashing` or `noop`.
    pub model_name: String,
    /// Default number of hits for a search.
    pub top_k: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            model_name: "hashing".to_string(),
            top_k: 5,
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration {
                message: "ingestion.batch_size must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
