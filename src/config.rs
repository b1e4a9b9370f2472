//! Configuration for the vector database.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VDB_` and use double
//! underscores to separate nested levels:
//! - `VDB_STORAGE__PATH=/var/lib/vdb` sets `storage.path`
//! - `VDB_SEARCH__DEFAULT_K=10` sets `search.default_k`
//! - `VDB_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::VdbError;

/// Default config file name looked up by [`Settings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "vectoria.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Collection file storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Nearest-neighbour search tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory holding every collection's `.bin`, `_meta.bin` and `.json`
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Neighbours returned when a query asks for `k = 0`
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Fraction of the per-axis bounding-box extent within which the far
    /// subtree of a node is still visited
    #[serde(default = "default_pruning_factor")]
    pub pruning_factor: f64,

    /// Worker threads per query
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Candidates that may wait in a query's work queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_storage_path() -> PathBuf {
    PathBuf::from("collections")
}
fn default_k() -> usize {
    3
}
fn default_pruning_factor() -> f64 {
    0.1
}
fn default_workers() -> usize {
    num_cpus::get()
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            pruning_factor: default_pruning_factor(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from `vectoria.toml` in the current directory,
    /// defaults and environment
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("VDB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Settings with defaults and a custom storage root.
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        let mut settings = Self::default();
        settings.storage.path = path.into();
        settings
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), VdbError> {
        if self.search.default_k == 0 {
            return Err(VdbError::Config(
                "search.default_k must be at least 1".to_string(),
            ));
        }
        if self.search.pruning_factor.is_nan() || self.search.pruning_factor < 0.0 {
            return Err(VdbError::Config(format!(
                "search.pruning_factor must be >= 0, got {}",
                self.search.pruning_factor
            )));
        }
        if self.search.queue_capacity == 0 {
            return Err(VdbError::Config(
                "search.queue_capacity must be at least 1".to_string(),
            ));
        }
        if crate::logging::parse_level(&self.logging.level).is_none() {
            return Err(VdbError::Config(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }
        Ok(())
    }
}
