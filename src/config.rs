//! Configuration for AtlasRMS
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for an AtlasRMS registry
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── stores/          (one .rms blob per record store)
    pub data_dir: PathBuf,

    /// How hard a blob write pushes to disk before returning
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Capacity Configuration
    // -------------------------------------------------------------------------
    /// Total bytes the backend may hold across all record stores.
    /// Writes that would exceed it fail with `RmsError::Full`.
    pub capacity_bytes: u64,
}

/// Blob sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync the blob file and its directory after every replace (power-loss safe)
    Full,

    /// fsync the blob file only; the rename may be lost on power failure
    DataOnly,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasrms_data"),
            sync_strategy: SyncStrategy::Full,
            capacity_bytes: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the blob sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the backend capacity (in bytes)
    pub fn capacity_bytes(mut self, bytes: u64) -> Self {
        self.config.capacity_bytes = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
