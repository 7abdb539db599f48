//! Storage configuration and path management for Fleet.
//!
//! All on-disk locations the engine reads or writes are derived from one
//! root directory (default `~/.fleet/`). Tests build a `StorageConfig` with
//! [`StorageConfig::with_root`] pointed at a temp directory.
//!
//! ```text
//! ~/.fleet/
//! ├── config.toml            # FleetConfig (optional)
//! ├── instances/*.json       # per-instance daemon metadata (written by daemons)
//! ├── cache/discovery.json   # cross-invocation discovery cache
//! └── logs/                  # fleetctl rolling logs
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{FleetError, Result};

/// Overrides the storage root (useful for sandboxes and CI).
pub const ROOT_ENV: &str = "FLEET_HOME";

/// Central configuration for all Fleet storage paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the storage root from `$FLEET_HOME`, falling back to `~/.fleet`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = env::var_os(ROOT_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(FleetError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".fleet")))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for Fleet data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the cross-invocation discovery cache.
    pub fn discovery_cache_file(&self) -> PathBuf {
        self.cache_dir().join("discovery.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directory holding one metadata JSON file per running instance.
    pub fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.instances_dir())?;
        fs_err::create_dir_all(self.cache_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
