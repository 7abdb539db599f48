//! Runtime configuration for discovery and termination.
//!
//! Loaded from TOML at `$FLEET_CONFIG` or `~/.fleet/config.toml`. Every key is
//! optional; a missing file means all defaults.
//!
//! ```toml
//! process_family = ["fleet-daemon", "fleet-worker"]
//! memory_cache_ttl_ms = 3000
//! file_cache_ttl_ms = 2000
//! port_probe_timeout_ms = 50
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::storage::StorageConfig;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "FLEET_CONFIG";

const DEFAULT_PROCESS_FAMILY: &[&str] = &["fleet-daemon", "fleet-worker", "fleetd"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Command-line substrings that identify our own daemon/worker processes.
    /// Matching is case-insensitive and heuristic.
    pub process_family: Vec<String>,
    pub memory_cache_ttl_ms: u64,
    pub file_cache_ttl_ms: u64,
    pub file_cache_enabled: bool,
    /// Upper bound for bulk `ps`/`tmux` queries.
    pub enumeration_timeout_ms: u64,
    /// Per-instance TCP connect timeout.
    pub port_probe_timeout_ms: u64,
    pub tmux_binary: String,
    pub ps_binary: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            process_family: DEFAULT_PROCESS_FAMILY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            memory_cache_ttl_ms: 3_000,
            file_cache_ttl_ms: 2_000,
            file_cache_enabled: true,
            enumeration_timeout_ms: 2_000,
            port_probe_timeout_ms: 50,
            tmux_binary: "tmux".to_string(),
            ps_binary: "ps".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn memory_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.memory_cache_ttl_ms)
    }

    pub fn file_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.file_cache_ttl_ms)
    }

    pub fn enumeration_timeout(&self) -> Duration {
        Duration::from_millis(self.enumeration_timeout_ms)
    }

    pub fn port_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.port_probe_timeout_ms)
    }
}

/// Returns the config path: `$FLEET_CONFIG` if set, else `<root>/config.toml`.
pub fn config_path(storage: &StorageConfig) -> PathBuf {
    match env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => storage.config_file(),
    }
}

/// Loads configuration from `path`, returning defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<FleetConfig> {
    if !path.exists() {
        return Ok(FleetConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| FleetError::Io {
        context: format!("reading config {}", path.display()),
        source,
    })?;

    toml::from_str::<FleetConfig>(&content).map_err(|err| FleetError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
