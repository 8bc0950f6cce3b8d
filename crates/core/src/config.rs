// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration
//!
//! Loaded from a TOML file by `depotd`; every field has a default so an
//! empty file is valid.
//!
//! ```toml
//! [scheduler]
//! acquire_timeout = "10m"
//!
//! [engine]
//! workers = 4
//! publication_grace = "1h"
//! sweep_interval = "5m"
//!
//! [storage]
//! data_dir = "/var/lib/depot"
//!
//! [logging]
//! level = "info"
//! file = "/var/log/depot/depotd.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepotConfig {
    pub scheduler: SchedulerConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl DepotConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: DepotConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.workers == 0 {
            return Err(ConfigError::Invalid(
                "engine.workers must be at least 1".to_string(),
            ));
        }
        if self.scheduler.acquire_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "scheduler.acquire_timeout must be positive; omit it to wait forever".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reservation scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How long a task may wait for its reservations before failing
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl SchedulerConfig {
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Worker and maintenance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of tasks running at once
    pub workers: usize,
    /// Age after which an incomplete publication is considered orphaned
    #[serde(with = "humantime_serde")]
    pub publication_grace: Duration,
    /// How often `depotd` sweeps orphaned publications
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            publication_grace: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_publication_grace(mut self, grace: Duration) -> Self {
        self.publication_grace = grace;
        self
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Recorded on every WAL entry
    pub machine_id: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            machine_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl StorageConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    pub level: String,
    /// Log file; stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// `$XDG_STATE_HOME/depot`, falling back to `~/.local/state/depot`
fn default_data_dir() -> PathBuf {
    if let Some(dir) = dirs::state_dir() {
        return dir.join("depot");
    }
    dirs::home_dir()
        .map(|home| home.join(".local/state/depot"))
        .unwrap_or_else(|| PathBuf::from(".depot"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
