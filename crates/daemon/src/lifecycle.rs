// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery, shutdown.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use depot_core::{ConfigError, DepotConfig, DepotError, SystemClock, UuidIdGen};
use depot_engine::Engine;
use depot_storage::{Database, StorageError};
use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};

/// Engine with production clock and id generator
pub type DaemonEngine = Engine<SystemClock, UuidIdGen>;

/// Name of the pid/lock file inside the data directory
pub const LOCK_FILE: &str = "depotd.pid";

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to acquire lock at {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Depot(#[from] DepotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running daemon
pub struct Daemon {
    pub config: DepotConfig,
    // NOTE(lifetime): held to keep the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    lock_path: PathBuf,
    pub engine: DaemonEngine,
    pub start_time: Instant,
}

impl Daemon {
    /// Delete publications left incomplete past the grace period
    pub fn sweep(&self) -> Result<usize, LifecycleError> {
        let swept = self.engine.sweep_incomplete_publications()?;
        if !swept.is_empty() {
            info!(count = swept.len(), "swept orphaned publications");
        }
        Ok(swept.len())
    }

    /// Shutdown the daemon gracefully
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            running = self.engine.running_len(),
            waiting = self.engine.queue_len(),
            "shutting down daemon"
        );

        // Tasks still running are failed as worker-lost on the next start
        if self.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!("failed to remove pid file: {}", e);
            }
        }

        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Load configuration from `path`, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<DepotConfig, LifecycleError> {
    match path {
        Some(path) => Ok(DepotConfig::load(path)?),
        None => Ok(DepotConfig::default()),
    }
}

/// Start the daemon
pub fn startup(config: &DepotConfig) -> Result<Daemon, LifecycleError> {
    let lock_path = config.storage.data_dir.join(LOCK_FILE);
    let mut acquired = false;
    match startup_inner(config, &lock_path, &mut acquired) {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Only remove a pid file this process wrote
            if acquired {
                let _ = std::fs::remove_file(&lock_path);
            }
            Err(e)
        }
    }
}

fn startup_inner(
    config: &DepotConfig,
    lock_path: &Path,
    acquired: &mut bool,
) -> Result<Daemon, LifecycleError> {
    // 1. Data directory and lock first; a second daemon must not touch the WAL
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(lock_path.to_path_buf(), e))?;
    *acquired = true;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 2. Replay the WAL
    let db = Arc::new(Database::open_with_config(&config.storage)?);

    // 3. Engine, then reconcile tasks orphaned by the previous process
    let engine = Engine::new(db, config, SystemClock, UuidIdGen);
    let lost = engine.recover()?;
    if !lost.is_empty() {
        warn!(
            count = lost.len(),
            "recovered tasks interrupted by previous shutdown"
        );
    }

    info!(
        data_dir = %config.storage.data_dir.display(),
        workers = config.engine.workers,
        tasks = engine.list().len(),
        "daemon started"
    );

    Ok(Daemon {
        config: config.clone(),
        lock_file,
        lock_path: lock_path.to_path_buf(),
        engine,
        start_time: Instant::now(),
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
