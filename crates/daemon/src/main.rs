// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Depot Daemon (depotd)
//!
//! Background process that owns the task engine and the publication store.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;

use std::path::PathBuf;

use depot_core::LoggingConfig;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::lifecycle::{load_config, LifecycleError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;

    let log_guard = setup_logging(&config.logging)?;

    info!(pid = std::process::id(), "starting depotd");

    let mut daemon = match lifecycle::startup(&config) {
        Ok(d) => d,
        Err(e) => {
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut sweep = tokio::time::interval(daemon.config.engine.sweep_interval);
    // The first tick completes immediately; startup already settled state
    sweep.tick().await;

    info!("daemon ready");

    // Signal ready for parent process (e.g., systemd, tests waiting for startup)
    println!("READY");

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                if let Err(e) = daemon.sweep() {
                    error!("error sweeping publications: {}", e);
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                daemon.shutdown()?;
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                daemon.shutdown()?;
                break;
            }
        }
    }

    info!("daemon stopped");
    Ok(())
}

fn setup_logging(
    config: &LoggingConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = match &config.file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let name = path.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log file has no name: {}", path.display()),
                )
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // RUST_LOG overrides the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
