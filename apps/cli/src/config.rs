//! Configuration resolution for the CLI.
//!
//! Resolves `control.toml` / `worker.toml` in priority order:
//! 1. `--config <path>` flag (explicit override)
//! 2. `{cwd}/<file>` (workspace config)
//! 3. `<config dir>/drover/<file>` (global default)
//!
//! If none exists, the built-in template is used; its password is read
//! from `DROVER_PASSWORD`.

use anyhow::{Context, Result};
use control::ControlConfig;
use std::path::{Path, PathBuf};
use worker::WorkerConfig;

/// Resolve the controller config following the priority chain.
pub fn resolve_control(config_flag: Option<&Path>) -> Result<ControlConfig> {
    match locate(config_flag, control::config::CONFIG_FILE) {
        Some(path) => {
            tracing::info!("loading controller config from {}", path.display());
            ControlConfig::load(&path)
        }
        None => ControlConfig::from_toml(control::config::DEFAULT_CONFIG)
            .context("failed to parse built-in controller config"),
    }
}

/// Resolve the worker config following the priority chain.
pub fn resolve_worker(config_flag: Option<&Path>) -> Result<WorkerConfig> {
    match locate(config_flag, worker::config::CONFIG_FILE) {
        Some(path) => {
            tracing::info!("loading worker config from {}", path.display());
            WorkerConfig::load(&path)
        }
        None => WorkerConfig::from_toml(worker::config::DEFAULT_CONFIG)
            .context("failed to parse built-in worker config"),
    }
}

/// The config file to load, if any. An explicit flag always wins, even when
/// the file does not exist, so the load error names it.
pub fn locate(config_flag: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = config_flag {
        return Some(path.to_path_buf());
    }

    let workspace_path = PathBuf::from(file_name);
    if workspace_path.exists() {
        return Some(workspace_path);
    }

    control::config::global_config_dir()
        .map(|dir| dir.join(file_name))
        .filter(|path| path.exists())
}
