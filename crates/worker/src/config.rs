//! Worker configuration loaded from TOML.

use crate::Executor;
use anyhow::{Context, Result};
use protocol::{SecurityConfig, utils::expand_env_vars};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Worker config file name.
pub const CONFIG_FILE: &str = "worker.toml";

/// Default `worker.toml`. The password comes from `DROVER_PASSWORD`.
pub const DEFAULT_CONFIG: &str = r#"[server]
address = "127.0.0.1:1234"

[security]
password = "${DROVER_PASSWORD}"
key_bits = 2048

[exec]
timeout_secs = 600
max_output_bytes = 1048576
"#;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Controller to dial.
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared secret and key size; must match the controller's.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Command execution limits.
    #[serde(default)]
    pub exec: ExecConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Controller address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    format!("127.0.0.1:{}", protocol::DEFAULT_PORT)
}

/// `[exec]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Seconds a command may run before it is killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bytes of combined output kept per task; the rest is discarded.
    /// Values above the protocol's output limit are clamped to it.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl ExecConfig {
    /// The execution timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// An executor with these limits.
    pub fn executor(&self) -> Executor {
        Executor::new(self.timeout()).with_output_limit(self.max_output_bytes)
    }
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl WorkerConfig {
    /// Parse a TOML string, expanding `${ENV_VAR}` references first.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let expanded = expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }
}
