//! Controller configuration loaded from TOML.

use crate::{
    dispatch::{DispatchSettings, Dispatcher, EmptyQueuePolicy},
    queue::TaskQueue,
    range,
    results::{DEFAULT_RESULT_CAPACITY, ResultSink},
    state::{RunMode, RunState},
};
use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use ipnet::Ipv4Net;
use protocol::{SecurityConfig, Task, utils::expand_env_vars};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Controller config file name.
pub const CONFIG_FILE: &str = "control.toml";

/// Subdirectory of the platform config dir holding drover's files.
pub const CONFIG_DIR: &str = "drover";

/// Default `control.toml`. The password comes from `DROVER_PASSWORD`.
pub const DEFAULT_CONFIG: &str = r#"[server]
bind = "127.0.0.1:1234"

[security]
password = "${DROVER_PASSWORD}"
key_bits = 2048

[dispatch]
task_ttl_secs = 60
result_timeout_secs = 900
handshake_timeout_secs = 30
queue_capacity = 1024
result_capacity = 1024
empty_queue = "wait"
initial_mode = "continue"
scan_granularity = 24
"#;

/// Resolve the global configuration directory (`<config dir>/drover/`).
pub fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR))
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared secret and key size.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Queue and dispatch behaviour.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Ranges enumerated into tasks at startup (`[[seeds]]`).
    #[serde(default)]
    pub seeds: Vec<SeedConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    format!("127.0.0.1:{}", protocol::DEFAULT_PORT)
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Seconds a dispatched task stays valid.
    pub task_ttl_secs: u64,
    /// Seconds to wait for a worker's result.
    pub result_timeout_secs: u64,
    /// Seconds a worker may take to finish the key exchange.
    pub handshake_timeout_secs: u64,
    /// Queue capacity for operator-added tasks.
    pub queue_capacity: usize,
    /// Completed results held until the operator drains them; the oldest
    /// are dropped beyond this.
    pub result_capacity: usize,
    /// What to tell a worker when nothing is queued.
    pub empty_queue: EmptyQueuePolicy,
    /// Run state at startup.
    pub initial_mode: RunMode,
    /// Default subnet prefix length for scans.
    pub scan_granularity: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            task_ttl_secs: 60,
            result_timeout_secs: 900,
            handshake_timeout_secs: 30,
            queue_capacity: 1024,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            empty_queue: EmptyQueuePolicy::Wait,
            initial_mode: RunMode::Continue,
            scan_granularity: 24,
        }
    }
}

/// A range scan queued at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// IPv4 range in CIDR notation.
    pub range: Ipv4Net,
    /// Subnet prefix length; defaults to `dispatch.scan_granularity`.
    #[serde(default)]
    pub granularity: Option<u8>,
    /// Program to run per subnet.
    pub command: String,
    /// Arguments; the subnet is appended.
    #[serde(default)]
    pub args: String,
}

impl ControlConfig {
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

    /// Validated dispatch settings. Fails on an empty password, a key size
    /// below 2048 bits, a zero task lifetime or a zero handshake timeout.
    pub fn settings(&self) -> Result<DispatchSettings> {
        let credentials = self
            .security
            .credentials()
            .context("invalid [security] settings")?;

        let dispatch = &self.dispatch;
        if dispatch.task_ttl_secs == 0 {
            bail!("dispatch.task_ttl_secs must be positive");
        }
        if dispatch.handshake_timeout_secs == 0 {
            bail!("dispatch.handshake_timeout_secs must be positive");
        }
        if dispatch.scan_granularity > 32 {
            bail!("dispatch.scan_granularity must be at most 32");
        }
        let task_ttl = i64::try_from(dispatch.task_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .context("dispatch.task_ttl_secs is out of range")?;

        Ok(DispatchSettings {
            credentials,
            task_ttl,
            result_timeout: Duration::from_secs(dispatch.result_timeout_secs),
            handshake_timeout: Duration::from_secs(dispatch.handshake_timeout_secs),
            empty_queue: dispatch.empty_queue,
        })
    }

    /// Every seed range enumerated into tasks, in file order.
    pub fn seed_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for seed in &self.seeds {
            let granularity = seed.granularity.unwrap_or(self.dispatch.scan_granularity);
            let seeded = range::scan_tasks(seed.range, granularity, &seed.command, &seed.args)
                .with_context(|| format!("invalid seed {}", seed.range))?;
            tracing::debug!("seed {} at /{granularity}: {} tasks", seed.range, seeded.len());
            tasks.extend(seeded);
        }
        Ok(tasks)
    }
}

impl Dispatcher {
    /// Build the queue, run state and settings described by `config`.
    ///
    /// Seed tasks are queued up front; the queue grows past
    /// `queue_capacity` if the seeds need it.
    pub fn from_config(config: &ControlConfig) -> Result<Self> {
        let settings = config.settings()?;
        let seeds = config.seed_tasks()?;
        let queue = TaskQueue::with_tasks(config.dispatch.queue_capacity, seeds);
        let run_state = RunState::new(config.dispatch.initial_mode);
        let results = ResultSink::with_capacity(config.dispatch.result_capacity);
        Ok(Dispatcher::new(Arc::new(queue), settings)
            .with_run_state(Arc::new(run_state))
            .with_results(Arc::new(results)))
    }
}
