//! Worker command.

use crate::config::resolve_worker;
use anyhow::Result;
use clap::Args;
use std::path::Path;
use worker::Worker;

/// Run a worker until the controller tells it to stop.
#[derive(Args, Debug)]
pub struct Work {
    /// Controller address (host:port). Defaults to `[server] address`.
    #[arg(long)]
    pub address: Option<String>,

    /// Seconds a command may run before it is killed.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl Work {
    /// Resolve config, dial the controller and run the exchange loop.
    pub async fn run(self, config_flag: Option<&Path>) -> Result<()> {
        let mut config = resolve_worker(config_flag)?;
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(timeout) = self.timeout {
            config.exec.timeout_secs = timeout;
        }

        let worker = Worker::from_config(&config)?;
        let summary = worker.run().await?;
        tracing::info!(
            "worker finished: {} completed, {} expired",
            summary.completed,
            summary.expired
        );
        Ok(())
    }
}
