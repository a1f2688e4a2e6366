//! CLI argument parsing and subcommand dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod serve;
pub mod work;

/// Distributed command runner.
#[derive(Parser, Debug)]
#[command(name = "drover", about = "Hand shell commands to a fleet of workers")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller with an operator console on stdin.
    Serve(serve::Serve),
    /// Run a worker against a controller.
    Work(work::Work),
}

impl Cli {
    /// Run the selected subcommand.
    pub async fn run(self) -> Result<()> {
        let config = self.config.as_deref();
        match self.command {
            Command::Serve(cmd) => cmd.run(config).await,
            Command::Work(cmd) => cmd.run(config).await,
        }
    }
}
