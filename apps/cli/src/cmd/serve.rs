//! Controller command.

use crate::config::resolve_control;
use anyhow::Result;
use clap::Args;
use control::{EmptyQueuePolicy, Operator, OperatorCommand, RunMode, operator::HELP};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Start the controller.
#[derive(Args, Debug)]
pub struct Serve {
    /// Listen address (host:port). Defaults to `[server] bind`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Start paused: hold dispatch until `status continue`.
    #[arg(long)]
    pub paused: bool,

    /// Tell workers to exit when the queue is empty instead of waiting.
    #[arg(long)]
    pub exit_when_empty: bool,
}

impl Serve {
    /// Resolve config, start serving and read operator commands until
    /// ctrl-c.
    pub async fn run(self, config_flag: Option<&Path>) -> Result<()> {
        let mut config = resolve_control(config_flag)?;
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if self.paused {
            config.dispatch.initial_mode = RunMode::Pause;
        }
        if self.exit_when_empty {
            config.dispatch.empty_queue = EmptyQueuePolicy::Shutdown;
        }

        let handle = control::serve(&config).await?;
        let operator = handle.dispatcher.operator(config.dispatch.scan_granularity);
        println!("{HELP}");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut console_open = true;
        loop {
            tokio::select! {
                line = lines.next_line(), if console_open => match line {
                    Ok(Some(line)) => run_line(&operator, &line),
                    Ok(None) => {
                        tracing::info!("stdin closed, printing results as they arrive");
                        console_open = false;
                        print_results(&operator);
                    }
                    Err(e) => {
                        tracing::warn!("failed to read stdin: {e}");
                        console_open = false;
                        print_results(&operator);
                    }
                },
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("received ctrl-c, shutting down");
                    break;
                }
            }
        }

        handle.shutdown().await?;
        tracing::info!("controller shut down");
        Ok(())
    }
}

/// Parse and run one console line. Commands run in the background so a
/// full queue never blocks the console.
fn run_line(operator: &Operator, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let command = match OperatorCommand::parse(line) {
        Ok(command) => command,
        Err(e) => {
            println!("{e}");
            return;
        }
    };

    let operator = operator.clone();
    tokio::spawn(async move {
        match operator.execute(command).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => println!("error: {e:#}"),
        }
    });
}

/// Without a console nobody drains results, so print them as they arrive.
fn print_results(operator: &Operator) {
    let operator = operator.clone();
    tokio::spawn(async move {
        loop {
            println!("{}", operator.next_results().await);
        }
    });
}
