//! Operator command surface: the only inputs into the queue and run-state
//! from outside the dispatch loop.

use crate::{
    range,
    results::{Completed, ResultSink},
    queue::TaskQueue,
    state::{RunMode, RunState},
};
use anyhow::{Context, Result, anyhow, bail};
use ipnet::Ipv4Net;
use protocol::Task;
use std::{fmt::Write as _, net::Ipv4Addr, sync::Arc};
use ulid::Ulid;

/// Console help text.
pub const HELP: &str = "\
commands:
  add <command> [args...]          queue one command
  scan <cidr> <command> [args...]  queue one command per subnet, subnet appended to args
  status <continue|pause|shutdown> change the run state
  queue                            show pending tasks
  results                          print and clear completed results
  help                             show this message";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Queue a single command.
    Add { command: String, args: String },
    /// Queue one command per subnet of `range`.
    Scan {
        range: Ipv4Net,
        command: String,
        args: String,
    },
    /// Change the run state.
    Status(RunMode),
    /// Show pending tasks.
    Queue,
    /// Print and clear completed results.
    Results,
    /// Show usage.
    Help,
}

impl OperatorCommand {
    /// Parse one console line. Arguments are re-joined with single spaces.
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };

        match verb.to_ascii_lowercase().as_str() {
            "add" => {
                let command = words.next().context("usage: add <command> [args...]")?;
                Ok(Self::Add {
                    command: command.to_owned(),
                    args: join(words),
                })
            }
            "scan" => {
                let range = words
                    .next()
                    .context("usage: scan <cidr> <command> [args...]")?;
                let range = parse_range(range)?;
                let command = words
                    .next()
                    .context("usage: scan <cidr> <command> [args...]")?;
                Ok(Self::Scan {
                    range,
                    command: command.to_owned(),
                    args: join(words),
                })
            }
            "status" => {
                let mode = words
                    .next()
                    .context("usage: status <continue|pause|shutdown>")?;
                Ok(Self::Status(mode.parse()?))
            }
            "queue" => Ok(Self::Queue),
            "results" => Ok(Self::Results),
            "help" | "?" => Ok(Self::Help),
            other => Err(anyhow!("unknown command '{other}', try 'help'")),
        }
    }
}

fn join<'a>(words: impl Iterator<Item = &'a str>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

/// Accepts `a.b.c.d/n` or a bare address (treated as `/32`).
fn parse_range(s: &str) -> Result<Ipv4Net> {
    if s.contains('/') {
        return s.parse().with_context(|| format!("invalid range '{s}'"));
    }
    let addr: Ipv4Addr = s.parse().with_context(|| format!("invalid address '{s}'"))?;
    Ok(Ipv4Net::new(addr, 32)?)
}

/// Handle on the shared controller state for operator input. Safe to clone
/// and use concurrently with the dispatch loop.
#[derive(Debug, Clone)]
pub struct Operator {
    queue: Arc<TaskQueue>,
    results: Arc<ResultSink>,
    run_state: Arc<RunState>,
    scan_granularity: u8,
}

impl Operator {
    /// Operate on the given shared state.
    pub fn new(
        queue: Arc<TaskQueue>,
        results: Arc<ResultSink>,
        run_state: Arc<RunState>,
        scan_granularity: u8,
    ) -> Self {
        Self {
            queue,
            results,
            run_state,
            scan_granularity,
        }
    }

    /// Queue one command. Waits while the queue is full.
    pub async fn enqueue_single(&self, command: &str, args: &str) -> Result<Ulid> {
        let task = Task::exec(command, args);
        let id = task.id;
        self.enqueue(task).await?;
        tracing::info!("queued task {id}: {command} {args}");
        Ok(id)
    }

    /// Queue every task in order. Returns how many were queued.
    pub async fn enqueue_bulk(&self, tasks: impl IntoIterator<Item = Task>) -> Result<usize> {
        let mut queued = 0;
        for task in tasks {
            self.enqueue(task).await?;
            queued += 1;
        }
        Ok(queued)
    }

    /// Queue one task per subnet of `range` at `granularity`, or the
    /// configured scan granularity when `None`.
    pub async fn enqueue_scan(
        &self,
        range: Ipv4Net,
        granularity: Option<u8>,
        command: &str,
        args: &str,
    ) -> Result<usize> {
        let granularity = granularity.unwrap_or(self.scan_granularity);
        let tasks = range::scan_tasks(range, granularity, command, args)?;
        let queued = self.enqueue_bulk(tasks).await?;
        tracing::info!("queued {queued} scan tasks for {range} at /{granularity}");
        Ok(queued)
    }

    /// Change the run state, returning the previous mode.
    pub fn set_run_state(&self, mode: RunMode) -> RunMode {
        self.run_state.set(mode)
    }

    /// Current run state.
    pub fn run_state(&self) -> RunMode {
        self.run_state.get()
    }

    /// Pending task count.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Remove and return every completed result.
    pub fn drain_results(&self) -> Vec<Completed> {
        self.results.drain()
    }

    /// Wait for at least one completed result, then drain and render
    /// everything held.
    pub async fn next_results(&self) -> String {
        render_results(&self.results.next_batch().await)
    }

    /// Run a parsed console command and render its reply.
    pub async fn execute(&self, command: OperatorCommand) -> Result<String> {
        match command {
            OperatorCommand::Add { command, args } => {
                let id = self.enqueue_single(&command, &args).await?;
                Ok(format!("queued {id}"))
            }
            OperatorCommand::Scan {
                range,
                command,
                args,
            } => {
                let queued = self.enqueue_scan(range, None, &command, &args).await?;
                Ok(format!("queued {queued} tasks for {range}"))
            }
            OperatorCommand::Status(mode) => {
                let previous = self.set_run_state(mode);
                Ok(format!("run state {previous} -> {mode}"))
            }
            OperatorCommand::Queue => {
                let pending = self.queue.snapshot();
                let mut out = format!(
                    "{} pending (capacity {}), run state {}",
                    pending.len(),
                    self.queue.capacity(),
                    self.run_state()
                );
                for task in pending {
                    let _ = write!(out, "\n  {} {} {}", task.id, task.command, task.args);
                }
                Ok(out)
            }
            OperatorCommand::Results => Ok(render_results(&self.drain_results())),
            OperatorCommand::Help => Ok(HELP.to_owned()),
        }
    }

    async fn enqueue(&self, task: Task) -> Result<()> {
        self.queue
            .enqueue(task)
            .await
            .map_err(|task| anyhow!("queue closed, task {} not queued", task.id))
    }
}

fn render_results(completed: &[Completed]) -> String {
    if completed.is_empty() {
        return "no results".to_owned();
    }
    let mut out = String::new();
    for (i, entry) in completed.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let status = match (entry.result.timed_out, entry.result.exit_code) {
            (true, _) => "timed out".to_owned(),
            (false, Some(code)) => format!("exit {code}"),
            (false, None) => "killed".to_owned(),
        };
        let _ = write!(
            out,
            "[worker {}] {} {} {} ({:.3}s, {status})\n{}",
            entry.worker_id,
            entry.task.id,
            entry.task.command,
            entry.task.args,
            entry.result.duration,
            entry.result.output.trim_end()
        );
        if entry.result.truncated {
            out.push_str("\n[output truncated]");
        }
    }
    out
}
