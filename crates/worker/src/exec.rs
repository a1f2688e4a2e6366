//! External command execution with a hard timeout.

use protocol::{Task, TaskResult, session::MAX_OUTPUT_SIZE};
use std::{
    io::{self, Read},
    process::Stdio,
    time::Duration,
};
use tokio::{process::Command, time::Instant};

/// The command could not be run at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The process could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Collecting the process output failed.
    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Runs task commands as child processes.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    timeout: Duration,
    output_limit: usize,
}

impl Executor {
    /// Kill any command still running after `timeout`. Output is capped at
    /// [`MAX_OUTPUT_SIZE`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            output_limit: MAX_OUTPUT_SIZE,
        }
    }

    /// Keep at most `bytes` of output, never more than [`MAX_OUTPUT_SIZE`].
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes.min(MAX_OUTPUT_SIZE);
        self
    }

    /// The execution timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The output capture limit in bytes.
    pub fn output_limit(&self) -> usize {
        self.output_limit
    }

    /// Run `task.command` with its whitespace-split arguments.
    ///
    /// stdout and stderr share one pipe, so the output keeps the order the
    /// command wrote it in. Anything past the output limit is read and
    /// discarded, and the result is marked `truncated`. A command that
    /// outlives the timeout is killed and reported with `timed_out` set;
    /// only a failure to start or reap the process is an error.
    pub async fn execute(&self, task: &Task) -> Result<TaskResult, ExecError> {
        let spawn_error = |source| ExecError::Spawn {
            command: task.command.clone(),
            source,
        };
        let wait_error = |source| ExecError::Wait {
            command: task.command.clone(),
            source,
        };

        let (reader, writer) = io::pipe().map_err(spawn_error)?;
        let stderr = writer.try_clone().map_err(spawn_error)?;
        let mut command = Command::new(&task.command);
        command
            .args(task.argv())
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(spawn_error)?;
        // Release the parent's copies of the write end so the reader sees EOF.
        drop(command);

        let limit = self.output_limit;
        let reading = tokio::task::spawn_blocking(move || capture(reader, limit));
        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await?;
            let output = reading.await.map_err(io::Error::other)??;
            Ok::<_, io::Error>((status, output))
        })
        .await;
        let duration = started.elapsed().as_secs_f64();

        match finished {
            Ok(Ok((status, (output, truncated)))) => {
                if truncated {
                    tracing::warn!("task {}: output truncated at {limit} bytes", task.id);
                }
                Ok(TaskResult {
                    task_id: task.id,
                    output: String::from_utf8_lossy(&output).into_owned(),
                    duration,
                    exit_code: status.code(),
                    timed_out: false,
                    truncated,
                })
            }
            Ok(Err(source)) => Err(wait_error(source)),
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("task {}: kill failed: {e}", task.id);
                }
                tracing::warn!(
                    "task {}: `{}` killed after {}s",
                    task.id,
                    task.command,
                    self.timeout.as_secs_f64()
                );
                Ok(TaskResult {
                    task_id: task.id,
                    output: format!("killed after {}s timeout\n", self.timeout.as_secs_f64()),
                    duration,
                    exit_code: None,
                    timed_out: true,
                    truncated: false,
                })
            }
        }
    }
}

/// Read up to `limit` bytes, then drain the rest so the child never blocks
/// on a full pipe. Returns the kept bytes and whether anything was dropped.
fn capture(reader: impl Read, limit: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    let mut head = reader.take(limit as u64);
    head.read_to_end(&mut kept)?;
    let dropped = io::copy(&mut head.into_inner(), &mut io::sink())?;
    Ok((kept, dropped > 0))
}
