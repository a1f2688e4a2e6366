//! Task types for controller ↔ worker communication.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Tells the worker whether to run the attached command or leave its loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Execute the command.
    #[default]
    Continue,
    /// Stop the worker loop cleanly.
    Shutdown,
}

/// A unit of dispatchable work.
///
/// Range-scan tasks are ordinary tasks whose `args` end with the target
/// subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identity, stable across stamping and requeue.
    pub id: Ulid,
    /// Run or stop.
    pub status: TaskStatus,
    /// External program to invoke.
    pub command: String,
    /// Whitespace-delimited argument string, passed verbatim.
    #[serde(default)]
    pub args: String,
    /// Absolute deadline after which the worker must refuse the task.
    /// Unset while the task waits in the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl Task {
    /// A task running `command` with `args`.
    pub fn exec(command: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            status: TaskStatus::Continue,
            command: command.into(),
            args: args.into(),
            expires: None,
        }
    }

    /// A task telling the worker to exit.
    pub fn shutdown() -> Self {
        Self {
            id: Ulid::new(),
            status: TaskStatus::Shutdown,
            command: String::new(),
            args: String::new(),
            expires: None,
        }
    }

    /// Copy of this task expiring `ttl` after `now`.
    ///
    /// The original is left untouched so a failed dispatch can requeue it
    /// without a stale deadline.
    pub fn stamped(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Self {
        Self {
            expires: Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)),
            ..self.clone()
        }
    }

    /// Whether the deadline has passed at `now`. Unstamped tasks never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|deadline| deadline <= now)
    }

    /// The argument string split on whitespace.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.args.split_whitespace()
    }
}

/// The outcome of executing a [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the task this result answers.
    pub task_id: Ulid,
    /// Combined stdout and stderr, in the order the command wrote them.
    pub output: String,
    /// Wall-clock seconds spent executing, transport excluded.
    pub duration: f64,
    /// Exit code, if the process exited normally.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// The command hit the worker's execution timeout and was killed.
    #[serde(default)]
    pub timed_out: bool,
    /// `output` was cut at the worker's capture limit.
    #[serde(default)]
    pub truncated: bool,
}

impl TaskResult {
    /// Whether the command ran to completion with exit code zero.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}
