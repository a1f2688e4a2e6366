//! Process-wide run-state gating whether the controller hands out work.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tokio::sync::watch;

/// Execution mode set by the operator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Dispatch normally.
    #[default]
    Continue,
    /// Hold new dispatches until the mode changes.
    Pause,
    /// Tell every worker to exit.
    Shutdown,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::Pause => "pause",
            Self::Shutdown => "shutdown",
        })
    }
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" | "resume" => Ok(Self::Continue),
            "pause" => Ok(Self::Pause),
            "shutdown" | "exit" => Ok(Self::Shutdown),
            other => anyhow::bail!("unknown run mode '{other}'"),
        }
    }
}

/// Shared run-state flag. Writers replace the mode under the channel lock;
/// dispatch handlers read it or wait for it to change.
#[derive(Debug)]
pub struct RunState {
    tx: watch::Sender<RunMode>,
}

impl RunState {
    /// Start in `initial` mode.
    pub fn new(initial: RunMode) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Current mode.
    pub fn get(&self) -> RunMode {
        *self.tx.borrow()
    }

    /// Replace the mode, returning the previous one.
    pub fn set(&self, mode: RunMode) -> RunMode {
        let previous = self.tx.send_replace(mode);
        if previous != mode {
            tracing::info!("run state {previous} -> {mode}");
        }
        previous
    }

    /// Receiver observing every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<RunMode> {
        self.tx.subscribe()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(RunMode::default())
    }
}
