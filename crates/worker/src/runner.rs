//! Worker execution loop: one handshake, one task, one result per exchange.

use crate::{
    WorkerConfig,
    exec::{ExecError, Executor},
};
use chrono::Utc;
use protocol::{Credentials, ProtocolError, Session, Task, TaskStatus};
use std::io;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// Errors that end a worker session.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The controller could not be reached.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Handshake, authentication, integrity or transport failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The task's command could not be run.
    #[error(transparent)]
    Execution(#[from] ExecError),
}

/// Counts for a session that ended with a shutdown notice.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Tasks executed and reported.
    pub completed: usize,
    /// Tasks dropped because their deadline had passed.
    pub expired: usize,
}

/// A worker bound to one controller.
#[derive(Debug, Clone)]
pub struct Worker {
    address: String,
    credentials: Credentials,
    executor: Executor,
}

impl Worker {
    /// A worker dialing `address`.
    pub fn new(address: impl Into<String>, credentials: Credentials, executor: Executor) -> Self {
        Self {
            address: address.into(),
            credentials,
            executor,
        }
    }

    /// A worker described by `config`. Fails on invalid credentials.
    pub fn from_config(config: &WorkerConfig) -> anyhow::Result<Self> {
        let credentials = config.security.credentials()?;
        Ok(Self::new(
            config.server.address.clone(),
            credentials,
            config.exec.executor(),
        ))
    }

    /// Controller address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dial the controller and run until told to stop.
    pub async fn run(&self) -> Result<WorkerSummary, WorkerError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| WorkerError::Connect {
                address: self.address.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed: {e}");
        }
        tracing::info!("connected to {}", self.address);
        self.run_on(stream).await
    }

    /// Run the exchange loop over an established stream.
    ///
    /// Returns once the controller sends a shutdown notice. Any protocol or
    /// execution error ends the session; reconnecting is up to the caller.
    pub async fn run_on<S>(&self, mut stream: S) -> Result<WorkerSummary, WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut summary = WorkerSummary::default();
        loop {
            let session = Session::handshake(&mut stream, &self.credentials).await?;
            let task: Task = session.recv(&mut stream).await?;

            if task.is_expired(Utc::now()) {
                tracing::warn!("task {} expired before it arrived, dropping it", task.id);
                summary.expired += 1;
                continue;
            }
            if task.status == TaskStatus::Shutdown {
                tracing::info!(
                    "controller requested shutdown after {} tasks",
                    summary.completed
                );
                return Ok(summary);
            }

            tracing::info!("running task {}: {} {}", task.id, task.command, task.args);
            let result = self.executor.execute(&task).await?;
            tracing::info!(
                "task {} finished in {:.3}s (exit {:?}, {} bytes of output)",
                task.id,
                result.duration,
                result.exit_code,
                result.output.len()
            );
            session.send(&mut stream, &result).await?;
            summary.completed += 1;
        }
    }
}
