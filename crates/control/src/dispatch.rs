//! Per-connection dispatch loop.
//!
//! Each accepted worker connection repeats one exchange until it ends:
//! handshake, pick a task (or a shutdown notice), stamp and send it, then
//! wait for the result. Any failure after a task was taken puts the unstamped
//! original back in the queue and closes the connection.

use crate::{
    audit::{AuditEvent, AuditLog, TracingAudit},
    operator::Operator,
    queue::TaskQueue,
    results::{Completed, ResultSink},
    state::{RunMode, RunState},
};
use chrono::{DateTime, TimeDelta, Utc};
use protocol::{Credentials, FailureKind, ProtocolError, Session, Task, TaskResult};
use serde::{Deserialize, Serialize};
use std::{fmt, io, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::Instant,
};

/// What DISPATCH does when no task is queued.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueuePolicy {
    /// Park the connection until a task arrives or the run state changes.
    #[default]
    Wait,
    /// Send the worker a shutdown notice.
    Shutdown,
}

/// Dispatch parameters shared by every connection.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Shared secret and key size for every handshake.
    pub credentials: Credentials,
    /// Lifetime stamped onto each task right before it is sent.
    pub task_ttl: TimeDelta,
    /// How long to wait for a worker's result.
    pub result_timeout: Duration,
    /// How long a worker may take to complete the key exchange.
    pub handshake_timeout: Duration,
    /// Empty-queue behaviour.
    pub empty_queue: EmptyQueuePolicy,
}

impl DispatchSettings {
    /// Defaults: one-minute task lifetime, fifteen-minute result timeout,
    /// thirty-second handshake timeout, wait on an empty queue.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            task_ttl: TimeDelta::minutes(1),
            result_timeout: Duration::from_secs(900),
            handshake_timeout: Duration::from_secs(30),
            empty_queue: EmptyQueuePolicy::Wait,
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The worker was sent a shutdown notice.
    Shutdown,
    /// The connection failed.
    Failed(FailureKind),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown"),
            Self::Failed(kind) => write!(f, "{kind} failure"),
        }
    }
}

/// Summary of one worker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Id assigned at accept time.
    pub worker_id: u64,
    /// Tasks acknowledged on this connection.
    pub completed: usize,
    /// How it ended.
    pub outcome: Outcome,
}

enum Step {
    Completed,
    Shutdown,
}

/// Shared controller state plus the per-connection handler.
pub struct Dispatcher<A = TracingAudit> {
    queue: Arc<TaskQueue>,
    results: Arc<ResultSink>,
    run_state: Arc<RunState>,
    audit: Arc<A>,
    settings: Arc<DispatchSettings>,
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            results: self.results.clone(),
            run_state: self.run_state.clone(),
            audit: self.audit.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl Dispatcher {
    /// Dispatch from `queue`, logging audit records through `tracing`.
    pub fn new(queue: Arc<TaskQueue>, settings: DispatchSettings) -> Self {
        Self {
            queue,
            results: Arc::new(ResultSink::new()),
            run_state: Arc::new(RunState::default()),
            audit: Arc::new(TracingAudit),
            settings: Arc::new(settings),
        }
    }
}

impl<A: AuditLog> Dispatcher<A> {
    /// Replace the audit log.
    pub fn with_audit<B: AuditLog>(self, audit: Arc<B>) -> Dispatcher<B> {
        Dispatcher {
            queue: self.queue,
            results: self.results,
            run_state: self.run_state,
            audit,
            settings: self.settings,
        }
    }

    /// Record completed tasks into `results`.
    pub fn with_results(mut self, results: Arc<ResultSink>) -> Self {
        self.results = results;
        self
    }

    /// Share an existing run-state flag.
    pub fn with_run_state(mut self, run_state: Arc<RunState>) -> Self {
        self.run_state = run_state;
        self
    }

    /// Pending tasks.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Completed tasks.
    pub fn results(&self) -> &Arc<ResultSink> {
        &self.results
    }

    /// Run-state flag.
    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    /// Audit log.
    pub fn audit(&self) -> &Arc<A> {
        &self.audit
    }

    /// Dispatch parameters.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Operator handle over the same queue, results and run state.
    pub fn operator(&self, scan_granularity: u8) -> Operator {
        Operator::new(
            self.queue.clone(),
            self.results.clone(),
            self.run_state.clone(),
            scan_granularity,
        )
    }

    /// Serve one worker connection until it shuts down or fails.
    ///
    /// Never panics or returns an error: every failure is local to this
    /// connection and is reported through the audit log and the returned
    /// report.
    pub async fn handle_connection<S>(
        &self,
        mut stream: S,
        worker_id: u64,
        peer: &str,
    ) -> ConnectionReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let started_at = Utc::now();
        tracing::info!("worker {worker_id} connected from {peer}");
        self.audit.append(
            worker_id,
            AuditEvent::Connected {
                peer: peer.to_owned(),
            },
        );

        let mut completed = 0;
        let outcome = loop {
            match self.exchange(&mut stream, worker_id).await {
                Ok(Step::Completed) => completed += 1,
                Ok(Step::Shutdown) => break Outcome::Shutdown,
                Err(kind) => break Outcome::Failed(kind),
            }
        };
        let _ = stream.shutdown().await;

        let connected_for = started.elapsed().as_secs_f64();
        tracing::info!(
            "worker {worker_id} disconnected: {outcome}, {completed} done in {connected_for:.1}s"
        );
        self.audit.append(
            worker_id,
            AuditEvent::Disconnected {
                outcome: outcome.to_string(),
                completed,
                started_at,
                ended_at: Utc::now(),
                connected_for,
            },
        );

        ConnectionReport {
            worker_id,
            completed,
            outcome,
        }
    }

    async fn exchange<S>(&self, stream: &mut S, worker_id: u64) -> Result<Step, FailureKind>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let handshake = tokio::time::timeout(
            self.settings.handshake_timeout,
            Session::handshake(stream, &self.settings.credentials),
        )
        .await;
        let session = match handshake {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!("worker {worker_id}: {e}");
                return Err(FailureKind::Handshake);
            }
            Err(_) => {
                tracing::warn!(
                    "worker {worker_id}: no handshake within {:?}",
                    self.settings.handshake_timeout
                );
                return Err(FailureKind::Handshake);
            }
        };

        let Some(task) = self.next_task().await else {
            let notice = Task::shutdown().stamped(Utc::now(), self.settings.task_ttl);
            if let Err(e) = session.send(stream, &notice).await {
                tracing::warn!("worker {worker_id}: shutdown notice not delivered: {e}");
                return Err(e.kind());
            }
            tracing::debug!("worker {worker_id}: sent shutdown");
            return Ok(Step::Shutdown);
        };

        let wire = task.stamped(Utc::now(), self.settings.task_ttl);
        self.audit.append(
            worker_id,
            AuditEvent::Dispatched {
                task_id: task.id,
                expires: wire.expires.unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        if let Err(e) = session.send(stream, &wire).await {
            return Err(self.requeue(worker_id, task, e).await);
        }

        let received = tokio::time::timeout(
            self.settings.result_timeout,
            session.recv::<_, TaskResult>(stream),
        )
        .await;
        let result = match received {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(self.requeue(worker_id, task, e).await),
            Err(_) => {
                let e = io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for result");
                return Err(self.requeue(worker_id, task, e.into()).await);
            }
        };
        if result.task_id != task.id {
            let e = ProtocolError::Integrity("result answers a different task");
            return Err(self.requeue(worker_id, task, e).await);
        }

        tracing::info!(
            "worker {worker_id}: task {} `{} {}` finished in {:.3}s (exit {:?}{})",
            task.id,
            task.command,
            task.args,
            result.duration,
            result.exit_code,
            if result.timed_out { ", timed out" } else { "" }
        );
        self.audit.append(
            worker_id,
            AuditEvent::Completed {
                task_id: task.id,
                duration: result.duration,
                exit_code: result.exit_code,
                timed_out: result.timed_out,
            },
        );
        let evicted = self.results.record(Completed {
            worker_id,
            task,
            result,
            received_at: Utc::now(),
        });
        if let Some(evicted) = evicted {
            tracing::warn!(
                "result store full ({} held), dropped result of task {}",
                self.results.capacity(),
                evicted.task.id
            );
        }
        Ok(Step::Completed)
    }

    /// The next task to send, or `None` when the worker should be told to
    /// exit (run state is shutdown, the queue is closed, or the queue is
    /// empty under [`EmptyQueuePolicy::Shutdown`]).
    async fn next_task(&self) -> Option<Task> {
        let mut mode = self.run_state.subscribe();
        loop {
            let current = *mode.borrow_and_update();
            match current {
                RunMode::Shutdown => return None,
                RunMode::Pause => {
                    if mode.changed().await.is_err() {
                        return None;
                    }
                    continue;
                }
                RunMode::Continue => {}
            }

            match self.settings.empty_queue {
                EmptyQueuePolicy::Shutdown => return self.queue.try_dequeue(),
                EmptyQueuePolicy::Wait => {
                    tokio::select! {
                        biased;
                        changed = mode.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                        task = self.queue.dequeue() => return task,
                    }
                }
            }
        }
    }

    /// Return the in-flight task to the queue and classify the failure.
    async fn requeue(&self, worker_id: u64, task: Task, error: ProtocolError) -> FailureKind {
        let kind = error.kind();
        tracing::warn!(
            "worker {worker_id}: task {} requeued after {kind} failure: {error}",
            task.id
        );
        self.audit.append(
            worker_id,
            AuditEvent::Requeued {
                task_id: task.id,
                kind,
                error: error.to_string(),
            },
        );
        if let Err(task) = self.queue.enqueue(task).await {
            tracing::error!("queue closed, task {} dropped", task.id);
        }
        kind
    }
}

impl<A> fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &self.queue.len())
            .field("completed", &self.results.len())
            .field("run_state", &self.run_state.get())
            .finish_non_exhaustive()
    }
}
