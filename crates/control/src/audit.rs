//! Audit log collaborator: one record per connection lifecycle event.
//!
//! Appends are fire-and-forget; an implementation must never block or fail
//! the dispatch loop.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use protocol::FailureKind;
use ulid::Ulid;

/// A connection lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// A worker connection was accepted.
    Connected {
        /// Peer address.
        peer: String,
    },
    /// A task was sent to the worker.
    Dispatched {
        /// Task id.
        task_id: Ulid,
        /// Deadline stamped on the wire copy.
        expires: DateTime<Utc>,
    },
    /// The worker acknowledged a task with a result.
    Completed {
        /// Task id.
        task_id: Ulid,
        /// Execution seconds reported by the worker.
        duration: f64,
        /// Process exit code.
        exit_code: Option<i32>,
        /// Whether the worker killed the command on timeout.
        timed_out: bool,
    },
    /// An in-flight task went back to the queue.
    Requeued {
        /// Task id.
        task_id: Ulid,
        /// Failure class.
        kind: FailureKind,
        /// Error text.
        error: String,
    },
    /// The connection ended.
    Disconnected {
        /// How it ended.
        outcome: String,
        /// Tasks completed on this connection.
        completed: usize,
        /// When the connection was accepted.
        started_at: DateTime<Utc>,
        /// When the connection closed.
        ended_at: DateTime<Utc>,
        /// Seconds the connection was open.
        connected_for: f64,
    },
}

/// Destination for audit records.
pub trait AuditLog: Send + Sync + 'static {
    /// Record an event for a worker connection.
    fn append(&self, worker_id: u64, event: AuditEvent);
}

/// Emits audit records as `tracing` events on the `drover::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditLog for TracingAudit {
    fn append(&self, worker_id: u64, event: AuditEvent) {
        match event {
            AuditEvent::Connected { peer } => {
                tracing::info!(target: "drover::audit", worker = worker_id, %peer, "connected");
            }
            AuditEvent::Dispatched { task_id, expires } => {
                tracing::debug!(
                    target: "drover::audit",
                    worker = worker_id,
                    %task_id,
                    %expires,
                    "dispatched"
                );
            }
            AuditEvent::Completed {
                task_id,
                duration,
                exit_code,
                timed_out,
            } => {
                tracing::info!(
                    target: "drover::audit",
                    worker = worker_id,
                    %task_id,
                    duration,
                    ?exit_code,
                    timed_out,
                    "completed"
                );
            }
            AuditEvent::Requeued {
                task_id,
                kind,
                error,
            } => {
                tracing::warn!(
                    target: "drover::audit",
                    worker = worker_id,
                    %task_id,
                    %kind,
                    %error,
                    "requeued"
                );
            }
            AuditEvent::Disconnected {
                outcome,
                completed,
                started_at,
                ended_at,
                connected_for,
            } => {
                tracing::info!(
                    target: "drover::audit",
                    worker = worker_id,
                    %outcome,
                    completed,
                    %started_at,
                    %ended_at,
                    connected_for,
                    "disconnected"
                );
            }
        }
    }
}

/// Keeps every record in memory, for embedding and inspection.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<(u64, AuditEvent)>>,
}

impl MemoryAudit {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record, in append order.
    pub fn events(&self) -> Vec<(u64, AuditEvent)> {
        self.events.lock().clone()
    }

    /// Records for one worker connection.
    pub fn for_worker(&self, worker_id: u64) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == worker_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl AuditLog for MemoryAudit {
    fn append(&self, worker_id: u64, event: AuditEvent) {
        self.events.lock().push((worker_id, event));
    }
}
