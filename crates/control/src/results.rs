//! In-memory sink for completed tasks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use protocol::{Task, TaskResult};
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Results held before the oldest are dropped.
pub const DEFAULT_RESULT_CAPACITY: usize = 1024;

/// A task acknowledged by a worker together with its result.
#[derive(Debug, Clone)]
pub struct Completed {
    /// Connection that ran the task.
    pub worker_id: u64,
    /// The task as it was queued.
    pub task: Task,
    /// What the worker reported.
    pub result: TaskResult,
    /// When the controller accepted the result.
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Held {
    completed: VecDeque<Completed>,
    dropped: u64,
}

/// Completed tasks, appended by dispatch handlers and drained by the operator.
///
/// Holds at most `capacity` results; recording into a full sink evicts the
/// oldest one.
#[derive(Debug)]
pub struct ResultSink {
    held: Mutex<Held>,
    capacity: usize,
    recorded: Notify,
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RESULT_CAPACITY)
    }
}

impl ResultSink {
    /// An empty sink holding up to [`DEFAULT_RESULT_CAPACITY`] results.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty sink holding up to `capacity` results (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            held: Mutex::new(Held::default()),
            capacity: capacity.max(1),
            recorded: Notify::new(),
        }
    }

    /// Maximum results held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a completed task, returning the evicted oldest result when
    /// the sink was full.
    pub fn record(&self, completed: Completed) -> Option<Completed> {
        let evicted = {
            let mut held = self.held.lock();
            let evicted = if held.completed.len() >= self.capacity {
                held.dropped += 1;
                held.completed.pop_front()
            } else {
                None
            };
            held.completed.push_back(completed);
            evicted
        };
        self.recorded.notify_one();
        evicted
    }

    /// Number of results held.
    pub fn len(&self) -> usize {
        self.held.lock().completed.len()
    }

    /// Whether no result is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Results evicted because the sink was full.
    pub fn dropped(&self) -> u64 {
        self.held.lock().dropped
    }

    /// Copy of every held result, in arrival order.
    pub fn snapshot(&self) -> Vec<Completed> {
        self.held.lock().completed.iter().cloned().collect()
    }

    /// Remove and return every held result.
    pub fn drain(&self) -> Vec<Completed> {
        self.held.lock().completed.drain(..).collect()
    }

    /// Wait until at least one result is held, then drain.
    ///
    /// Meant for a single consumer; concurrent callers may each be woken
    /// for the same record.
    pub async fn next_batch(&self) -> Vec<Completed> {
        loop {
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            self.recorded.notified().await;
        }
    }
}
