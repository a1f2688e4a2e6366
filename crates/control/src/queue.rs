//! Bounded FIFO of pending tasks, shared by every dispatch handler.
//!
//! Two semaphores mirror the deque: `slots` counts free capacity and
//! `items` counts queued tasks. A permit is always taken before the deque is
//! touched and handed to the other semaphore afterwards, so both waits are
//! cancel-safe.

use parking_lot::Mutex;
use protocol::Task;
use std::collections::VecDeque;
use tokio::sync::Semaphore;

/// Pending tasks. Producers block when full, consumers block when empty.
#[derive(Debug)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    slots: Semaphore,
    items: Semaphore,
    capacity: usize,
}

impl TaskQueue {
    /// An empty queue holding at most `capacity` tasks (at least one).
    pub fn new(capacity: usize) -> Self {
        Self::with_tasks(capacity, Vec::new())
    }

    /// A queue pre-filled with `tasks`. Capacity grows to fit them.
    pub fn with_tasks(capacity: usize, tasks: Vec<Task>) -> Self {
        let capacity = capacity.max(tasks.len()).max(1);
        let queued = tasks.len();
        Self {
            tasks: Mutex::new(tasks.into()),
            slots: Semaphore::new(capacity - queued),
            items: Semaphore::new(queued),
            capacity,
        }
    }

    /// Append a task, waiting for room when the queue is full.
    ///
    /// Hands the task back if the queue has been closed.
    pub async fn enqueue(&self, task: Task) -> Result<(), Task> {
        match self.slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(task),
        }
        self.push(task);
        Ok(())
    }

    /// Append a task if there is room right now.
    pub fn try_enqueue(&self, task: Task) -> Result<(), Task> {
        match self.slots.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(task),
        }
        self.push(task);
        Ok(())
    }

    /// Take the oldest task, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Task> {
        self.items.acquire().await.ok()?.forget();
        self.pop()
    }

    /// Take the oldest task if one is queued.
    pub fn try_dequeue(&self) -> Option<Task> {
        self.items.try_acquire().ok()?.forget();
        self.pop()
    }

    /// Number of queued tasks. Approximate under concurrency.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the queued tasks, oldest first.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().iter().cloned().collect()
    }

    /// Wake every waiter; further enqueues and dequeues fail.
    /// Queued tasks stay visible through [`TaskQueue::snapshot`].
    pub fn close(&self) {
        self.slots.close();
        self.items.close();
    }

    fn push(&self, task: Task) {
        self.tasks.lock().push_back(task);
        self.items.add_permits(1);
    }

    fn pop(&self) -> Option<Task> {
        let task = self.tasks.lock().pop_front();
        self.slots.add_permits(1);
        task
    }
}
