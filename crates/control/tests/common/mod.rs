//! Scripted worker side of the protocol, driven over in-memory streams.

#![allow(dead_code)]

use drover_control::{DispatchSettings, Dispatcher, EmptyQueuePolicy, MemoryAudit, TaskQueue};
use protocol::{Credentials, Session, Task, TaskResult};
use std::sync::Arc;
use tokio::io::DuplexStream;

pub const PASSWORD: &str = "correct horse battery staple";

pub fn credentials() -> Credentials {
    Credentials::from_password(PASSWORD, 2048).unwrap()
}

pub fn settings(empty_queue: EmptyQueuePolicy) -> DispatchSettings {
    DispatchSettings {
        empty_queue,
        ..DispatchSettings::new(credentials())
    }
}

pub fn tasks(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| Task::exec("echo", format!("task-{i}")))
        .collect()
}

/// Dispatcher over `tasks` recording audit events in memory.
pub fn dispatcher(
    tasks: Vec<Task>,
    capacity: usize,
    settings: DispatchSettings,
) -> Dispatcher<MemoryAudit> {
    let queue = Arc::new(TaskQueue::with_tasks(capacity, tasks));
    Dispatcher::new(queue, settings).with_audit(Arc::new(MemoryAudit::new()))
}

/// A connected controller/worker stream pair.
pub fn pipe() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(64 * 1024)
}

/// Worker half of one exchange up to receiving the task.
pub async fn receive(stream: &mut DuplexStream, credentials: &Credentials) -> (Session, Task) {
    let session = Session::handshake(stream, credentials).await.unwrap();
    let task: Task = session.recv(stream).await.unwrap();
    (session, task)
}

/// Worker half of one exchange: receive a task and acknowledge it
/// without running anything.
pub async fn complete(stream: &mut DuplexStream, credentials: &Credentials) -> Task {
    let (session, task) = receive(stream, credentials).await;
    if task.status == protocol::TaskStatus::Continue {
        session.send(stream, &result_for(&task)).await.unwrap();
    }
    task
}

pub fn result_for(task: &Task) -> TaskResult {
    TaskResult {
        task_id: task.id,
        output: format!("{} {}\n", task.command, task.args),
        duration: 0.01,
        exit_code: Some(0),
        timed_out: false,
        truncated: false,
    }
}

pub fn sorted_ids(tasks: &[Task]) -> Vec<ulid::Ulid> {
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    ids.sort();
    ids
}
