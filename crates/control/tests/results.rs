//! Result store tests.

use chrono::Utc;
use drover_control::{Completed, ResultSink};
use protocol::{Task, TaskResult};
use std::{sync::Arc, time::Duration};

fn completed(n: usize) -> Completed {
    let task = Task::exec("echo", n.to_string());
    Completed {
        worker_id: 1,
        result: TaskResult {
            task_id: task.id,
            output: format!("{n}\n"),
            duration: 0.01,
            exit_code: Some(0),
            timed_out: false,
            truncated: false,
        },
        task,
        received_at: Utc::now(),
    }
}

#[test]
fn stays_bounded_when_nobody_drains() {
    let sink = ResultSink::with_capacity(3);
    let entries: Vec<_> = (0..10).map(completed).collect();
    for entry in entries.iter().cloned() {
        sink.record(entry);
    }

    assert_eq!(sink.len(), 3);
    assert_eq!(sink.dropped(), 7);
    let held: Vec<_> = sink.snapshot().into_iter().map(|c| c.task.id).collect();
    let newest: Vec<_> = entries[7..].iter().map(|c| c.task.id).collect();
    assert_eq!(held, newest);
}

#[test]
fn record_returns_evicted() {
    let sink = ResultSink::with_capacity(1);
    let first = completed(1);
    assert!(sink.record(first.clone()).is_none());
    let evicted = sink.record(completed(2)).unwrap();
    assert_eq!(evicted.task.id, first.task.id);
}

#[test]
fn zero_capacity_holds_one() {
    let sink = ResultSink::with_capacity(0);
    assert_eq!(sink.capacity(), 1);
    sink.record(completed(1));
    assert_eq!(sink.len(), 1);
}

#[test]
fn drain_empties() {
    let sink = ResultSink::new();
    sink.record(completed(1));
    sink.record(completed(2));
    assert_eq!(sink.drain().len(), 2);
    assert!(sink.is_empty());
    assert_eq!(sink.dropped(), 0);
}

#[tokio::test]
async fn next_batch_wakes_on_record() {
    let sink = Arc::new(ResultSink::new());
    let waiting = {
        let sink = sink.clone();
        tokio::spawn(async move { sink.next_batch().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    let entry = completed(5);
    sink.record(entry.clone());
    let batch = waiting.await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].task.id, entry.task.id);
    assert!(sink.is_empty());
}
