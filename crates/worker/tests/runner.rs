//! Worker loop tests against a scripted controller.

use chrono::{TimeDelta, Utc};
use drover_worker::{Executor, Worker, WorkerError, WorkerSummary};
use protocol::{Credentials, FailureKind, Session, Task, TaskResult};
use std::time::Duration;
use tokio::io::DuplexStream;

const PASSWORD: &str = "correct horse battery staple";

fn credentials() -> Credentials {
    Credentials::from_password(PASSWORD, 2048).unwrap()
}

fn worker(credentials: Credentials) -> Worker {
    Worker::new("unused", credentials, Executor::new(Duration::from_secs(10)))
}

/// Controller half of one exchange: handshake and send `task`.
async fn dispatch(stream: &mut DuplexStream, task: &Task) -> Session {
    let session = Session::handshake(stream, &credentials()).await.unwrap();
    session.send(stream, task).await.unwrap();
    session
}

#[tokio::test]
async fn runs_task_then_stops() {
    let (mut controller, stream) = tokio::io::duplex(64 * 1024);
    let running = tokio::spawn(async move { worker(credentials()).run_on(stream).await });

    let task = Task::exec("echo", "hello").stamped(Utc::now(), TimeDelta::minutes(1));
    let session = dispatch(&mut controller, &task).await;
    let result: TaskResult = session.recv(&mut controller).await.unwrap();
    assert_eq!(result.task_id, task.id);
    assert_eq!(result.output, "hello\n");
    assert_eq!(result.exit_code, Some(0));

    let stop = Task::shutdown().stamped(Utc::now(), TimeDelta::minutes(1));
    dispatch(&mut controller, &stop).await;

    let summary = running.await.unwrap().unwrap();
    assert_eq!(
        summary,
        WorkerSummary {
            completed: 1,
            expired: 0
        }
    );
}

#[tokio::test]
async fn expired_task_is_never_executed() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");

    let (mut controller, stream) = tokio::io::duplex(64 * 1024);
    let running = tokio::spawn(async move { worker(credentials()).run_on(stream).await });

    let mut stale = Task::exec("touch", marker.display().to_string());
    stale.expires = Some(Utc::now() - TimeDelta::seconds(5));
    dispatch(&mut controller, &stale).await;

    // The worker drops the task silently and starts the next exchange.
    let stop = Task::shutdown().stamped(Utc::now(), TimeDelta::minutes(1));
    dispatch(&mut controller, &stop).await;

    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.expired, 1);
    assert_eq!(summary.completed, 0);
    assert!(!marker.exists());
}

#[tokio::test]
async fn wrong_password_ends_session() {
    let (mut controller, stream) = tokio::io::duplex(64 * 1024);
    let imposter = Credentials::from_password("guess", 2048).unwrap();
    let running = tokio::spawn(async move { worker(imposter).run_on(stream).await });

    let task = Task::exec("echo", "secret").stamped(Utc::now(), TimeDelta::minutes(1));
    dispatch(&mut controller, &task).await;

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkerError::Protocol(ref e) if e.kind() == FailureKind::Authentication));
}

#[tokio::test]
async fn spawn_failure_ends_session() {
    let (mut controller, stream) = tokio::io::duplex(64 * 1024);
    let running = tokio::spawn(async move { worker(credentials()).run_on(stream).await });

    let task = Task::exec("/drover/no/such/binary", "").stamped(Utc::now(), TimeDelta::minutes(1));
    let session = dispatch(&mut controller, &task).await;

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkerError::Execution(_)));

    // The controller sees the connection close instead of a result.
    let closed = session.recv::<_, TaskResult>(&mut controller).await.unwrap_err();
    assert_eq!(closed.kind(), FailureKind::Transport);
}

#[tokio::test]
async fn controller_gone_is_protocol_error() {
    let (controller, stream) = tokio::io::duplex(64 * 1024);
    drop(controller);
    let err = worker(credentials()).run_on(stream).await.unwrap_err();
    assert!(matches!(err, WorkerError::Protocol(ref e) if e.kind() == FailureKind::Handshake));
}

#[tokio::test]
async fn connect_failure() {
    // Reserve a port, then release it so nothing listens there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let worker = Worker::new(address, credentials(), Executor::new(Duration::from_secs(1)));
    assert!(matches!(worker.run().await, Err(WorkerError::Connect { .. })));
}
