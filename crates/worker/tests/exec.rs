//! Command executor tests. Unix commands only.

use drover_worker::{ExecError, Executor};
use protocol::{Task, session::MAX_OUTPUT_SIZE};
use std::time::Duration;

fn executor() -> Executor {
    Executor::new(Duration::from_secs(10))
}

#[tokio::test]
async fn captures_stdout() {
    let task = Task::exec("echo", "hello   world");
    let result = executor().execute(&task).await.unwrap();
    assert_eq!(result.task_id, task.id);
    assert_eq!(result.output, "hello world\n");
    assert_eq!(result.exit_code, Some(0));
    assert!(result.succeeded());
    assert!(result.duration >= 0.0);
}

#[tokio::test]
async fn captures_stderr_and_exit_code() {
    let task = Task::exec("ls", "/drover/definitely/not/here");
    let result = executor().execute(&task).await.unwrap();
    assert!(!result.succeeded());
    assert_ne!(result.exit_code, Some(0));
    assert!(result.output.contains("/drover/definitely/not/here"));
}

#[tokio::test]
async fn nonzero_exit_is_a_result() {
    let result = executor().execute(&Task::exec("false", "")).await.unwrap();
    assert_eq!(result.exit_code, Some(1));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn hung_command_is_killed() {
    let executor = Executor::new(Duration::from_millis(200));
    let result = executor.execute(&Task::exec("sleep", "30")).await.unwrap();
    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert!(result.duration < 10.0);
}

#[tokio::test]
async fn missing_binary_is_spawn_error() {
    let task = Task::exec("/drover/no/such/binary", "--flag");
    let err = executor().execute(&task).await.unwrap_err();
    assert!(matches!(
        err,
        ExecError::Spawn { ref command, .. } if command == "/drover/no/such/binary"
    ));
}

#[tokio::test]
async fn streams_interleave_in_write_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("mixed.sh");
    std::fs::write(&script, "echo one\necho two >&2\necho three\n").unwrap();

    let task = Task::exec("sh", script.display().to_string());
    let result = executor().execute(&task).await.unwrap();
    assert_eq!(result.output, "one\ntwo\nthree\n");
    assert!(!result.truncated);
}

#[tokio::test]
async fn output_past_limit_is_truncated() {
    let executor = executor().with_output_limit(4);
    let result = executor.execute(&Task::exec("echo", "hello")).await.unwrap();
    assert_eq!(result.output, "hell");
    assert!(result.truncated);
    assert_eq!(result.exit_code, Some(0));
}

#[tokio::test]
async fn oversized_output_is_capped_and_drained() {
    // NUL bytes are the worst case for the JSON payload.
    let task = Task::exec("head", "-c 20000000 /dev/zero");
    let result = executor().execute(&task).await.unwrap();
    assert!(result.truncated);
    assert_eq!(result.output.len(), MAX_OUTPUT_SIZE);
    assert_eq!(result.exit_code, Some(0));
}

#[test]
fn output_limit_is_clamped() {
    let executor = executor().with_output_limit(usize::MAX);
    assert_eq!(executor.output_limit(), MAX_OUTPUT_SIZE);
    assert_eq!(Executor::new(Duration::from_secs(1)).output_limit(), MAX_OUTPUT_SIZE);
}
