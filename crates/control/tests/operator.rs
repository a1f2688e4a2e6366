//! Operator command parsing and execution.

use chrono::Utc;
use drover_control::{
    Completed, Dispatcher, DispatchSettings, OperatorCommand, RunMode, TaskQueue,
};
use protocol::{Credentials, Task, TaskResult};
use std::sync::Arc;

fn dispatcher(capacity: usize) -> Dispatcher {
    let credentials = Credentials::from_password("pw", 2048).unwrap();
    Dispatcher::new(
        Arc::new(TaskQueue::new(capacity)),
        DispatchSettings::new(credentials),
    )
}

#[test]
fn parse_add() {
    assert_eq!(
        OperatorCommand::parse("add  nmap -sn   10.0.0.1").unwrap(),
        OperatorCommand::Add {
            command: "nmap".into(),
            args: "-sn 10.0.0.1".into(),
        }
    );
    assert_eq!(
        OperatorCommand::parse("ADD uptime").unwrap(),
        OperatorCommand::Add {
            command: "uptime".into(),
            args: String::new(),
        }
    );
    assert!(OperatorCommand::parse("add").is_err());
}

#[test]
fn parse_scan() {
    let cmd = OperatorCommand::parse("scan 10.0.0.0/16 nmap -sn").unwrap();
    assert_eq!(
        cmd,
        OperatorCommand::Scan {
            range: "10.0.0.0/16".parse().unwrap(),
            command: "nmap".into(),
            args: "-sn".into(),
        }
    );

    let single = OperatorCommand::parse("scan 192.168.1.5 ping -c1").unwrap();
    assert!(matches!(single, OperatorCommand::Scan { range, .. } if range.prefix_len() == 32));

    assert!(OperatorCommand::parse("scan 10.0.0.0/16").is_err());
    assert!(OperatorCommand::parse("scan not-a-range nmap").is_err());
}

#[test]
fn parse_status_and_simple_commands() {
    assert_eq!(
        OperatorCommand::parse("status pause").unwrap(),
        OperatorCommand::Status(RunMode::Pause)
    );
    assert_eq!(
        OperatorCommand::parse("status exit").unwrap(),
        OperatorCommand::Status(RunMode::Shutdown)
    );
    assert!(OperatorCommand::parse("status sleepy").is_err());
    assert_eq!(OperatorCommand::parse("queue").unwrap(), OperatorCommand::Queue);
    assert_eq!(OperatorCommand::parse("results").unwrap(), OperatorCommand::Results);
    assert_eq!(OperatorCommand::parse("help").unwrap(), OperatorCommand::Help);
    assert!(OperatorCommand::parse("   ").is_err());
    assert!(OperatorCommand::parse("launch rockets").is_err());
}

#[tokio::test]
async fn enqueue_single_and_bulk() {
    let dispatcher = dispatcher(16);
    let operator = dispatcher.operator(24);

    let id = operator.enqueue_single("uname", "-a").await.unwrap();
    let queued = operator
        .enqueue_bulk(vec![Task::exec("true", ""), Task::exec("false", "")])
        .await
        .unwrap();
    assert_eq!(queued, 2);
    assert_eq!(operator.queue_len(), 3);

    let pending = dispatcher.queue().snapshot();
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[2].command, "false");
}

#[tokio::test]
async fn enqueue_scan_uses_configured_granularity() {
    let dispatcher = dispatcher(1024);
    let operator = dispatcher.operator(26);

    let queued = operator
        .enqueue_scan("10.0.0.0/24".parse().unwrap(), None, "nmap", "-sn")
        .await
        .unwrap();
    assert_eq!(queued, 4);

    let queued = operator
        .enqueue_scan("10.0.1.0/24".parse().unwrap(), Some(25), "nmap", "-sn")
        .await
        .unwrap();
    assert_eq!(queued, 2);
    assert_eq!(dispatcher.queue().snapshot()[4].args, "-sn 10.0.1.0/25");
}

#[tokio::test]
async fn status_changes_run_state() {
    let dispatcher = dispatcher(4);
    let operator = dispatcher.operator(24);

    let reply = operator
        .execute(OperatorCommand::Status(RunMode::Pause))
        .await
        .unwrap();
    assert_eq!(reply, "run state continue -> pause");
    assert_eq!(dispatcher.run_state().get(), RunMode::Pause);
    assert_eq!(operator.set_run_state(RunMode::Continue), RunMode::Pause);
}

#[tokio::test]
async fn results_are_drained_once() {
    let dispatcher = dispatcher(4);
    let operator = dispatcher.operator(24);
    assert_eq!(operator.execute(OperatorCommand::Results).await.unwrap(), "no results");

    let task = Task::exec("echo", "hi");
    dispatcher.results().record(Completed {
        worker_id: 2,
        result: TaskResult {
            task_id: task.id,
            output: "hi\n".into(),
            duration: 0.25,
            exit_code: Some(0),
            timed_out: false,
            truncated: false,
        },
        task: task.clone(),
        received_at: Utc::now(),
    });

    let reply = operator.execute(OperatorCommand::Results).await.unwrap();
    assert!(reply.starts_with(&format!("[worker 2] {} echo hi (0.250s, exit 0)", task.id)));
    assert!(reply.ends_with("\nhi"));
    assert!(dispatcher.results().is_empty());
}

#[tokio::test]
async fn queue_listing() {
    let dispatcher = dispatcher(4);
    let operator = dispatcher.operator(24);
    operator
        .execute(OperatorCommand::parse("add whoami").unwrap())
        .await
        .unwrap();

    let reply = operator.execute(OperatorCommand::Queue).await.unwrap();
    assert!(reply.starts_with("1 pending (capacity 4), run state continue"));
    assert!(reply.contains("whoami"));
}

#[tokio::test]
async fn next_results_waits_for_a_result() {
    let dispatcher = dispatcher(4);
    let operator = dispatcher.operator(24);
    let printer = tokio::spawn(async move { operator.next_results().await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!printer.is_finished());

    let task = Task::exec("yes", "");
    dispatcher.results().record(Completed {
        worker_id: 1,
        result: TaskResult {
            task_id: task.id,
            output: "y\ny\n".into(),
            duration: 1.0,
            exit_code: Some(0),
            timed_out: false,
            truncated: true,
        },
        task: task.clone(),
        received_at: Utc::now(),
    });

    let reply = printer.await.unwrap();
    assert!(reply.starts_with(&format!("[worker 1] {} yes", task.id)));
    assert!(reply.ends_with("y\ny\n[output truncated]"));
    assert!(dispatcher.results().is_empty());
}
