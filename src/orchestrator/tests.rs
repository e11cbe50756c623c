//! Orchestrator Control-Plane Tests
//!
//! Unit and integration tests for the primary's state machines:
//!
//! - **Registry**: round-robin cursor validity across membership changes.
//! - **Dispatch**: fairness, status/owner coherence, behavior with no workers.
//! - **Failure handling**: redistribution of in-flight work, dead-channel eviction.
//! - **Sessions**: the client handshake and the worker lifecycle over real sockets.
//! - **Replication**: snapshot fidelity.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::common::config::OrchestratorConfig;
use crate::common::connection::Connection;
use crate::common::messages::{Credentials, Envelope, Payload};
use crate::common::task::{Task, TaskStatus};

use super::registry::WorkerRegistry;
use super::replication;
use super::Orchestrator;

fn test_orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default())
}

/// Register a worker backed by a bare channel, standing in for a writer
/// task. Dropping the returned receiver simulates a dead connection.
async fn stub_worker(orchestrator: &Orchestrator, id: &str) -> mpsc::Receiver<Envelope> {
    let (sender, receiver) = mpsc::channel(100);
    orchestrator.workers.add(id.to_string(), sender).await;
    receiver
}

async fn submit(orchestrator: &Orchestrator, id: &str) {
    orchestrator
        .tasks
        .put(Task::new(id, "cliente1", "payload"))
        .await;
    orchestrator.dispatch_task(id).await;
}

/// Serve worker connections on an ephemeral port.
async fn spawn_worker_listener(orchestrator: &Orchestrator) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.handle_worker(stream).await;
            });
        }
    });
    addr
}

/// Serve client connections on an ephemeral port.
async fn spawn_client_listener(orchestrator: &Orchestrator) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.handle_client(stream).await;
            });
        }
    });
    addr
}

async fn read_reply(conn: &mut Connection) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), conn.read_envelope())
        .await
        .expect("timed out waiting for a reply")
        .unwrap()
        .expect("connection closed unexpectedly")
}

// ============================================================
// REGISTRY: round-robin cursor validity
// ============================================================

#[tokio::test]
async fn cursor_stays_in_range_across_membership_changes() {
    let registry = WorkerRegistry::new();
    let (sender, _receiver) = mpsc::channel(1);

    for id in ["worker-1", "worker-2", "worker-3"] {
        registry.add(id.to_string(), sender.clone()).await;
    }

    // Walk the rotation past the end a few times.
    for _ in 0..4 {
        registry.next().await.unwrap();
    }
    assert!(registry.cursor_position().await < registry.len().await);

    // Shrinking the rotation must keep the cursor valid.
    registry.remove("worker-3").await;
    assert!(registry.cursor_position().await < registry.len().await);

    registry.remove("worker-1").await;
    assert!(registry.cursor_position().await < registry.len().await);

    // Removing the last worker resets the cursor.
    registry.remove("worker-2").await;
    assert_eq!(registry.cursor_position().await, 0);
    assert!(registry.next().await.is_none());
}

#[tokio::test]
async fn single_worker_rotation_wraps_in_place() {
    let registry = WorkerRegistry::new();
    let (sender, _receiver) = mpsc::channel(1);
    registry.add("worker-1".to_string(), sender).await;

    for _ in 0..3 {
        let (id, _) = registry.next().await.unwrap();
        assert_eq!(id, "worker-1");
    }
    assert_eq!(registry.cursor_position().await, 0);
}

#[tokio::test]
async fn duplicate_registration_evicts_previous_entry() {
    let orchestrator = test_orchestrator();
    let mut old_receiver = stub_worker(&orchestrator, "worker-1").await;
    let mut new_receiver = stub_worker(&orchestrator, "worker-1").await;

    // The id appears once in the rotation and the old channel is closed.
    assert_eq!(orchestrator.workers.len().await, 1);
    assert!(matches!(
        old_receiver.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));

    submit(&orchestrator, "task-1").await;
    let envelope = new_receiver.recv().await.unwrap();
    assert_eq!(envelope.payload.kind(), "NEW_TASK");
}

// ============================================================
// DISPATCH: fairness and status/owner coherence
// ============================================================

#[tokio::test]
async fn round_robin_splits_work_evenly() {
    let orchestrator = test_orchestrator();
    let mut receivers = Vec::new();
    for i in 1..=3 {
        receivers.push(stub_worker(&orchestrator, &format!("worker-{}", i)).await);
    }

    for i in 0..7 {
        submit(&orchestrator, &format!("task-{}", i)).await;
    }

    // Seven tasks over three workers, in registration order: 3 / 2 / 2.
    let counts: Vec<usize> = receivers
        .iter_mut()
        .map(|receiver| {
            let mut count = 0;
            while receiver.try_recv().is_ok() {
                count += 1;
            }
            count
        })
        .collect();
    assert_eq!(counts, vec![3, 2, 2]);
}

#[tokio::test]
async fn dispatch_marks_task_running_with_its_owner() {
    let orchestrator = test_orchestrator();
    let mut receiver = stub_worker(&orchestrator, "worker-1").await;

    submit(&orchestrator, "task-1").await;

    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.worker_id.as_deref(), Some("worker-1"));
    assert!(stored.lamport > 0);

    let envelope = receiver.recv().await.unwrap();
    match envelope.payload {
        Payload::NewTask(task) => {
            assert_eq!(task.status, TaskStatus::Running);
            assert_eq!(task.worker_id.as_deref(), Some("worker-1"));
            assert!(envelope.lamport >= task.lamport);
        }
        other => panic!("wrong payload kind: {}", other.kind()),
    }
}

#[tokio::test]
async fn dispatch_timestamps_increase_per_worker() {
    let orchestrator = test_orchestrator();
    let mut receiver = stub_worker(&orchestrator, "worker-1").await;

    for i in 0..3 {
        submit(&orchestrator, &format!("task-{}", i)).await;
    }

    let mut previous = 0;
    for _ in 0..3 {
        let envelope = receiver.recv().await.unwrap();
        assert!(envelope.lamport > previous);
        previous = envelope.lamport;
    }
}

#[tokio::test]
async fn submission_without_workers_stays_waiting() {
    let orchestrator = test_orchestrator();

    submit(&orchestrator, "task-1").await;
    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Waiting);
    assert_eq!(stored.worker_id, None);

    // A worker joining later picks up the backlog.
    let mut receiver = stub_worker(&orchestrator, "worker-1").await;
    for task_id in orchestrator.tasks.waiting_ids().await {
        orchestrator.dispatch_task(&task_id).await;
    }

    let envelope = receiver.recv().await.unwrap();
    assert_eq!(envelope.payload.kind(), "NEW_TASK");
    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
}

// ============================================================
// FAILURE HANDLING: redistribution of in-flight work
// ============================================================

#[tokio::test]
async fn worker_failure_redistributes_its_tasks() {
    let orchestrator = test_orchestrator();
    let receiver_one = stub_worker(&orchestrator, "worker-1").await;
    let mut receiver_two = stub_worker(&orchestrator, "worker-2").await;

    submit(&orchestrator, "task-1").await;
    assert_eq!(
        orchestrator.tasks.get("task-1").await.unwrap().worker_id.as_deref(),
        Some("worker-1")
    );

    drop(receiver_one);
    orchestrator.handle_worker_failure("worker-1").await;

    // The task moved to the surviving worker and nothing still points at
    // the dead one.
    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.worker_id.as_deref(), Some("worker-2"));
    assert!(orchestrator.tasks.running_on("worker-1").await.is_empty());
    assert_eq!(orchestrator.workers.len().await, 1);

    let envelope = receiver_two.recv().await.unwrap();
    assert_eq!(envelope.payload.kind(), "NEW_TASK");
}

#[tokio::test]
async fn failure_of_the_last_worker_parks_its_tasks() {
    let orchestrator = test_orchestrator();
    let receiver = stub_worker(&orchestrator, "worker-1").await;

    submit(&orchestrator, "task-1").await;
    drop(receiver);
    orchestrator.handle_worker_failure("worker-1").await;

    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Waiting);
    assert_eq!(stored.worker_id, None);
    assert!(orchestrator.workers.is_empty().await);
}

#[tokio::test]
async fn failure_handling_is_idempotent() {
    let orchestrator = test_orchestrator();
    let receiver = stub_worker(&orchestrator, "worker-1").await;

    submit(&orchestrator, "task-1").await;
    drop(receiver);
    orchestrator.handle_worker_failure("worker-1").await;
    // A second report for the same worker must be a no-op.
    orchestrator.handle_worker_failure("worker-1").await;

    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Waiting);
}

#[tokio::test]
async fn dead_channel_at_dispatch_time_evicts_and_reroutes() {
    let orchestrator = test_orchestrator();
    let receiver_one = stub_worker(&orchestrator, "worker-1").await;
    let mut receiver_two = stub_worker(&orchestrator, "worker-2").await;

    // worker-1 is next in the rotation but its writer is already gone.
    drop(receiver_one);
    submit(&orchestrator, "task-1").await;

    let stored = orchestrator.tasks.get("task-1").await.unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.worker_id.as_deref(), Some("worker-2"));
    assert_eq!(orchestrator.workers.len().await, 1);

    let envelope = receiver_two.recv().await.unwrap();
    assert_eq!(envelope.payload.kind(), "NEW_TASK");
}

// ============================================================
// AUTH REGISTRY
// ============================================================

#[tokio::test]
async fn auth_issues_distinct_tokens_per_login() {
    let orchestrator = test_orchestrator();

    let first = orchestrator.auth.verify("cliente1", "senha123").await.unwrap();
    let second = orchestrator.auth.verify("cliente1", "senha123").await.unwrap();
    assert_ne!(first, second);

    assert_eq!(orchestrator.auth.user_of(&first).await.as_deref(), Some("cliente1"));
    assert_eq!(orchestrator.auth.user_of(&second).await.as_deref(), Some("cliente1"));
}

#[tokio::test]
async fn auth_rejects_bad_credentials() {
    let orchestrator = test_orchestrator();

    assert!(orchestrator.auth.verify("cliente1", "wrong").await.is_none());
    assert!(orchestrator.auth.verify("nobody", "senha123").await.is_none());
    assert!(orchestrator.auth.user_of("not-a-token").await.is_none());
}

// ============================================================
// SESSIONS over real sockets
// ============================================================

#[tokio::test]
async fn client_session_handshake_submit_and_query() {
    let orchestrator = test_orchestrator();
    let addr = spawn_client_listener(&orchestrator).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(stream);

    let auth = Envelope::new(Payload::Authenticate(Credentials {
        username: "cliente1".to_string(),
        password: "senha123".to_string(),
    }))
    .with_lamport(1);
    conn.write_envelope(&auth).await.unwrap();

    let reply = read_reply(&mut conn).await;
    assert!(reply.lamport > 0);
    let token = match reply.payload {
        Payload::AuthOk { token } => token,
        other => panic!("wrong payload kind: {}", other.kind()),
    };

    let submit = Envelope::new(Payload::SubmitTask(Task::new(
        "task-bbb", "cliente1", "render",
    )))
    .with_token(Some(token.clone()))
    .with_lamport(2);
    conn.write_envelope(&submit).await.unwrap();

    let reply = read_reply(&mut conn).await;
    match reply.payload {
        Payload::TaskAccepted { task_id } => assert_eq!(task_id, "task-bbb"),
        other => panic!("wrong payload kind: {}", other.kind()),
    }

    // With no workers the accepted task is parked.
    let query = Envelope::new(Payload::QueryStatus {
        task_id: "task-bbb".to_string(),
    })
    .with_token(Some(token.clone()))
    .with_lamport(3);
    conn.write_envelope(&query).await.unwrap();

    match read_reply(&mut conn).await.payload {
        Payload::StatusReply(Some(task)) => assert_eq!(task.status, TaskStatus::Waiting),
        other => panic!("wrong payload kind: {}", other.kind()),
    }

    // Unknown ids come back empty rather than erroring.
    let query = Envelope::new(Payload::QueryStatus {
        task_id: "task-unknown".to_string(),
    })
    .with_token(Some(token))
    .with_lamport(4);
    conn.write_envelope(&query).await.unwrap();

    match read_reply(&mut conn).await.payload {
        Payload::StatusReply(reply) => assert!(reply.is_none()),
        other => panic!("wrong payload kind: {}", other.kind()),
    }
}

#[tokio::test]
async fn client_session_rejects_bad_password_and_closes() {
    let orchestrator = test_orchestrator();
    let addr = spawn_client_listener(&orchestrator).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(stream);

    let auth = Envelope::new(Payload::Authenticate(Credentials {
        username: "cliente1".to_string(),
        password: "wrong".to_string(),
    }))
    .with_lamport(1);
    conn.write_envelope(&auth).await.unwrap();

    let reply = read_reply(&mut conn).await;
    assert_eq!(reply.payload.kind(), "AUTH_FAIL");

    // The orchestrator hangs up; the next read sees a closed connection.
    let closed = tokio::time::timeout(Duration::from_secs(2), conn.read_envelope())
        .await
        .unwrap()
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn client_session_drops_unauthenticated_requests() {
    let orchestrator = test_orchestrator();
    let addr = spawn_client_listener(&orchestrator).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(stream);

    let submit = Envelope::new(Payload::SubmitTask(Task::new(
        "task-x", "cliente1", "sneaky",
    )))
    .with_lamport(1);
    conn.write_envelope(&submit).await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(2), conn.read_envelope())
        .await
        .unwrap()
        .unwrap();
    assert!(closed.is_none());
    assert!(orchestrator.tasks.get("task-x").await.is_none());
}

#[tokio::test]
async fn worker_session_lifecycle_register_dispatch_complete() {
    let orchestrator = test_orchestrator();
    let addr = spawn_worker_listener(&orchestrator).await;

    // Submitted before any worker exists: parks as waiting.
    submit(&orchestrator, "task-aaa").await;
    assert_eq!(
        orchestrator.tasks.get("task-aaa").await.unwrap().status,
        TaskStatus::Waiting
    );

    // A worker joins and absorbs the backlog.
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(stream);
    conn.write_envelope(&Envelope::new(Payload::RegisterWorker {
        worker_id: "worker-1".to_string(),
    }))
    .await
    .unwrap();

    let envelope = read_reply(&mut conn).await;
    let task = match envelope.payload {
        Payload::NewTask(task) => task,
        other => panic!("wrong payload kind: {}", other.kind()),
    };
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.worker_id.as_deref(), Some("worker-1"));
    assert!(task.lamport > 0);

    // Report completion, echoing the task's stamp.
    let mut done = task.clone();
    done.status = TaskStatus::Done;
    let stamp = done.lamport;
    conn.write_envelope(&Envelope::new(Payload::TaskDone(done)).with_lamport(stamp))
        .await
        .unwrap();

    // The store settles on Done with a later logical time.
    let mut stored = orchestrator.tasks.get("task-aaa").await.unwrap();
    for _ in 0..100 {
        if stored.status == TaskStatus::Done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        stored = orchestrator.tasks.get("task-aaa").await.unwrap();
    }
    assert_eq!(stored.status, TaskStatus::Done);
    // Completion merges the echoed stamp on top of the receive event, so
    // the final logical time is at least two past the dispatch stamp.
    assert!(stored.lamport >= stamp + 2);
    // Only running tasks name an owner.
    assert_eq!(stored.worker_id, None);
}

#[tokio::test]
async fn worker_disconnect_triggers_failure_handling() {
    let orchestrator = test_orchestrator();
    let addr = spawn_worker_listener(&orchestrator).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Connection::new(stream);
    conn.write_envelope(&Envelope::new(Payload::RegisterWorker {
        worker_id: "worker-1".to_string(),
    }))
    .await
    .unwrap();

    submit(&orchestrator, "task-1").await;
    let envelope = read_reply(&mut conn).await;
    assert_eq!(envelope.payload.kind(), "NEW_TASK");

    // Crash the worker mid-task.
    drop(conn);

    // The session loop notices and resets the task.
    let mut stored = orchestrator.tasks.get("task-1").await.unwrap();
    for _ in 0..100 {
        if stored.status == TaskStatus::Waiting {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        stored = orchestrator.tasks.get("task-1").await.unwrap();
    }
    assert_eq!(stored.status, TaskStatus::Waiting);
    assert_eq!(stored.worker_id, None);
    assert!(orchestrator.workers.is_empty().await);
}

// ============================================================
// REPLICATION: snapshot fidelity
// ============================================================

#[tokio::test]
async fn snapshots_mirror_the_global_state() {
    let orchestrator = test_orchestrator();
    let _receiver = stub_worker(&orchestrator, "worker-1").await;

    submit(&orchestrator, "task-1").await;
    submit(&orchestrator, "task-2").await;

    let snapshot =
        replication::snapshot_of(&orchestrator.tasks, &orchestrator.workers, &orchestrator.clock)
            .await;

    assert_eq!(snapshot.tasks.len(), 2);
    assert!(snapshot.workers.contains("worker-1"));
    assert_eq!(snapshot.clock, orchestrator.clock.read());
    assert_eq!(
        snapshot.tasks.get("task-1").unwrap().status,
        TaskStatus::Running
    );

    // The snapshot is a stable copy, not a view.
    orchestrator
        .tasks
        .update("task-1", |task| task.status = TaskStatus::Done)
        .await;
    assert_eq!(
        snapshot.tasks.get("task-1").unwrap().status,
        TaskStatus::Running
    );
}
