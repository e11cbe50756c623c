//! # Replication Sender
//!
//! Streams global-state snapshots to the standby orchestrator over a single
//! connection. Snapshots are queued through a bounded channel so the primary
//! never blocks user-facing work on replication; a background task owns the
//! connection, reconnects with a fixed backoff, and pushes a freshly built
//! full snapshot immediately after every (re)connect.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::common::clock::LamportClock;
use crate::common::connection::Connection;
use crate::common::messages::{Envelope, Payload, StateSnapshot};

use super::registry::WorkerRegistry;
use super::store::TaskStore;

/// Capacity of the snapshot queue between the control plane and the sender.
const PUSH_QUEUE_SIZE: usize = 64;

/// Cheap handle for pushing snapshots from anywhere in the control plane.
#[derive(Clone)]
pub struct ReplicationHandle {
    sender: mpsc::Sender<StateSnapshot>,
}

impl ReplicationHandle {
    /// Queue a snapshot for delivery. When the queue is full the snapshot
    /// is dropped: the next successful push carries complete state anyway,
    /// and every reconnect starts with a full snapshot.
    pub fn push(&self, snapshot: StateSnapshot) {
        if self.sender.try_send(snapshot).is_err() {
            warn!("replication queue full, dropping snapshot");
        }
    }
}

/// Build a stable copy of the global state.
pub(crate) async fn snapshot_of(
    tasks: &TaskStore,
    workers: &WorkerRegistry,
    clock: &LamportClock,
) -> StateSnapshot {
    StateSnapshot {
        tasks: tasks.snapshot().await,
        workers: workers.snapshot_ids().await,
        clock: clock.read(),
    }
}

/// Start the background replication task and return a push handle.
pub(crate) fn spawn(
    standby_addr: String,
    backoff_secs: u64,
    tasks: Arc<TaskStore>,
    workers: Arc<WorkerRegistry>,
    clock: Arc<LamportClock>,
) -> ReplicationHandle {
    let (sender, receiver) = mpsc::channel(PUSH_QUEUE_SIZE);
    tokio::spawn(run(
        standby_addr,
        Duration::from_secs(backoff_secs),
        receiver,
        tasks,
        workers,
        clock,
    ));
    ReplicationHandle { sender }
}

async fn run(
    standby_addr: String,
    backoff: Duration,
    mut queue: mpsc::Receiver<StateSnapshot>,
    tasks: Arc<TaskStore>,
    workers: Arc<WorkerRegistry>,
    clock: Arc<LamportClock>,
) {
    loop {
        let stream = connect_with_backoff(&standby_addr, backoff).await;
        info!("🔗 connected to the standby orchestrator");
        let mut conn = Connection::new(stream);

        // Bring the standby up to date before forwarding queued pushes.
        let snapshot = snapshot_of(&tasks, &workers, &clock).await;
        if let Err(e) = write_snapshot(&mut conn, snapshot).await {
            warn!("failed to sync with the standby: {}", e);
            continue;
        }

        loop {
            let Some(snapshot) = queue.recv().await else {
                // The orchestrator is gone; nothing left to replicate.
                return;
            };
            if let Err(e) = write_snapshot(&mut conn, snapshot).await {
                warn!("lost connection to the standby: {}, reconnecting", e);
                break;
            }
        }
    }
}

async fn connect_with_backoff(addr: &str, backoff: Duration) -> TcpStream {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return stream,
            Err(_) => {
                info!("waiting for the standby orchestrator at {}...", addr);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn write_snapshot(conn: &mut Connection, snapshot: StateSnapshot) -> anyhow::Result<()> {
    let lamport = snapshot.clock;
    let envelope = Envelope::new(Payload::SyncState(snapshot)).with_lamport(lamport);
    conn.write_envelope(&envelope).await
}
