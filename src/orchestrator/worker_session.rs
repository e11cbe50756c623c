//! # Worker Session Handler
//!
//! Per-connection state machine for workers: registration, then heartbeats
//! and completion reports. On registration the connection's write half is
//! handed to a dedicated writer task fed by the registry's mpsc sender, so
//! dispatches to this worker are serialized while the session loop keeps
//! reading. Any transport error is treated as a worker failure.

use log::{debug, error, info, warn};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::common::connection::{Connection, FramedWriter};
use crate::common::messages::{Envelope, Payload};
use crate::common::task::TaskStatus;

use super::Orchestrator;

/// Capacity of a worker's outbound queue.
const WORKER_QUEUE_SIZE: usize = 100;

impl Orchestrator {
    /// Serve one worker connection until it drops.
    pub(crate) async fn handle_worker(&self, stream: TcpStream) {
        let (mut reader, writer) = Connection::new(stream).into_split();
        let mut writer = Some(writer);
        let mut worker_id: Option<String> = None;

        loop {
            let envelope = match reader.read_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading from worker: {}", e);
                    break;
                }
            };

            // Workers keep no clock of their own: bare messages arrive with
            // lamport 0 and count as a local receive event; a completion
            // report carries the task's stamp and merges.
            if envelope.lamport > 0 {
                self.clock.merge(envelope.lamport);
            } else {
                self.clock.tick();
            }

            match envelope.payload {
                Payload::RegisterWorker { worker_id: id } => {
                    let Some(write_half) = writer.take() else {
                        warn!("worker {} sent a second registration, ignoring", id);
                        continue;
                    };

                    let (sender, receiver) = mpsc::channel(WORKER_QUEUE_SIZE);
                    self.workers.add(id.clone(), sender).await;
                    worker_id = Some(id.clone());
                    info!(
                        "🤝 worker {} registered, {} workers active",
                        id,
                        self.workers.len().await
                    );

                    let orchestrator = self.clone();
                    let writer_id = id.clone();
                    tokio::spawn(async move {
                        run_worker_writer(orchestrator, writer_id, receiver, write_half).await;
                    });

                    self.replicate().await;

                    // A newcomer absorbs the backlog: re-dispatch every
                    // waiting task, oldest first.
                    for task_id in self.tasks.waiting_ids().await {
                        self.dispatch_task(&task_id).await;
                    }
                }
                Payload::Heartbeat { .. } => {
                    let Some(id) = &worker_id else {
                        warn!("heartbeat from unregistered worker, closing connection");
                        break;
                    };
                    self.workers.touch(id).await;
                }
                Payload::TaskDone(done) => {
                    if worker_id.is_none() {
                        warn!("completion report from unregistered worker, closing connection");
                        break;
                    }
                    // The report carries the stamp the task was dispatched
                    // with; merging it orders the completion after the
                    // dispatch even if this connection raced ahead.
                    self.clock.merge(done.lamport);
                    let stamp = self.clock.read();
                    let updated = self
                        .tasks
                        .update(&done.id, |task| {
                            task.status = TaskStatus::Done;
                            task.worker_id = None;
                            task.lamport = stamp;
                        })
                        .await;
                    match updated {
                        Some(task) => {
                            info!(
                                "✅ task {} completed by worker {} | clock {}",
                                task.id,
                                done.worker_id.as_deref().unwrap_or("?"),
                                stamp
                            );
                            self.replicate().await;
                        }
                        None => warn!("completion report for unknown task {}", done.id),
                    }
                }
                other => {
                    warn!("unknown worker message {}, ignoring", other.kind());
                }
            }
        }

        if let Some(id) = worker_id {
            warn!("🔌 connection to worker {} lost", id);
            self.handle_worker_failure(&id).await;
        } else {
            debug!("worker connection closed before registration");
        }
    }
}

/// Forward queued envelopes to one worker's socket. Ends when the registry
/// drops the sender (eviction) or a write fails, in which case the worker is
/// reported as failed.
async fn run_worker_writer(
    orchestrator: Orchestrator,
    worker_id: String,
    mut receiver: mpsc::Receiver<Envelope>,
    mut writer: FramedWriter<OwnedWriteHalf>,
) {
    loop {
        let Some(envelope) = receiver.recv().await else {
            // Evicted from the registry; dropping the write half closes our
            // side of the socket.
            break;
        };
        if let Err(e) = writer.write_envelope(&envelope).await {
            error!("failed to write to worker {}: {}", worker_id, e);
            // Close the queue first so in-progress dispatches fail fast
            // instead of piling onto a dead connection.
            drop(receiver);
            orchestrator.handle_worker_failure(&worker_id).await;
            return;
        }
    }
    debug!("writer for worker {} shut down", worker_id);
}
