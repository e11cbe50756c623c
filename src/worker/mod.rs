//! # Worker Node
//!
//! A remote process that executes tasks. It registers with the orchestrator,
//! sends a heartbeat every few seconds, and processes whatever `NewTask`
//! envelopes arrive. Processing is simulated: the worker sleeps for a random
//! interval and occasionally kills its own process to exercise the
//! orchestrator's failure handling.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::connection::{Connection, FramedWriter};
use crate::common::messages::{Envelope, Payload};
use crate::common::task::{Task, TaskStatus};

/// Seconds between heartbeats.
const HEARTBEAT_INTERVAL_SECS: u64 = 5;
/// Simulated processing time bounds, milliseconds.
const MIN_PROCESSING_MS: u64 = 2_000;
const MAX_PROCESSING_MS: u64 = 10_000;
/// Chance (percent) that processing ends in a simulated crash.
const CRASH_CHANCE_PERCENT: u32 = 20;

/// One worker process.
pub struct WorkerNode {
    id: String,
    orchestrator_addr: String,
}

impl WorkerNode {
    pub fn new(host: &str, port: u16) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("worker-{}", &suffix[..8]),
            orchestrator_addr: format!("{}:{}", host, port),
        }
    }

    /// Connect, register, heartbeat, and process tasks until the connection
    /// drops. The orchestrator detects our death on its own; no farewell is
    /// sent.
    pub async fn run(&self) -> Result<()> {
        info!("🚀 {} starting", self.id);
        let stream = TcpStream::connect(&self.orchestrator_addr)
            .await
            .with_context(|| format!("failed to reach the orchestrator at {}", self.orchestrator_addr))?;
        let (mut reader, writer) = Connection::new(stream).into_split();

        // All outbound traffic (registration, heartbeats, completions) goes
        // through one queue so writes never interleave.
        let (sender, receiver) = mpsc::channel::<Envelope>(16);
        tokio::spawn(run_writer(receiver, writer));

        send(&sender, Envelope::new(Payload::RegisterWorker { worker_id: self.id.clone() })).await?;
        info!("🤝 {} registered with the orchestrator", self.id);

        let heartbeat_sender = sender.clone();
        let heartbeat_id = self.id.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let envelope = Envelope::new(Payload::Heartbeat {
                    worker_id: heartbeat_id.clone(),
                });
                if heartbeat_sender.send(envelope).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match reader.read_envelope().await? {
                Some(envelope) => match envelope.payload {
                    Payload::NewTask(task) => self.process_task(task, &sender).await?,
                    other => debug!("{} ignoring message {}", self.id, other.kind()),
                },
                None => break,
            }
        }

        warn!("{} lost connection to the orchestrator", self.id);
        Ok(())
    }

    /// Simulate processing: sleep 2-10 s, then either crash the process or
    /// report completion echoing the task's Lamport stamp so the
    /// orchestrator can merge it.
    async fn process_task(&self, mut task: Task, sender: &mpsc::Sender<Envelope>) -> Result<()> {
        info!("📥 {} received task {}, processing...", self.id, task.id);

        let processing_ms = rand::thread_rng().gen_range(MIN_PROCESSING_MS..MAX_PROCESSING_MS);
        tokio::time::sleep(Duration::from_millis(processing_ms)).await;

        if rand::thread_rng().gen_range(0..100) < CRASH_CHANCE_PERCENT {
            error!(
                "{} simulating a critical failure, task {} abandoned",
                self.id, task.id
            );
            std::process::exit(1);
        }

        info!("✅ {} finished task {}", self.id, task.id);
        task.status = TaskStatus::Done;
        let stamp = task.lamport;
        let envelope = Envelope::new(Payload::TaskDone(task)).with_lamport(stamp);
        send(sender, envelope).await
    }
}

async fn send(sender: &mpsc::Sender<Envelope>, envelope: Envelope) -> Result<()> {
    sender
        .send(envelope)
        .await
        .map_err(|_| anyhow!("connection writer has shut down"))
}

/// Forward queued envelopes to the orchestrator's socket.
async fn run_writer(mut receiver: mpsc::Receiver<Envelope>, mut writer: FramedWriter<OwnedWriteHalf>) {
    while let Some(envelope) = receiver.recv().await {
        if let Err(e) = writer.write_envelope(&envelope).await {
            error!("failed to send message to the orchestrator: {}", e);
            break;
        }
    }
}
