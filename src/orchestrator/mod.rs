//! # Primary Orchestrator
//!
//! The active coordinator of the system. It owns the global state and runs
//! every control-plane concern:
//!
//! - **Authentication** ([`auth`]): credential checks and session tokens
//! - **Worker registry** ([`registry`]): live workers and the round-robin cursor
//! - **Task store** ([`store`]): task records and their status transitions
//! - **Dispatch** ([`dispatch`]): round-robin assignment, worker-failure
//!   redistribution and the heartbeat-based liveness monitor
//! - **Sessions** ([`client_session`], [`worker_session`]): one task per
//!   connection, speaking the framed envelope protocol
//! - **Replication** ([`replication`]): best-effort state streaming to the
//!   standby

pub mod auth;
pub mod client_session;
pub mod dispatch;
pub mod registry;
pub mod replication;
pub mod store;
pub mod worker_session;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::common::clock::LamportClock;
use crate::common::config::OrchestratorConfig;

use auth::AuthRegistry;
use registry::WorkerRegistry;
use replication::ReplicationHandle;
use store::TaskStore;

/// The orchestrator's global state, shared by every session and timer.
///
/// All fields are reference-counted, so handlers receive cheap clones rather
/// than reaching for true globals.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    clock: Arc<LamportClock>,
    auth: Arc<AuthRegistry>,
    workers: Arc<WorkerRegistry>,
    tasks: Arc<TaskStore>,
    /// Serializes the dispatcher and the worker-failure handler, so the
    /// round-robin cursor cannot be corrupted and a task cannot be
    /// reassigned twice.
    dispatch_lock: Arc<Mutex<()>>,
    replication: ReplicationHandle,
}

impl Orchestrator {
    /// Build the orchestrator state and start the background replication
    /// task. Must be called from within a tokio runtime.
    pub fn new(config: OrchestratorConfig) -> Self {
        let clock = Arc::new(LamportClock::new());
        let auth = Arc::new(AuthRegistry::new(&config.auth.users));
        let workers = Arc::new(WorkerRegistry::new());
        let tasks = Arc::new(TaskStore::new());

        let replication = replication::spawn(
            config.standby_addr(),
            config.timing.reconnect_backoff_secs,
            tasks.clone(),
            workers.clone(),
            clock.clone(),
        );

        Self {
            config: Arc::new(config),
            clock,
            auth,
            workers,
            tasks,
            dispatch_lock: Arc::new(Mutex::new(())),
            replication,
        }
    }

    /// Run the orchestrator until a listener fails.
    ///
    /// Spawns the worker listener and the liveness monitor, and serves
    /// client connections on the calling task.
    pub async fn run(&self) -> Result<()> {
        info!("🚀 starting primary orchestrator");

        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.monitor_workers().await;
        });

        let worker_listener = self.listen_workers();
        let client_listener = self.listen_clients();

        tokio::select! {
            result = worker_listener => {
                error!("worker listener terminated");
                result
            }
            result = client_listener => {
                error!("client listener terminated");
                result
            }
        }
    }

    async fn listen_clients(&self) -> Result<()> {
        let addr = self.config.client_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("📡 waiting for clients on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted client connection from {}", peer);
                    let orchestrator = self.clone();
                    tokio::spawn(async move {
                        orchestrator.handle_client(stream).await;
                    });
                }
                Err(e) => error!("client accept error: {}", e),
            }
        }
    }

    async fn listen_workers(&self) -> Result<()> {
        let addr = self.config.worker_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("📡 waiting for workers on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted worker connection from {}", peer);
                    let orchestrator = self.clone();
                    tokio::spawn(async move {
                        orchestrator.handle_worker(stream).await;
                    });
                }
                Err(e) => error!("worker accept error: {}", e),
            }
        }
    }

    /// Push a fresh global-state snapshot to the standby. Invoked after
    /// every state-mutating event; never blocks on the standby itself.
    pub(crate) async fn replicate(&self) {
        let snapshot =
            replication::snapshot_of(&self.tasks, &self.workers, &self.clock).await;
        self.replication.push(snapshot);
    }
}
