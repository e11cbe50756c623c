//! # Standby Orchestrator
//!
//! The passive replica. It accepts the primary's replication stream, applies
//! each state snapshot wholesale, and watches for replication silence. When
//! the stream has been quiet past the failover deadline it probes the
//! primary's client and worker ports; only if both are unreachable does it
//! declare failover, print an operator-visible banner and terminate with the
//! replica retained in memory up to that moment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

use crate::common::config::StandbyConfig;
use crate::common::connection::Connection;
use crate::common::messages::{Payload, StateSnapshot};
use crate::common::task::Task;

/// The replicated view of the primary's global state.
#[derive(Debug, Default)]
struct ReplicatedState {
    tasks: HashMap<String, Task>,
    workers: HashSet<String>,
    clock: u64,
}

/// Standby receiver and failover detector.
#[derive(Clone)]
pub struct Standby {
    config: Arc<StandbyConfig>,
    state: Arc<RwLock<ReplicatedState>>,
    last_sync: Arc<RwLock<Instant>>,
}

impl Standby {
    pub fn new(config: StandbyConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(ReplicatedState::default())),
            last_sync: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Run the standby: the failover detector in the background and the
    /// replication listener on the calling task.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.listen_addr();
        info!("🚀 starting standby orchestrator on {}", addr);

        let detector = self.clone();
        tokio::spawn(async move {
            detector.detect_failover().await;
        });

        let listener = TcpListener::bind(&addr).await?;
        loop {
            let (stream, _) = listener.accept().await?;
            info!("🔗 primary orchestrator connected for state sync");
            *self.last_sync.write().await = Instant::now();
            self.receive_snapshots(stream).await;
            warn!("connection to the primary lost");
        }
    }

    /// Read sync envelopes from the primary until the connection drops.
    async fn receive_snapshots(&self, stream: TcpStream) {
        let mut conn = Connection::new(stream);
        loop {
            match conn.read_envelope().await {
                Ok(Some(envelope)) => match envelope.payload {
                    Payload::SyncState(snapshot) => {
                        self.apply(snapshot).await;
                        *self.last_sync.write().await = Instant::now();
                    }
                    other => {
                        warn!(
                            "unexpected message {} on the sync stream, closing connection",
                            other.kind()
                        );
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading from the primary: {}", e);
                    break;
                }
            }
        }
    }

    /// Overwrite the replica with a received snapshot.
    async fn apply(&self, snapshot: StateSnapshot) {
        let mut state = self.state.write().await;
        state.tasks = snapshot.tasks;
        state.workers = snapshot.workers;
        state.clock = snapshot.clock;
        info!(
            "replica updated: {} tasks, {} workers, clock {}",
            state.tasks.len(),
            state.workers.len(),
            state.clock
        );
    }

    /// Watch for replication silence and drive the
    /// `REPLICATING -> SUSPECT -> FAILED_OVER` progression. A reachable
    /// primary turns a suspicion back into a false alarm.
    async fn detect_failover(&self) {
        let timeout = Duration::from_secs(self.config.timing.failover_timeout_secs);
        // First check after a full deadline, then twice per deadline.
        tokio::time::sleep(timeout).await;
        let mut interval = tokio::time::interval(timeout / 2);

        loop {
            interval.tick().await;
            if self.last_sync.read().await.elapsed() <= timeout {
                continue;
            }

            warn!("no sync from the primary (timeout), probing its ports");
            let primary = &self.config.primary;
            let client_port_open = probe(&primary.host, primary.client_port).await;
            let worker_port_open = probe(&primary.host, primary.worker_port).await;

            if client_port_open || worker_port_open {
                info!("primary still reachable, treating as a false alarm");
                *self.last_sync.write().await = Instant::now();
                continue;
            }

            warn!("🚨 primary appears to be offline, declaring failover");
            self.announce_failover().await;
            std::process::exit(0);
        }
    }

    /// Operator-visible failover banner. Promotion is operator-driven: a
    /// fresh primary must be started by hand.
    async fn announce_failover(&self) {
        let state = self.state.read().await;
        println!("---------------------------------------------------------");
        println!("FAILOVER: the primary orchestrator is unreachable.");
        println!("Start a new `orchestrator` instance to restore service.");
        println!(
            "Replicated state at takeover: {} tasks, {} workers, clock {}.",
            state.tasks.len(),
            state.workers.len(),
            state.clock
        );
        println!("The standby will now shut down.");
        println!("---------------------------------------------------------");
    }
}

/// Attempt a TCP connection to check whether a service is alive.
async fn probe(host: &str, port: u16) -> bool {
    let attempt = TcpStream::connect((host, port));
    matches!(
        tokio::time::timeout(Duration::from_secs(2), attempt).await,
        Ok(Ok(_))
    )
}
