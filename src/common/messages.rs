//! # Message Protocol
//!
//! Defines the wire envelope used for all communication in the system:
//! - Client authentication and task submission
//! - Worker registration, heartbeats and completion reports
//! - Task dispatch from the orchestrator to workers
//! - State replication from the primary to the standby
//!
//! Envelopes are serialized to JSON and sent over TCP with a 4-byte length
//! prefix (see [`super::connection`]). The payload is a tagged union keyed
//! by message kind, so protocol drift is a compile-time error rather than a
//! runtime cast failure.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::task::Task;

/// Username and password pair, carried only inside `Authenticate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A full copy of the primary's global state, streamed to the standby after
/// every state-mutating event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Every known task, keyed by id.
    pub tasks: HashMap<String, Task>,
    /// Ids of the currently live workers.
    pub workers: HashSet<String>,
    /// The primary's Lamport clock at snapshot time.
    pub clock: u64,
}

/// Message kinds and their payloads, grouped by communication direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    // ========== CLIENT -> ORCHESTRATOR ==========
    /// Request authentication with the given credentials.
    Authenticate(Credentials),
    /// Submit a new task. The status carried on the wire is ignored; the
    /// orchestrator stores the record as `Waiting`.
    SubmitTask(Task),
    /// Ask for the current state of a task.
    QueryStatus { task_id: String },

    // ========== ORCHESTRATOR -> CLIENT ==========
    /// Authentication succeeded; the token must accompany later requests.
    AuthOk { token: String },
    /// Authentication failed; the connection will be closed.
    AuthFail,
    /// The submitted task was accepted and stored.
    TaskAccepted { task_id: String },
    /// Reply to `QueryStatus`; `None` when the id is unknown.
    StatusReply(Option<Task>),

    // ========== WORKER -> ORCHESTRATOR ==========
    /// A new worker presents itself to the orchestrator.
    RegisterWorker { worker_id: String },
    /// Periodic liveness signal.
    Heartbeat { worker_id: String },
    /// A task finished; carries the record with its final Lamport stamp.
    TaskDone(Task),

    // ========== ORCHESTRATOR -> WORKER ==========
    /// Dispatch a task (status `Running`) to a specific worker.
    NewTask(Task),

    // ========== ORCHESTRATOR -> STANDBY ==========
    /// Full global-state snapshot for replication.
    SyncState(StateSnapshot),
}

impl Payload {
    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Authenticate(_) => "AUTHENTICATE",
            Payload::SubmitTask(_) => "SUBMIT_TASK",
            Payload::QueryStatus { .. } => "QUERY_STATUS",
            Payload::AuthOk { .. } => "AUTH_OK",
            Payload::AuthFail => "AUTH_FAIL",
            Payload::TaskAccepted { .. } => "TASK_ACCEPTED",
            Payload::StatusReply(_) => "STATUS_REPLY",
            Payload::RegisterWorker { .. } => "REGISTER_WORKER",
            Payload::Heartbeat { .. } => "HEARTBEAT",
            Payload::TaskDone(_) => "TASK_DONE",
            Payload::NewTask(_) => "NEW_TASK",
            Payload::SyncState(_) => "SYNC_STATE",
        }
    }
}

/// The typed envelope every peer exchanges.
///
/// `token` is present on authenticated client requests and empty elsewhere.
/// `lamport` is the sender's logical timestamp; worker registration and
/// heartbeats carry `0` because workers keep no clock of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Payload,
    pub token: Option<String>,
    pub lamport: u64,
}

impl Envelope {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            token: None,
            lamport: 0,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_lamport(mut self, lamport: u64) -> Self {
        self.lamport = lamport;
        self
    }

    /// Serialize the envelope to JSON bytes for transmission.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize an envelope from JSON bytes received from the network.
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
