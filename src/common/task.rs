//! # Task Model
//!
//! The unit of work that flows through the system: submitted by a client,
//! dispatched to a worker, and tracked by the orchestrator until completion.

use serde::{Deserialize, Serialize};

/// Lifecycle states of a task.
///
/// A task progresses `Waiting -> Running -> Done`, and may fall back to
/// `Waiting` when its assigned worker dies before reporting completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Received, waiting for an available worker.
    Waiting,
    /// Assigned to a worker and in flight.
    Running,
    /// Completed successfully.
    Done,
    /// Failed during execution.
    Failed,
}

/// A unit of work submitted by a client.
///
/// The payload is opaque to the orchestrator; only the lifecycle metadata is
/// interpreted. `worker_id` is set exactly while the task is `Running`, and
/// `lamport` records the logical time of the last status-changing event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, chosen by the submitting client.
    pub id: String,
    /// Identifier of the client that submitted the task.
    pub client_id: String,
    /// Opaque work description.
    pub payload: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Worker currently executing the task, if any.
    pub worker_id: Option<String>,
    /// Lamport timestamp of the last status change.
    pub lamport: u64,
}

impl Task {
    /// Create a new task in the `Waiting` state.
    pub fn new(id: impl Into<String>, client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            payload: payload.into(),
            status: TaskStatus::Waiting,
            worker_id: None,
            lamport: 0,
        }
    }
}
