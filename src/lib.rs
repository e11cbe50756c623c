//! # Distributed Task Orchestration Platform
//!
//! Authenticated clients submit opaque work items to a central orchestrator,
//! which dispatches them round-robin to a dynamic pool of worker nodes,
//! tracks their lifecycle, and redistributes in-flight work when a worker
//! crashes. A standby orchestrator holds a replicated view of the global
//! state and detects primary failure.
//!
//! ## Modules
//!
//! - [`common`]: protocol plumbing shared by every binary — the Lamport
//!   clock, the task model, the wire envelope, TCP framing, configuration
//!   and logging.
//! - [`orchestrator`]: the primary control plane — authentication, worker
//!   and task registries, round-robin dispatch, heartbeat monitoring and
//!   state replication.
//! - [`standby`]: the passive replica — applies state snapshots and runs
//!   the failover detector.
//! - [`worker`]: a worker node — registers, heartbeats, simulates task
//!   processing and reports completion.
//! - [`client`]: the interactive client CLI — authenticate, submit tasks,
//!   query status.

pub mod client;
pub mod common;
pub mod orchestrator;
pub mod standby;
pub mod worker;

pub use common::messages::Envelope;
pub use orchestrator::Orchestrator;
