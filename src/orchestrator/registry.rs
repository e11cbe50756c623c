//! # Worker Registry
//!
//! The set of live workers and the round-robin cursor over them. Workers are
//! kept in registration order; `next` walks that order cyclically. Each
//! worker's outbound traffic goes through an mpsc sender whose receiving end
//! is owned by that worker's writer task, so concurrent dispatches to
//! distinct workers proceed in parallel while writes to one worker stay
//! serialized.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};

use crate::common::messages::Envelope;

/// Connection-side bookkeeping for one live worker.
pub struct WorkerInfo {
    /// Send sink for dispatching envelopes to this worker.
    pub sender: mpsc::Sender<Envelope>,
    /// When the last heartbeat (or the registration) was observed.
    pub last_heartbeat: Instant,
}

#[derive(Default)]
struct RegistryInner {
    /// Worker ids in registration order, walked by the round-robin cursor.
    order: Vec<String>,
    workers: HashMap<String, WorkerInfo>,
    cursor: usize,
}

/// Insertion-ordered registry of live workers.
///
/// One mutex guards the id order, the info map and the cursor together;
/// every operation that touches any of them takes it.
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Register a worker. If the id is already present the previous entry is
    /// evicted first, so an id can never appear twice in the round-robin
    /// order. Dropping the old sender ends the old writer task, which closes
    /// the superseded socket.
    pub async fn add(&self, id: String, sender: mpsc::Sender<Envelope>) {
        let mut inner = self.inner.lock().await;
        if inner.workers.remove(&id).is_some() {
            inner.order.retain(|worker| worker != &id);
            Self::clamp_cursor(&mut inner);
        }
        inner.order.push(id.clone());
        inner.workers.insert(
            id,
            WorkerInfo {
                sender,
                last_heartbeat: Instant::now(),
            },
        );
    }

    /// Remove a worker from the rotation. Returns whether it was present.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.workers.remove(id).is_none() {
            return false;
        }
        inner.order.retain(|worker| worker != id);
        Self::clamp_cursor(&mut inner);
        true
    }

    /// Pick the next worker round-robin and advance the cursor. Returns the
    /// worker id and a clone of its send sink, or `None` when the registry
    /// is empty.
    pub async fn next(&self) -> Option<(String, mpsc::Sender<Envelope>)> {
        let mut inner = self.inner.lock().await;
        if inner.order.is_empty() {
            return None;
        }
        let id = inner.order[inner.cursor].clone();
        inner.cursor = (inner.cursor + 1) % inner.order.len();
        let sender = inner.workers.get(&id)?.sender.clone();
        Some((id, sender))
    }

    /// Record a heartbeat for a worker, if it is still registered.
    pub async fn touch(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(info) = inner.workers.get_mut(id) {
            info.last_heartbeat = Instant::now();
        }
    }

    /// Ids of workers whose last heartbeat is older than `timeout`.
    pub async fn stale_ids(&self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner
            .workers
            .iter()
            .filter(|(_, info)| now.duration_since(info.last_heartbeat) > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Id set of the live workers, for replication snapshots.
    pub async fn snapshot_ids(&self) -> HashSet<String> {
        let inner = self.inner.lock().await;
        inner.order.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.order.is_empty()
    }

    /// Keep the cursor valid after a removal: wrap it into range while the
    /// rotation is non-empty, reset it to zero otherwise.
    fn clamp_cursor(inner: &mut RegistryInner) {
        if inner.order.is_empty() {
            inner.cursor = 0;
        } else {
            inner.cursor %= inner.order.len();
        }
    }

    #[cfg(test)]
    pub(crate) async fn cursor_position(&self) -> usize {
        self.inner.lock().await.cursor
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
