//! # Task Store
//!
//! The keyed collection of task records. Insertion order is tracked
//! alongside the map so that backlog re-dispatch ("oldest submissions
//! first") is well-defined. Bulk reads hand out deep copies; callers never
//! hold a reference into the store across an await point.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::common::task::{Task, TaskStatus};

#[derive(Default)]
struct StoreInner {
    /// Task ids in submission order.
    order: Vec<String>,
    tasks: HashMap<String, Task>,
}

/// Keyed collection of task records with per-entry atomic updates.
pub struct TaskStore {
    inner: Mutex<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Insert or replace a task record.
    pub async fn put(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        if !inner.tasks.contains_key(&task.id) {
            inner.order.push(task.id.clone());
        }
        inner.tasks.insert(task.id.clone(), task);
    }

    /// Copy of the task with the given id, if known.
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    /// Apply a mutation to one task atomically. Returns a copy of the
    /// updated record, or `None` when the id is unknown.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(id)?;
        mutate(task);
        Some(task.clone())
    }

    /// Ids of tasks currently `Waiting`, in submission order.
    pub async fn waiting_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .tasks
                    .get(*id)
                    .map(|task| task.status == TaskStatus::Waiting)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Ids of `Running` tasks assigned to the given worker, in submission
    /// order.
    pub async fn running_on(&self, worker_id: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter(|id| {
                inner.tasks.get(*id).map_or(false, |task| {
                    task.status == TaskStatus::Running
                        && task.worker_id.as_deref() == Some(worker_id)
                })
            })
            .cloned()
            .collect()
    }

    /// Copies of all tasks matching a status.
    pub async fn filter_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect()
    }

    /// Stable deep copy of every record, for replication snapshots.
    pub async fn snapshot(&self) -> HashMap<String, Task> {
        self.inner.lock().await.tasks.clone()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
