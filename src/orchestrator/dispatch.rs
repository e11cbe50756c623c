//! # Dispatch and Failure Handling
//!
//! Round-robin task dispatch, worker-failure redistribution, and the
//! heartbeat-based liveness monitor. The dispatcher and the failure handler
//! run under one lock: redistribution is an iterative drain of a backlog
//! queue, so a cascade of dead workers is handled without recursion and the
//! cursor always stays consistent with the registry.

use std::collections::VecDeque;
use std::time::Duration;

use log::{info, warn};

use crate::common::messages::{Envelope, Payload};
use crate::common::task::TaskStatus;

use super::Orchestrator;

impl Orchestrator {
    /// Dispatch a `Waiting` task to the next worker in round-robin order.
    /// With no workers registered the task simply stays `Waiting`; the
    /// client's submission still succeeds.
    pub async fn dispatch_task(&self, task_id: &str) {
        let _guard = self.dispatch_lock.lock().await;
        let mut backlog = VecDeque::from([task_id.to_string()]);
        self.drain_backlog(&mut backlog).await;
    }

    /// Handle the death of a worker: remove it from the rotation, reset its
    /// in-flight tasks to `Waiting`, and redistribute them to the surviving
    /// workers. Safe to call from the liveness monitor, a session loop and a
    /// writer task concurrently; a worker already evicted is a no-op.
    pub async fn handle_worker_failure(&self, worker_id: &str) {
        let _guard = self.dispatch_lock.lock().await;
        let mut backlog = self.evict_worker(worker_id).await;
        self.drain_backlog(&mut backlog).await;
        self.replicate().await;
    }

    /// Periodic scan declaring silent workers dead. This is the only
    /// detector for workers whose TCP connection is still open but which
    /// stopped heartbeating; dropped sockets are caught by the session loop.
    pub(crate) async fn monitor_workers(&self) {
        let timeout = Duration::from_secs(self.config.timing.heartbeat_timeout_secs);
        let mut interval = tokio::time::interval(timeout);
        // The first tick fires immediately; the scan starts one period in.
        interval.tick().await;

        loop {
            interval.tick().await;
            for id in self.workers.stale_ids(timeout).await {
                warn!("⚠️  worker {} is not responding (heartbeat timeout), removing", id);
                self.handle_worker_failure(&id).await;
            }
        }
    }

    /// Dispatch every task in the backlog, oldest first. Assumes the
    /// dispatch lock is held.
    async fn drain_backlog(&self, backlog: &mut VecDeque<String>) {
        while let Some(task_id) = backlog.pop_front() {
            self.dispatch_one(&task_id, backlog).await;
        }
    }

    /// Try to dispatch one task. On a send failure the selected worker is
    /// evicted and all of its in-flight tasks, including this one, are
    /// pushed back onto the backlog. Assumes the dispatch lock is held.
    async fn dispatch_one(&self, task_id: &str, backlog: &mut VecDeque<String>) {
        let Some((worker_id, sender)) = self.workers.next().await else {
            info!("no worker available, task {} stays waiting", task_id);
            self.tasks
                .update(task_id, |task| {
                    task.status = TaskStatus::Waiting;
                    task.worker_id = None;
                })
                .await;
            return;
        };

        let stamp = self.clock.tick();
        let Some(task) = self
            .tasks
            .update(task_id, |task| {
                task.status = TaskStatus::Running;
                task.worker_id = Some(worker_id.clone());
                task.lamport = stamp;
            })
            .await
        else {
            return;
        };

        let envelope = Envelope::new(Payload::NewTask(task)).with_lamport(self.clock.read());
        if sender.send(envelope).await.is_ok() {
            info!("📤 task {} dispatched to worker {}", task_id, worker_id);
            self.replicate().await;
            return;
        }

        // The worker's writer is gone; its channel will never drain.
        warn!(
            "failed to send task {} to worker {}, rescheduling",
            task_id, worker_id
        );
        let evicted = self.evict_worker(&worker_id).await;
        backlog.extend(evicted);
        self.replicate().await;
    }

    /// Remove a worker and reset its `Running` tasks to `Waiting`. Returns
    /// the ids needing re-dispatch, in submission order. Assumes the
    /// dispatch lock is held.
    async fn evict_worker(&self, worker_id: &str) -> VecDeque<String> {
        if !self.workers.remove(worker_id).await {
            return VecDeque::new();
        }
        info!("redistributing tasks of worker {}", worker_id);

        // Iterate over a stable snapshot: the store can gain entries while
        // the rescheduling below runs.
        let orphaned = self.tasks.running_on(worker_id).await;
        let mut backlog = VecDeque::with_capacity(orphaned.len());
        for task_id in orphaned {
            info!("rescheduling task {}", task_id);
            self.tasks
                .update(&task_id, |task| {
                    task.status = TaskStatus::Waiting;
                    task.worker_id = None;
                })
                .await;
            backlog.push_back(task_id);
        }
        backlog
    }
}
