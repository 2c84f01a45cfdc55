//! Per-backend outbound task queue.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::{AgentTask, TaskType};
use crate::types::BackendId;

#[derive(Debug, Default)]
struct QueueInner {
    outstanding: FxHashMap<BackendId, IndexMap<(TaskType, u64), AgentTask>>,
    dispatched: FxHashMap<BackendId, Vec<AgentTask>>,
}

/// Outbound command queue. A leaf lock: never held while acquiring another.
///
/// `dispatched` is the outbox the transport drains with
/// [`take_dispatched`](Self::take_dispatched); `outstanding` remembers
/// tracked tasks until the backend finishes them.
#[derive(Debug, Default)]
pub struct AgentTaskQueue {
    inner: Mutex<QueueInner>,
}

impl AgentTaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a task for dispatch.
    ///
    /// Returns false, without dispatching, if an identical tracked task is
    /// already outstanding.
    pub fn submit(&self, task: AgentTask) -> bool {
        let mut inner = self.inner.lock();
        let backend_id = task.backend_id();
        if task.is_tracked() {
            let key = (task.task_type(), task.signature());
            let slot = inner.outstanding.entry(backend_id).or_default();
            if slot.contains_key(&key) {
                return false;
            }
            slot.insert(key, task.clone());
        }
        debug!(backend_id, task_type = ?task.task_type(), signature = task.signature(),
               "Task queued");
        inner.dispatched.entry(backend_id).or_default().push(task);
        true
    }

    /// Queues every task; returns how many were accepted.
    pub fn submit_batch(&self, tasks: impl IntoIterator<Item = AgentTask>) -> usize {
        tasks
            .into_iter()
            .map(|task| self.submit(task))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Removes a tracked task once the backend has completed it.
    pub fn remove_task(
        &self,
        backend_id: BackendId,
        task_type: TaskType,
        signature: u64,
    ) -> Option<AgentTask> {
        let mut inner = self.inner.lock();
        let slot = inner.outstanding.get_mut(&backend_id)?;
        let removed = slot.shift_remove(&(task_type, signature));
        if slot.is_empty() {
            inner.outstanding.remove(&backend_id);
        }
        removed
    }

    /// Outstanding tasks of `backend_id` absent from its running set.
    #[must_use]
    pub fn diff_tasks(
        &self,
        backend_id: BackendId,
        running: &BTreeMap<TaskType, BTreeSet<u64>>,
    ) -> Vec<AgentTask> {
        let inner = self.inner.lock();
        let Some(slot) = inner.outstanding.get(&backend_id) else {
            return Vec::new();
        };
        slot.iter()
            .filter(|((task_type, signature), _)| {
                !running
                    .get(task_type)
                    .is_some_and(|set| set.contains(signature))
            })
            .map(|(_, task)| task.clone())
            .collect()
    }

    /// Puts already-tracked tasks back into the outbox.
    pub fn resend(&self, tasks: Vec<AgentTask>) {
        if tasks.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for task in tasks {
            info!(backend_id = task.backend_id(), task_type = ?task.task_type(),
                  signature = task.signature(), "Resending task");
            inner.dispatched.entry(task.backend_id()).or_default().push(task);
        }
    }

    /// Drains the outbox of one backend.
    pub fn take_dispatched(&self, backend_id: BackendId) -> Vec<AgentTask> {
        self.inner
            .lock()
            .dispatched
            .remove(&backend_id)
            .unwrap_or_default()
    }

    /// Number of tracked tasks still outstanding across all backends.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.inner.lock().outstanding.values().map(IndexMap::len).sum()
    }

    /// True if the tracked task is outstanding.
    #[must_use]
    pub fn is_outstanding(&self, backend_id: BackendId, task_type: TaskType, signature: u64) -> bool {
        self.inner
            .lock()
            .outstanding
            .get(&backend_id)
            .is_some_and(|slot| slot.contains_key(&(task_type, signature)))
    }
}
