//! Job registry: live jobs by table, the delayed-deletion pool and history.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::job::SchemaChangeJob;
use crate::types::{DbId, JobId, TableId};

/// Shared handle to one job. Lock order: database lock, then `job`.
#[derive(Debug)]
pub struct JobHandle {
    /// Job id.
    pub job_id: JobId,
    /// Owning database.
    pub db_id: DbId,
    /// Target table.
    pub table_id: TableId,
    /// The job.
    pub job: Mutex<SchemaChangeJob>,
}

impl JobHandle {
    /// Wraps a job.
    #[must_use]
    pub fn new(job: SchemaChangeJob) -> Arc<Self> {
        Arc::new(Self {
            job_id: job.job_id,
            db_id: job.db_id,
            table_id: job.table_id,
            job: Mutex::new(job),
        })
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: FxHashMap<TableId, Arc<JobHandle>>,
    delayed: Vec<Arc<JobHandle>>,
    history: Vec<Arc<JobHandle>>,
}

/// Registry of alter jobs. A leaf lock: handles are cloned out and the
/// registry lock is released before any job mutex is taken.
#[derive(Debug, Default)]
pub struct AlterJobRegistry {
    inner: RwLock<RegistryInner>,
}

impl AlterJobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the live job of a table, replacing any previous one.
    pub fn add_live(&self, handle: Arc<JobHandle>) {
        self.inner.write().live.insert(handle.table_id, handle);
    }

    /// Live job of a table.
    #[must_use]
    pub fn live(&self, table_id: TableId) -> Option<Arc<JobHandle>> {
        self.inner.read().live.get(&table_id).cloned()
    }

    /// True if `handle` is still the live job of its table.
    #[must_use]
    pub fn is_live(&self, handle: &Arc<JobHandle>) -> bool {
        self.inner
            .read()
            .live
            .get(&handle.table_id)
            .is_some_and(|live| Arc::ptr_eq(live, handle))
    }

    /// Removes the live job of a table.
    pub fn remove_live(&self, table_id: TableId) -> Option<Arc<JobHandle>> {
        self.inner.write().live.remove(&table_id)
    }

    /// Live jobs ordered by job id.
    #[must_use]
    pub fn live_snapshot(&self) -> Vec<Arc<JobHandle>> {
        let mut jobs: Vec<_> = self.inner.read().live.values().cloned().collect();
        jobs.sort_unstable_by_key(|handle| handle.job_id);
        jobs
    }

    /// Moves a table's live job into the delayed-deletion pool.
    pub fn move_to_delayed(&self, table_id: TableId) -> bool {
        let mut inner = self.inner.write();
        let Some(handle) = inner.live.remove(&table_id) else {
            return false;
        };
        inner.delayed.push(handle);
        true
    }

    /// Puts a finished job into the delayed-deletion pool.
    pub fn add_delayed(&self, handle: Arc<JobHandle>) {
        self.inner.write().delayed.push(handle);
    }

    /// Delayed job of a table.
    #[must_use]
    pub fn delayed_for_table(&self, table_id: TableId) -> Option<Arc<JobHandle>> {
        self.inner
            .read()
            .delayed
            .iter()
            .find(|handle| handle.table_id == table_id)
            .cloned()
    }

    /// Jobs waiting for their old schema to be purged.
    #[must_use]
    pub fn delayed_snapshot(&self) -> Vec<Arc<JobHandle>> {
        self.inner.read().delayed.clone()
    }

    /// Removes a job from the delayed pool.
    pub fn remove_delayed(&self, job_id: JobId) -> Option<Arc<JobHandle>> {
        let mut inner = self.inner.write();
        let pos = inner.delayed.iter().position(|h| h.job_id == job_id)?;
        Some(inner.delayed.remove(pos))
    }

    /// Appends a job to history.
    pub fn add_history(&self, handle: Arc<JobHandle>) {
        self.inner.write().history.push(handle);
    }

    /// Finished and cancelled jobs in completion order.
    #[must_use]
    pub fn history_snapshot(&self) -> Vec<Arc<JobHandle>> {
        self.inner.read().history.clone()
    }

    /// Delayed and historical jobs of a database.
    #[must_use]
    pub fn done_for_db(&self, db_id: DbId) -> Vec<Arc<JobHandle>> {
        let inner = self.inner.read();
        inner
            .delayed
            .iter()
            .chain(&inner.history)
            .filter(|handle| handle.db_id == db_id)
            .cloned()
            .collect()
    }
}
