//! Schema change job: the per-replica progress of one accepted statement
//! and the catalog transitions it drives.
//!
//! All `apply_*` methods mutate a table the caller holds under its
//! database write lock, after the matching edit log record was appended.
//! Replay calls the same methods, so live and replayed catalogs converge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::properties::BloomFilterChange;
use crate::catalog::{Column, OlapTable, TabletInvertedIndex};
use crate::task::{AgentTask, AgentTaskQueue, SchemaChangeTask, SupplementRequest};
use crate::types::{
    BackendId, DbId, IndexId, IndexState, JobId, PartitionId, PartitionState, ReplicaId,
    ReplicaState, SchemaHash, StorageType, TableId, TableState, TabletId, Version, VersionHash,
};

/// Lifecycle of an alter job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Accepted; tasks not sent yet.
    Pending,
    /// Tasks sent; waiting for replicas.
    Running,
    /// New schemas installed.
    Finished,
    /// Reverted.
    Cancelled,
}

impl JobState {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// True for `Finished` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New schema of one changed index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexChange {
    /// Index id.
    pub index_id: IndexId,
    /// Index name.
    pub index_name: String,
    /// New column list.
    pub columns: Vec<Column>,
    /// New schema version.
    pub schema_version: i32,
    /// New schema hash.
    pub schema_hash: SchemaHash,
    /// New short key column count.
    pub short_key_count: u16,
    /// Schema hash being replaced.
    pub old_schema_hash: SchemaHash,
}

/// Progress of one replica rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaProgress {
    /// Not reported yet.
    Pending,
    /// Rewritten; the reported statistics are installed on finish.
    Finished {
        /// Version of the rewritten replica.
        version: Version,
        /// Hash of `version`.
        version_hash: VersionHash,
        /// Row count.
        row_count: i64,
        /// Bytes on disk.
        data_size: i64,
    },
    /// The backend gave up on the rewrite.
    Failed,
}

/// A replica whose rewrite the job waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaTask {
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Owning index.
    pub index_id: IndexId,
    /// Owning tablet.
    pub tablet_id: TabletId,
    /// Hosting backend.
    pub backend_id: BackendId,
    /// Progress.
    pub progress: ReplicaProgress,
}

/// Verdict of [`SchemaChangeJob::try_finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishStatus {
    /// Replicas still pending.
    Running,
    /// Every surviving replica is rewritten and each tablet keeps a quorum.
    Finished,
    /// A tablet can no longer reach a quorum.
    Fatal(String),
}

/// A schema change job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChangeJob {
    /// Job id.
    pub job_id: JobId,
    /// Owning database.
    pub db_id: DbId,
    /// Target table.
    pub table_id: TableId,
    /// Table name at creation.
    pub table_name: String,
    /// State.
    pub state: JobState,
    /// Cancellation reason; empty otherwise.
    pub msg: String,
    /// Creation time, ms since epoch.
    pub create_time_ms: i64,
    /// Finish or cancel time, -1 while live.
    pub finished_time_ms: i64,
    /// Deadline relative to creation.
    pub timeout_ms: i64,
    /// Changed indexes.
    pub changes: BTreeMap<IndexId, IndexChange>,
    /// Bloom filter configuration to install.
    pub bloom_filter: BloomFilterChange,
    /// Storage type of every changed index after the job.
    pub storage_type: StorageType,
    /// Tracked replicas.
    pub replicas: BTreeMap<ReplicaId, ReplicaTask>,
}

impl SchemaChangeJob {
    /// Creates a pending job tracking every NORMAL replica of the changed indexes.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        job_id: JobId,
        db_id: DbId,
        table: &OlapTable,
        changes: BTreeMap<IndexId, IndexChange>,
        bloom_filter: BloomFilterChange,
        storage_type: StorageType,
        create_time_ms: i64,
        timeout_ms: i64,
    ) -> Self {
        let mut replicas = BTreeMap::new();
        for partition in table.partitions.values() {
            for index_id in changes.keys() {
                let Some(index) = partition.index(*index_id) else {
                    continue;
                };
                for tablet in index.tablets.values() {
                    for replica in &tablet.replicas {
                        if replica.state != ReplicaState::Normal {
                            continue;
                        }
                        replicas.insert(
                            replica.id,
                            ReplicaTask {
                                partition_id: partition.id,
                                index_id: *index_id,
                                tablet_id: tablet.id,
                                backend_id: replica.backend_id,
                                progress: ReplicaProgress::Pending,
                            },
                        );
                    }
                }
            }
        }

        Self {
            job_id,
            db_id,
            table_id: table.id,
            table_name: table.name.clone(),
            state: JobState::Pending,
            msg: String::new(),
            create_time_ms,
            finished_time_ms: -1,
            timeout_ms,
            changes,
            bloom_filter,
            storage_type,
            replicas,
        }
    }

    /// True once the deadline passed for a live job.
    #[must_use]
    pub fn is_timeout(&self, now_ms: i64) -> bool {
        !self.state.is_terminal() && now_ms - self.create_time_ms > self.timeout_ms
    }

    // ------------------------------------------------------------------
    // Catalog transitions
    // ------------------------------------------------------------------

    /// Marks tracked replicas, changed indexes, their partitions and the
    /// table as under schema change and registers the pending hashes.
    pub fn apply_start(&self, inverted: &TabletInvertedIndex, table: &mut OlapTable) {
        for partition in table.partitions.values_mut() {
            for (index_id, change) in &self.changes {
                let Some(index) = partition.indexes.get_mut(index_id) else {
                    continue;
                };
                for tablet in index.tablets.values_mut() {
                    for replica in &mut tablet.replicas {
                        if self.replicas.contains_key(&replica.id) {
                            replica.state = ReplicaState::SchemaChange;
                        }
                    }
                }
                index.state = IndexState::SchemaChange;
                inverted.set_new_schema_hash(partition.id, *index_id, change.schema_hash);
            }
            partition.state = PartitionState::SchemaChange;
        }
        table.state = TableState::SchemaChange;
    }

    /// Installs the new schemas and returns tablets that fell below their
    /// replication factor because failed replicas were removed.
    pub fn apply_finish(
        &self,
        inverted: &TabletInvertedIndex,
        table: &mut OlapTable,
    ) -> Vec<SupplementRequest> {
        for (index_id, change) in &self.changes {
            if let Some(schema) = table.indexes.get_mut(index_id) {
                schema.columns.clone_from(&change.columns);
                schema.schema_version = change.schema_version;
                schema.schema_hash = change.schema_hash;
                schema.short_key_count = change.short_key_count;
                schema.storage_type = self.storage_type;
            }
        }

        let table_id = table.id;
        let mut supplements = Vec::new();
        for partition in table.partitions.values_mut() {
            let replication_num = usize::from(partition.replication_num);
            for index_id in self.changes.keys() {
                let Some(index) = partition.indexes.get_mut(index_id) else {
                    continue;
                };
                for tablet in index.tablets.values_mut() {
                    let tablet_id = tablet.id;
                    tablet.replicas.retain_mut(|replica| {
                        match self.replicas.get(&replica.id).map(|task| task.progress) {
                            Some(ReplicaProgress::Failed) => {
                                inverted.delete_replica(tablet_id, replica.backend_id);
                                false
                            }
                            Some(ReplicaProgress::Finished {
                                version,
                                version_hash,
                                row_count,
                                data_size,
                            }) => {
                                replica.update_info(version, version_hash, data_size, row_count);
                                replica.state = ReplicaState::Normal;
                                true
                            }
                            _ => {
                                if replica.state == ReplicaState::SchemaChange {
                                    replica.state = ReplicaState::Normal;
                                }
                                true
                            }
                        }
                    });
                    if tablet.replicas.len() < replication_num {
                        supplements.push(SupplementRequest {
                            db_id: self.db_id,
                            table_id,
                            partition_id: partition.id,
                            index_id: *index_id,
                            tablet_id,
                        });
                    }
                }
                index.state = IndexState::Normal;
                inverted.update_to_new_schema_hash(partition.id, *index_id);
            }
            partition.state = PartitionState::Normal;
        }

        if self.bloom_filter.has_change {
            table.bloom_filter.clone_from(&self.bloom_filter.info);
        }
        table.state = TableState::Normal;
        supplements
    }

    /// Reverts replicas, indexes, partitions and the table to NORMAL and
    /// drops the pending hashes.
    pub fn apply_cancel(&self, inverted: &TabletInvertedIndex, table: &mut OlapTable) {
        for partition in table.partitions.values_mut() {
            for index_id in self.changes.keys() {
                let Some(index) = partition.indexes.get_mut(index_id) else {
                    continue;
                };
                for tablet in index.tablets.values_mut() {
                    for replica in &mut tablet.replicas {
                        if replica.state == ReplicaState::SchemaChange {
                            replica.state = ReplicaState::Normal;
                        }
                    }
                }
                index.state = IndexState::Normal;
                inverted.delete_new_schema_hash(partition.id, *index_id);
            }
            partition.state = PartitionState::Normal;
        }
        table.state = TableState::Normal;
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Sends one rewrite task per pending replica and moves to RUNNING.
    ///
    /// Returns false, sending nothing, if any tracked replica no longer
    /// resolves in the table.
    pub fn send_tasks(&mut self, table: &OlapTable, queue: &AgentTaskQueue) -> bool {
        let mut tasks = Vec::with_capacity(self.replicas.len());
        for (replica_id, task) in &self.replicas {
            if task.progress != ReplicaProgress::Pending {
                continue;
            }
            let Some(change) = self.changes.get(&task.index_id) else {
                return false;
            };
            let resolved = table
                .tablet(task.partition_id, task.index_id, task.tablet_id)
                .and_then(|tablet| tablet.replica_by_backend(task.backend_id))
                .is_some_and(|replica| replica.id == *replica_id);
            if !resolved {
                return false;
            }
            tasks.push(AgentTask::SchemaChange(SchemaChangeTask {
                backend_id: task.backend_id,
                db_id: self.db_id,
                table_id: self.table_id,
                partition_id: task.partition_id,
                index_id: task.index_id,
                tablet_id: task.tablet_id,
                replica_id: *replica_id,
                base_schema_hash: change.old_schema_hash,
                new_schema_hash: change.schema_hash,
                new_schema_version: change.schema_version,
                columns: change.columns.clone(),
                short_key_count: change.short_key_count,
                bloom_filter: self.bloom_filter.info.clone(),
                storage_type: self.storage_type,
            }));
        }
        queue.submit_batch(tasks);
        self.state = JobState::Running;
        true
    }

    /// Evaluates replica progress against each tablet's quorum.
    #[must_use]
    pub fn try_finish(&self, table: &OlapTable) -> FinishStatus {
        // tablet -> (partition, surviving, pending)
        let mut tablets: BTreeMap<TabletId, (PartitionId, usize, usize)> = BTreeMap::new();
        for task in self.replicas.values() {
            let entry = tablets.entry(task.tablet_id).or_insert((task.partition_id, 0, 0));
            match task.progress {
                ReplicaProgress::Failed => {}
                ReplicaProgress::Finished { .. } => entry.1 += 1,
                ReplicaProgress::Pending => {
                    entry.1 += 1;
                    entry.2 += 1;
                }
            }
        }

        let mut running = false;
        for (tablet_id, (partition_id, surviving, pending)) in tablets {
            let Some(partition) = table.partition(partition_id) else {
                return FinishStatus::Fatal(format!("partition[{partition_id}] does not exist"));
            };
            let quorum = partition.quorum();
            if surviving < quorum {
                return FinishStatus::Fatal(format!(
                    "tablet[{tablet_id}] has few replicas left: {surviving}, quorum: {quorum}"
                ));
            }
            running |= pending > 0;
        }

        if running {
            FinishStatus::Running
        } else {
            FinishStatus::Finished
        }
    }

    // ------------------------------------------------------------------
    // Replica bookkeeping
    // ------------------------------------------------------------------

    /// Tracked replica of `tablet_id` on `backend_id`.
    #[must_use]
    pub fn replica_for(&self, tablet_id: TabletId, backend_id: BackendId) -> Option<ReplicaId> {
        self.replicas
            .iter()
            .find(|(_, task)| task.tablet_id == tablet_id && task.backend_id == backend_id)
            .map(|(id, _)| *id)
    }

    /// Records a successful rewrite. Returns false for an untracked replica.
    pub fn record_replica_finished(
        &mut self,
        replica_id: ReplicaId,
        version: Version,
        version_hash: VersionHash,
        row_count: i64,
        data_size: i64,
    ) -> bool {
        let Some(task) = self.replicas.get_mut(&replica_id) else {
            return false;
        };
        task.progress = ReplicaProgress::Finished {
            version,
            version_hash,
            row_count,
            data_size,
        };
        true
    }

    /// Records a failed rewrite. Returns false for an untracked replica.
    pub fn record_replica_failed(&mut self, replica_id: ReplicaId) -> bool {
        let Some(task) = self.replicas.get_mut(&replica_id) else {
            return false;
        };
        task.progress = ReplicaProgress::Failed;
        true
    }

    /// Stops tracking a replica removed from the catalog.
    pub fn remove_replica(
        &mut self,
        tablet_id: TabletId,
        replica_id: ReplicaId,
        backend_id: BackendId,
    ) -> bool {
        let matches = self
            .replicas
            .get(&replica_id)
            .is_some_and(|task| task.tablet_id == tablet_id && task.backend_id == backend_id);
        if matches {
            self.replicas.remove(&replica_id);
        }
        matches
    }

    /// (finished, total) tracked replicas of an index.
    #[must_use]
    pub fn index_progress(&self, index_id: IndexId) -> (usize, usize) {
        self.replicas
            .values()
            .filter(|task| task.index_id == index_id)
            .fold((0, 0), |(finished, total), task| {
                let done = matches!(task.progress, ReplicaProgress::Finished { .. });
                (finished + usize::from(done), total + 1)
            })
    }

    /// (backend, tablet) of every tracked replica, for withdrawing tasks.
    pub fn tracked_tasks(&self) -> impl Iterator<Item = (BackendId, TabletId)> + '_ {
        self.replicas
            .values()
            .map(|task| (task.backend_id, task.tablet_id))
    }

    // ------------------------------------------------------------------
    // Delayed deletion
    // ------------------------------------------------------------------

    /// Drop tasks for the replaced schema hash on every replica of the
    /// changed indexes.
    #[must_use]
    pub fn retired_drop_tasks(&self, table: &OlapTable) -> Vec<AgentTask> {
        let mut tasks = Vec::new();
        for partition in table.partitions.values() {
            for (index_id, change) in &self.changes {
                let Some(index) = partition.index(*index_id) else {
                    continue;
                };
                for tablet in index.tablets.values() {
                    tasks.extend(tablet.replicas.iter().map(|replica| AgentTask::DropReplica {
                        backend_id: replica.backend_id,
                        tablet_id: tablet.id,
                        schema_hash: change.old_schema_hash,
                    }));
                }
            }
        }
        tasks
    }

    /// (partition, index) pairs the job changed.
    #[must_use]
    pub fn changed_paths(&self, table: &OlapTable) -> Vec<(PartitionId, IndexId)> {
        table
            .partitions
            .keys()
            .flat_map(|partition_id| {
                self.changes
                    .keys()
                    .map(move |index_id| (*partition_id, *index_id))
            })
            .collect()
    }
}
