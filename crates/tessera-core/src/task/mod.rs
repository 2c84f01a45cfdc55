//! Commands sent to storage nodes.
//!
//! Tasks are queued per backend in [`AgentTaskQueue`]. Schema change and
//! medium migration tasks stay outstanding until the backend reports them
//! finished, so a task report that no longer lists one triggers a resend.
//! Drop-replica tasks are fire-and-forget.

mod clone_checker;
mod queue;

pub use clone_checker::{CloneChecker, SupplementRequest};
pub use queue::AgentTaskQueue;

use serde::{Deserialize, Serialize};

use crate::catalog::{BloomFilterInfo, Column};
use crate::types::{
    BackendId, DbId, IndexId, PartitionId, ReplicaId, SchemaHash, StorageMedium, StorageType,
    TableId, TabletId,
};

/// Kind of agent task; running task sets in reports are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Rewrite a replica into a new schema.
    SchemaChange,
    /// Move a replica to another storage medium.
    StorageMediumMigrate,
    /// Delete a replica's files for one schema hash.
    DropReplica,
}

/// Rewrite of one replica from the base schema hash into the new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChangeTask {
    /// Target backend.
    pub backend_id: BackendId,
    /// Owning database.
    pub db_id: DbId,
    /// Owning table.
    pub table_id: TableId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Owning index.
    pub index_id: IndexId,
    /// Tablet being rewritten.
    pub tablet_id: TabletId,
    /// Replica being rewritten.
    pub replica_id: ReplicaId,
    /// Schema hash the replica currently serves.
    pub base_schema_hash: SchemaHash,
    /// Schema hash to build.
    pub new_schema_hash: SchemaHash,
    /// Schema version to build.
    pub new_schema_version: i32,
    /// New column list.
    pub columns: Vec<Column>,
    /// New short key column count.
    pub short_key_count: u16,
    /// Bloom filter configuration of the new schema.
    pub bloom_filter: Option<BloomFilterInfo>,
    /// On-disk layout of the new schema.
    pub storage_type: StorageType,
}

/// A command for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentTask {
    /// Delete the files of `tablet_id` under `schema_hash`.
    DropReplica {
        /// Target backend.
        backend_id: BackendId,
        /// Tablet.
        tablet_id: TabletId,
        /// Schema hash whose files are deleted.
        schema_hash: SchemaHash,
    },
    /// Move `tablet_id` to `medium`.
    StorageMediumMigrate {
        /// Target backend.
        backend_id: BackendId,
        /// Tablet.
        tablet_id: TabletId,
        /// Effective schema hash of the tablet.
        schema_hash: SchemaHash,
        /// Destination medium.
        medium: StorageMedium,
    },
    /// Rewrite a replica.
    SchemaChange(SchemaChangeTask),
}

impl AgentTask {
    /// Backend the task is addressed to.
    #[must_use]
    pub fn backend_id(&self) -> BackendId {
        match self {
            Self::DropReplica { backend_id, .. }
            | Self::StorageMediumMigrate { backend_id, .. } => *backend_id,
            Self::SchemaChange(task) => task.backend_id,
        }
    }

    /// Kind of the task.
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::DropReplica { .. } => TaskType::DropReplica,
            Self::StorageMediumMigrate { .. } => TaskType::StorageMediumMigrate,
            Self::SchemaChange(_) => TaskType::SchemaChange,
        }
    }

    /// Signature the backend echoes back in its running task set.
    #[must_use]
    pub fn signature(&self) -> u64 {
        match self {
            Self::DropReplica { tablet_id, .. } | Self::StorageMediumMigrate { tablet_id, .. } => {
                *tablet_id
            }
            Self::SchemaChange(task) => task.tablet_id,
        }
    }

    /// True if the task stays outstanding until the backend confirms it.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::DropReplica { .. })
    }
}
