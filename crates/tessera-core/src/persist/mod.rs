//! Write-ahead edit log.
//!
//! Every catalog mutation is appended here before it is applied in memory,
//! while the owning database's write lock is still held. Replay at startup
//! runs the same apply functions in log order.
//!
//! # Public Types
//!
//! - [`EditLog`]: append/replay contract
//! - [`EditLogEntry`]: one logged mutation
//! - [`FileEditLog`]: CRC-framed append-only file
//! - [`MemoryEditLog`]: in-process log for tests and embedding

mod file_log;
#[cfg(test)]
mod file_log_tests;
mod memory_log;

pub use file_log::{FileEditLog, EDIT_LOG_FILE};
pub use memory_log::MemoryEditLog;

use serde::{Deserialize, Serialize};

use crate::alter::SchemaChangeJob;
use crate::catalog::{Backend, OlapTable};
use crate::error::Result;
use crate::types::{
    BackendId, DbId, IndexId, PartitionId, ReplicaId, TableId, TabletId, Version, VersionHash,
};

/// A single replica added to or removed from a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaPersistInfo {
    /// Owning database.
    pub db_id: DbId,
    /// Owning table.
    pub table_id: TableId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Owning index.
    pub index_id: IndexId,
    /// Tablet.
    pub tablet_id: TabletId,
    /// Hosting backend.
    pub backend_id: BackendId,
    /// Replica id, zero for deletions.
    pub replica_id: ReplicaId,
    /// Data version.
    pub version: Version,
    /// Hash of `version`.
    pub version_hash: VersionHash,
    /// Bytes on disk.
    pub data_size: i64,
    /// Row count.
    pub row_count: i64,
}

impl ReplicaPersistInfo {
    /// Record for removing the replica of `tablet_id` on `backend_id`.
    #[must_use]
    pub fn for_delete(
        db_id: DbId,
        table_id: TableId,
        partition_id: PartitionId,
        index_id: IndexId,
        tablet_id: TabletId,
        backend_id: BackendId,
    ) -> Self {
        Self {
            db_id,
            table_id,
            partition_id,
            index_id,
            tablet_id,
            backend_id,
            replica_id: 0,
            version: -1,
            version_hash: -1,
            data_size: -1,
            row_count: -1,
        }
    }
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditLogEntry {
    /// A database was created.
    CreateDatabase {
        /// New database id.
        db_id: DbId,
        /// Database name.
        name: String,
    },
    /// A table was created with its full tablet tree.
    CreateTable {
        /// Owning database.
        db_id: DbId,
        /// The table.
        table: OlapTable,
    },
    /// A backend joined the cluster.
    AddBackend(Backend),
    /// A schema change job was accepted.
    StartSchemaChange(SchemaChangeJob),
    /// A schema change job finished and installed its new schemas.
    FinishSchemaChange(SchemaChangeJob),
    /// A schema change job was cancelled.
    CancelSchemaChange(SchemaChangeJob),
    /// A replica was admitted into the catalog.
    AddReplica(ReplicaPersistInfo),
    /// A replica was removed from the catalog.
    DeleteReplica(ReplicaPersistInfo),
}

impl EditLogEntry {
    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateDatabase { .. } => "create_database",
            Self::CreateTable { .. } => "create_table",
            Self::AddBackend(_) => "add_backend",
            Self::StartSchemaChange(_) => "start_schema_change",
            Self::FinishSchemaChange(_) => "finish_schema_change",
            Self::CancelSchemaChange(_) => "cancel_schema_change",
            Self::AddReplica(_) => "add_replica",
            Self::DeleteReplica(_) => "delete_replica",
        }
    }
}

/// Durable append-only log of catalog mutations.
///
/// `append` must be durable before it returns: callers apply the in-memory
/// mutation only after a successful append.
pub trait EditLog: Send + Sync + std::fmt::Debug {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EditLog`] or an I/O error if the entry was not persisted.
    fn append(&self, entry: &EditLogEntry) -> Result<()>;

    /// Reads back every intact entry in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn replay(&self) -> Result<Vec<EditLogEntry>>;

    /// Logs acceptance of a schema change job.
    fn log_start_schema_change(&self, job: &SchemaChangeJob) -> Result<()> {
        self.append(&EditLogEntry::StartSchemaChange(job.clone()))
    }

    /// Logs completion of a schema change job.
    fn log_finish_schema_change(&self, job: &SchemaChangeJob) -> Result<()> {
        self.append(&EditLogEntry::FinishSchemaChange(job.clone()))
    }

    /// Logs cancellation of a schema change job.
    fn log_cancel_schema_change(&self, job: &SchemaChangeJob) -> Result<()> {
        self.append(&EditLogEntry::CancelSchemaChange(job.clone()))
    }

    /// Logs admission of a replica.
    fn log_add_replica(&self, info: &ReplicaPersistInfo) -> Result<()> {
        self.append(&EditLogEntry::AddReplica(info.clone()))
    }

    /// Logs removal of a replica.
    fn log_delete_replica(&self, info: &ReplicaPersistInfo) -> Result<()> {
        self.append(&EditLogEntry::DeleteReplica(info.clone()))
    }
}
