//! Per-tablet reconciliation failures.

use thiserror::Error;

use crate::types::{SchemaHash, TabletId, Version};

/// Reason a reported tablet could not be reconciled.
///
/// Never aborts a report: the reconciler logs it and either skips the
/// tablet or tells the backend to drop its copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Some level of the tablet's owning path is gone.
    #[error("{0} does not exist")]
    MetaNotFound(String),

    /// The reported data predates the partition's committed version.
    #[error("tablet[{tablet_id}] version {reported} is older than committed version {committed}")]
    VersionTooOld {
        /// Tablet.
        tablet_id: TabletId,
        /// Reported version.
        reported: Version,
        /// Committed version of the partition.
        committed: Version,
    },

    /// The reported schema hash is not the index's active one.
    #[error("tablet[{tablet_id}] schema hash {reported} does not match {expected}")]
    SchemaHashMismatch {
        /// Tablet.
        tablet_id: TabletId,
        /// Reported hash.
        reported: SchemaHash,
        /// Active hash.
        expected: SchemaHash,
    },

    /// The tablet already has enough online replicas.
    #[error("tablet[{tablet_id}] replica already sufficient: {online}/{replication_num}")]
    ReplicaSufficient {
        /// Tablet.
        tablet_id: TabletId,
        /// Online replicas.
        online: usize,
        /// Replication factor.
        replication_num: u16,
    },

    /// The edit log rejected the admission record.
    #[error("edit log rejected replica record: {0}")]
    EditLog(String),
}

impl ReconcileError {
    /// True if the backend should be told to drop its copy.
    #[must_use]
    pub const fn should_drop(&self) -> bool {
        !matches!(self, Self::EditLog(_))
    }
}
