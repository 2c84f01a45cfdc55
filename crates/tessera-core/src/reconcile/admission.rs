//! Re-admission of replicas the catalog does not place on a backend.

use tracing::info;

use super::{ReconcileError, TabletReconciler};
use crate::catalog::{DatabaseTables, ReportedTabletInfo, TabletMeta};
use crate::persist::ReplicaPersistInfo;
use crate::types::{BackendId, ReplicaState, TabletId};

impl TabletReconciler {
    /// Attaches the reported copy as a NORMAL replica when the tablet still
    /// wants one.
    ///
    /// Returns `Ok(false)` when the backend already hosts a replica of the
    /// tablet, so a repeated report is a no-op.
    #[cfg(test)]
    pub(crate) fn admit(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        reported: &ReportedTabletInfo,
    ) -> Result<bool, ReconcileError> {
        let meta = self
            .catalog
            .inverted_index()
            .tablet_meta(tablet_id)
            .ok_or_else(|| ReconcileError::MetaNotFound(format!("tablet[{tablet_id}]")))?;
        let db = self
            .catalog
            .db(meta.db_id)
            .ok_or_else(|| ReconcileError::MetaNotFound(format!("database[{}]", meta.db_id)))?;
        let mut tables = db.write();
        self.admit_locked(&mut tables, &meta, backend_id, tablet_id, reported)
    }

    /// [`admit`](Self::admit) with the owning database already write-locked.
    pub(crate) fn admit_locked(
        &self,
        tables: &mut DatabaseTables,
        meta: &TabletMeta,
        backend_id: BackendId,
        tablet_id: TabletId,
        reported: &ReportedTabletInfo,
    ) -> Result<bool, ReconcileError> {
        {
            let table = tables
                .table(meta.table_id)
                .ok_or_else(|| ReconcileError::MetaNotFound(format!("table[{}]", meta.table_id)))?;
            let partition = table.partition(meta.partition_id).ok_or_else(|| {
                ReconcileError::MetaNotFound(format!("partition[{}]", meta.partition_id))
            })?;
            let active_hash = table.schema_hash(meta.index_id).ok_or_else(|| {
                ReconcileError::MetaNotFound(format!("index[{}]", meta.index_id))
            })?;
            let tablet = table
                .tablet(meta.partition_id, meta.index_id, tablet_id)
                .ok_or_else(|| ReconcileError::MetaNotFound(format!("tablet[{tablet_id}]")))?;

            if reported.version < partition.committed_version
                || (reported.version == partition.committed_version
                    && reported.version_hash != partition.committed_version_hash)
            {
                return Err(ReconcileError::VersionTooOld {
                    tablet_id,
                    reported: reported.version,
                    committed: partition.committed_version,
                });
            }
            if reported.schema_hash != active_hash {
                return Err(ReconcileError::SchemaHashMismatch {
                    tablet_id,
                    reported: reported.schema_hash,
                    expected: active_hash,
                });
            }
            if tablet.replica_by_backend(backend_id).is_some() {
                return Ok(false);
            }

            let system = self.catalog.system_info();
            let online = tablet
                .replicas
                .iter()
                .filter(|r| r.state == ReplicaState::Normal && system.is_available(r.backend_id))
                .count();
            if online >= usize::from(partition.replication_num) {
                return Err(ReconcileError::ReplicaSufficient {
                    tablet_id,
                    online,
                    replication_num: partition.replication_num,
                });
            }
        }

        let info = ReplicaPersistInfo {
            db_id: meta.db_id,
            table_id: meta.table_id,
            partition_id: meta.partition_id,
            index_id: meta.index_id,
            tablet_id,
            backend_id,
            replica_id: self.catalog.next_id(),
            version: reported.version,
            version_hash: reported.version_hash,
            data_size: reported.data_size,
            row_count: reported.row_count,
        };
        self.edit_log
            .log_add_replica(&info)
            .map_err(|err| ReconcileError::EditLog(err.to_string()))?;
        self.catalog.apply_add_replica(tables, &info);
        info!(backend_id, tablet_id, replica_id = info.replica_id, "Replica admitted");
        Ok(true)
    }
}
