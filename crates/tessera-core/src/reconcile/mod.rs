//! Tablet report reconciliation.
//!
//! A backend's full tablet inventory is diffed against the catalog
//! ([`Catalog::diff_tablet_report`]) and every difference is repaired in
//! one direction or the other:
//!
//! - **sync**: the catalog replica lags the backend, so its version and
//!   statistics are overwritten.
//! - **delete from meta**: the backend lost a replica the catalog still
//!   places on it; the replica is removed unless it is the tablet's last.
//! - **unknown**: the backend holds a tablet the catalog does not place on
//!   it; the replica is admitted when the catalog still wants it, otherwise
//!   the backend is told to drop it.
//! - **invalid schema**: copies under a schema hash the tablet no longer
//!   recognises are dropped from the backend.
//! - **migration**: copies on the wrong storage medium are moved.
//!
//! Each database is locked once per step. Failures are per tablet and never
//! abort the report.

mod admission;
mod error;
#[cfg(test)]
mod tests;

pub use error::ReconcileError;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::alter::AlterHandlers;
use crate::catalog::{Catalog, DatabaseTables, ReportedTablet, TabletMeta};
use crate::persist::{EditLog, ReplicaPersistInfo};
use crate::task::{AgentTask, AgentTaskQueue, CloneChecker, SupplementRequest};
use crate::types::{BackendId, DbId, ReplicaId, ReplicaState, SchemaHash, TabletId};

/// What one tablet report changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Catalog replicas brought up to the reported version.
    pub synced: usize,
    /// Replicas removed from the catalog.
    pub deleted_from_meta: usize,
    /// Replicas admitted into the catalog.
    pub admitted: usize,
    /// Drop tasks sent to the backend.
    pub dropped_from_backend: usize,
    /// Storage medium migrations sent to the backend.
    pub migrations: usize,
    /// Tablets left alone because their path vanished, their replica was
    /// busy, or a newer report overtook this one.
    pub skipped: usize,
    /// The report was older than one already applied and was ignored.
    pub stale: bool,
}

/// Applies tablet reports to the catalog.
#[derive(Debug)]
pub struct TabletReconciler {
    catalog: Arc<Catalog>,
    edit_log: Arc<dyn EditLog>,
    tasks: Arc<AgentTaskQueue>,
    clone_checker: Arc<CloneChecker>,
    alter: Arc<AlterHandlers>,
}

impl TabletReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        edit_log: Arc<dyn EditLog>,
        tasks: Arc<AgentTaskQueue>,
        clone_checker: Arc<CloneChecker>,
        alter: Arc<AlterHandlers>,
    ) -> Self {
        Self {
            catalog,
            edit_log,
            tasks,
            clone_checker,
            alter,
        }
    }

    /// Reconciles the full tablet inventory of `backend_id`.
    pub fn reconcile(
        &self,
        backend_id: BackendId,
        reported: &BTreeMap<TabletId, ReportedTablet>,
        report_version: i64,
    ) -> ReconcileSummary {
        let system = self.catalog.system_info();
        if system.is_stale_tablet_report(backend_id, report_version) {
            warn!(
                backend_id,
                report_version,
                acknowledged = system.report_version(backend_id),
                last_applied = system.last_tablet_report_version(backend_id),
                "Stale tablet report ignored"
            );
            return ReconcileSummary {
                stale: true,
                ..ReconcileSummary::default()
            };
        }

        let diff = self.catalog.diff_tablet_report(backend_id, reported);
        let mut summary = ReconcileSummary::default();

        for (db_id, tablets) in &diff.sync {
            self.sync(backend_id, *db_id, tablets, reported, report_version, &mut summary);
        }
        for (db_id, tablets) in &diff.delete_from_meta {
            self.delete_from_meta(backend_id, *db_id, tablets, report_version, &mut summary);
        }
        self.admit_unknown(backend_id, &diff.unknown, reported, &mut summary);
        for (tablet_id, schema_hashes) in &diff.found_invalid {
            for schema_hash in schema_hashes {
                info!(backend_id, tablet_id, schema_hash, "Dropping copy with retired schema");
                self.send_drop(backend_id, *tablet_id, *schema_hash, &mut summary);
            }
        }
        for (tablet_id, medium) in &diff.migration {
            let Some(schema_hash) = self.catalog.inverted_index().effective_schema_hash(*tablet_id)
            else {
                continue;
            };
            if self.tasks.submit(AgentTask::StorageMediumMigrate {
                backend_id,
                tablet_id: *tablet_id,
                schema_hash,
                medium: *medium,
            }) {
                summary.migrations += 1;
            }
        }

        system.set_last_tablet_report_version(backend_id, report_version);
        info!(
            backend_id,
            report_version,
            synced = summary.synced,
            deleted = summary.deleted_from_meta,
            admitted = summary.admitted,
            dropped = summary.dropped_from_backend,
            migrations = summary.migrations,
            skipped = summary.skipped,
            "Tablet report reconciled"
        );
        summary
    }

    /// True once a newer report of the backend has been applied.
    fn superseded(&self, backend_id: BackendId, report_version: i64) -> bool {
        self.catalog
            .system_info()
            .is_stale_tablet_report(backend_id, report_version)
    }

    fn sync(
        &self,
        backend_id: BackendId,
        db_id: DbId,
        tablets: &[TabletId],
        reported: &BTreeMap<TabletId, ReportedTablet>,
        report_version: i64,
        summary: &mut ReconcileSummary,
    ) {
        let Some(db) = self.catalog.db(db_id) else {
            summary.skipped += tablets.len();
            return;
        };
        let mut tables = db.write();
        for tablet_id in tablets {
            if self.superseded(backend_id, report_version) {
                warn!(backend_id, report_version, "Report overtaken during sync");
                summary.skipped += 1;
                continue;
            }
            let Some(meta) = self.catalog.inverted_index().tablet_meta(*tablet_id) else {
                summary.skipped += 1;
                continue;
            };
            let Some(replica) = tables
                .table_mut(meta.table_id)
                .and_then(|t| t.tablet_mut(meta.partition_id, meta.index_id, *tablet_id))
                .and_then(|t| t.replica_by_backend_mut(backend_id))
            else {
                debug!(backend_id, tablet_id, "Sync target vanished");
                summary.skipped += 1;
                continue;
            };
            if replica.state != ReplicaState::Normal {
                summary.skipped += 1;
                continue;
            }
            let Some(info) = reported.get(tablet_id).and_then(|report| {
                report
                    .infos
                    .iter()
                    .find(|info| info.schema_hash == meta.old_schema_hash)
            }) else {
                continue;
            };
            if info.version > replica.version
                || (info.version == replica.version && info.version_hash != replica.version_hash)
            {
                debug!(
                    backend_id,
                    tablet_id,
                    from = replica.version,
                    to = info.version,
                    "Replica version synced"
                );
                replica.update_info(info.version, info.version_hash, info.data_size, info.row_count);
                summary.synced += 1;
            }
        }
    }

    fn delete_from_meta(
        &self,
        backend_id: BackendId,
        db_id: DbId,
        tablets: &[TabletId],
        report_version: i64,
        summary: &mut ReconcileSummary,
    ) {
        let Some(db) = self.catalog.db(db_id) else {
            summary.skipped += tablets.len();
            return;
        };
        let mut tables = db.write();
        for tablet_id in tablets {
            if self.superseded(backend_id, report_version) {
                warn!(backend_id, report_version, "Report overtaken during delete");
                summary.skipped += 1;
                continue;
            }
            let Some(meta) = self.catalog.inverted_index().tablet_meta(*tablet_id) else {
                summary.skipped += 1;
                continue;
            };
            let (replica_id, replication_num) =
                match deletable_replica(&tables, &meta, *tablet_id, backend_id) {
                    Ok(found) => found,
                    Err(Skip::Missing(what)) => {
                        warn!(backend_id, tablet_id, what, "Delete target vanished");
                        summary.skipped += 1;
                        continue;
                    }
                    Err(Skip::Busy(state)) => {
                        debug!(backend_id, tablet_id, %state, "Replica busy, not deleted");
                        summary.skipped += 1;
                        continue;
                    }
                    Err(Skip::LastReplica) => {
                        error!(
                            backend_id,
                            tablet_id,
                            "Backend lost the last replica of a tablet, keeping it in meta"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                };

            let info = ReplicaPersistInfo::for_delete(
                db_id,
                meta.table_id,
                meta.partition_id,
                meta.index_id,
                *tablet_id,
                backend_id,
            );
            if let Err(err) = self.edit_log.log_delete_replica(&info) {
                error!(backend_id, tablet_id, error = %err, "Failed to log replica deletion");
                summary.skipped += 1;
                continue;
            }
            self.catalog.apply_delete_replica(&mut tables, &info);

            let remaining = tables
                .table(meta.table_id)
                .and_then(|t| t.tablet(meta.partition_id, meta.index_id, *tablet_id))
                .map_or(0, |t| t.replicas.len());
            assert!(remaining > 0, "tablet {tablet_id} left without replicas");

            self.alter
                .remove_replica_related_task(meta.table_id, *tablet_id, replica_id, backend_id);
            if remaining < replication_num {
                self.clone_checker.check_tablet_for_supplement(SupplementRequest {
                    db_id,
                    table_id: meta.table_id,
                    partition_id: meta.partition_id,
                    index_id: meta.index_id,
                    tablet_id: *tablet_id,
                });
            }
            info!(backend_id, tablet_id, replica_id, remaining, "Replica deleted from meta");
            summary.deleted_from_meta += 1;
        }
    }

    fn admit_unknown(
        &self,
        backend_id: BackendId,
        unknown: &[TabletId],
        reported: &BTreeMap<TabletId, ReportedTablet>,
        summary: &mut ReconcileSummary,
    ) {
        let mut by_db: BTreeMap<DbId, Vec<(TabletId, TabletMeta)>> = BTreeMap::new();
        for tablet_id in unknown {
            match self.catalog.inverted_index().tablet_meta(*tablet_id) {
                Some(meta) => by_db.entry(meta.db_id).or_default().push((*tablet_id, meta)),
                None => {
                    let err = ReconcileError::MetaNotFound(format!("tablet[{tablet_id}]"));
                    self.reject_all(backend_id, *tablet_id, reported, &err, summary);
                }
            }
        }

        for (db_id, tablets) in by_db {
            let Some(db) = self.catalog.db(db_id) else {
                let err = ReconcileError::MetaNotFound(format!("database[{db_id}]"));
                for (tablet_id, _) in &tablets {
                    self.reject_all(backend_id, *tablet_id, reported, &err, summary);
                }
                continue;
            };
            let mut tables = db.write();
            for (tablet_id, meta) in &tablets {
                let Some(report) = reported.get(tablet_id) else {
                    continue;
                };
                for info in &report.infos {
                    match self.admit_locked(&mut tables, meta, backend_id, *tablet_id, info) {
                        Ok(true) => summary.admitted += 1,
                        Ok(false) => {}
                        Err(err) => {
                            self.reject(backend_id, *tablet_id, info.schema_hash, &err, summary);
                        }
                    }
                }
            }
        }
    }

    fn reject_all(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        reported: &BTreeMap<TabletId, ReportedTablet>,
        err: &ReconcileError,
        summary: &mut ReconcileSummary,
    ) {
        for info in reported.get(&tablet_id).map_or(&[][..], |r| &r.infos[..]) {
            self.reject(backend_id, tablet_id, info.schema_hash, err, summary);
        }
    }

    fn reject(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
        err: &ReconcileError,
        summary: &mut ReconcileSummary,
    ) {
        if err.should_drop() {
            info!(backend_id, tablet_id, reason = %err, "Orphan copy dropped from backend");
            self.send_drop(backend_id, tablet_id, schema_hash, summary);
        } else {
            error!(backend_id, tablet_id, error = %err, "Replica admission failed");
            summary.skipped += 1;
        }
    }

    fn send_drop(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
        summary: &mut ReconcileSummary,
    ) {
        self.tasks.submit(AgentTask::DropReplica {
            backend_id,
            tablet_id,
            schema_hash,
        });
        summary.dropped_from_backend += 1;
    }
}

enum Skip {
    Missing(&'static str),
    Busy(ReplicaState),
    LastReplica,
}

/// The replica of `tablet_id` on `backend_id` and the partition's
/// replication factor, if that replica may be removed.
fn deletable_replica(
    tables: &DatabaseTables,
    meta: &TabletMeta,
    tablet_id: TabletId,
    backend_id: BackendId,
) -> Result<(ReplicaId, usize), Skip> {
    let table = tables.table(meta.table_id).ok_or(Skip::Missing("table"))?;
    let partition = table
        .partition(meta.partition_id)
        .ok_or(Skip::Missing("partition"))?;
    let tablet = partition
        .index(meta.index_id)
        .ok_or(Skip::Missing("index"))?
        .tablet(tablet_id)
        .ok_or(Skip::Missing("tablet"))?;
    let replica = tablet
        .replica_by_backend(backend_id)
        .ok_or(Skip::Missing("replica"))?;
    if !matches!(replica.state, ReplicaState::Normal | ReplicaState::SchemaChange) {
        return Err(Skip::Busy(replica.state));
    }
    if tablet.replicas.len() <= 1 {
        return Err(Skip::LastReplica);
    }
    Ok((replica.id, usize::from(partition.replication_num)))
}
