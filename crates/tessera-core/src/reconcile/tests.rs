//! Tests for tablet report reconciliation.

use super::*;
use crate::catalog::{Column, Database, ReportedTabletInfo, TableDef, INITIAL_VERSION};
use crate::config::AlterConfig;
use crate::persist::{EditLogEntry, MemoryEditLog};
use crate::types::{
    AggregateType, ColumnType, KeysType, PrimitiveType, StorageMedium, TableId,
};

struct Fixture {
    catalog: Arc<Catalog>,
    log: Arc<MemoryEditLog>,
    tasks: Arc<AgentTaskQueue>,
    clone_checker: Arc<CloneChecker>,
    reconciler: TabletReconciler,
    db: Arc<Database>,
    table_id: TableId,
    /// Backends hosting the table, plus one spare at the end.
    backends: Vec<BackendId>,
}

fn fixture(replication_num: u16) -> Fixture {
    let catalog = Arc::new(Catalog::new());
    let log = Arc::new(MemoryEditLog::new());
    let mut backends: Vec<_> = (0..replication_num)
        .map(|i| catalog.add_backend(&format!("be{i}"), 9050, &*log).unwrap())
        .collect();
    catalog.create_database("db1", &*log).unwrap();
    let def = TableDef::new(
        "t",
        KeysType::AggKeys,
        vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("v1", ColumnType::new(PrimitiveType::BigInt)).aggregate(AggregateType::Sum),
        ],
    )
    .with_replication_num(replication_num);
    let table_id = catalog
        .create_table("db1", &def, &AlterConfig::default(), &*log)
        .unwrap();
    backends.push(catalog.add_backend("spare", 9050, &*log).unwrap());
    let db = catalog.db_by_name("db1").unwrap();

    let tasks = Arc::new(AgentTaskQueue::new());
    let clone_checker = Arc::new(CloneChecker::new());
    let reconciler = TabletReconciler::new(
        Arc::clone(&catalog),
        log.clone(),
        Arc::clone(&tasks),
        Arc::clone(&clone_checker),
        Arc::new(AlterHandlers::new()),
    );
    Fixture {
        catalog,
        log,
        tasks,
        clone_checker,
        reconciler,
        db,
        table_id,
        backends,
    }
}

fn info(schema_hash: SchemaHash, version: i64, version_hash: i64) -> ReportedTabletInfo {
    ReportedTabletInfo {
        schema_hash,
        version,
        version_hash,
        row_count: 0,
        data_size: 0,
        storage_medium: Some(StorageMedium::Hdd),
    }
}

/// The only tablet of the table with its active schema hash.
fn tablet(f: &Fixture) -> (TabletId, SchemaHash) {
    let tables = f.db.read();
    let table = tables.table(f.table_id).unwrap();
    let tablet_id = *table
        .partitions
        .values()
        .next()
        .unwrap()
        .index(table.base_index_id)
        .unwrap()
        .tablets
        .keys()
        .next()
        .unwrap();
    (tablet_id, table.schema_hash(table.base_index_id).unwrap())
}

/// What a healthy replica holder reports: the tablet exactly as the catalog has it.
fn inventory(f: &Fixture) -> BTreeMap<TabletId, ReportedTablet> {
    let (tablet_id, schema_hash) = tablet(f);
    BTreeMap::from([(
        tablet_id,
        ReportedTablet {
            infos: vec![info(schema_hash, INITIAL_VERSION, 0)],
        },
    )])
}

fn replica_backends(f: &Fixture) -> Vec<BackendId> {
    let (tablet_id, _) = tablet(f);
    let meta = f.catalog.inverted_index().tablet_meta(tablet_id).unwrap();
    let tables = f.db.read();
    let mut ids: Vec<_> = tables
        .table(f.table_id)
        .unwrap()
        .tablet(meta.partition_id, meta.index_id, tablet_id)
        .unwrap()
        .replicas
        .iter()
        .map(|r| r.backend_id)
        .collect();
    ids.sort_unstable();
    ids
}

fn drop_tasks(f: &Fixture, backend_id: BackendId) -> Vec<SchemaHash> {
    f.tasks
        .take_dispatched(backend_id)
        .into_iter()
        .filter_map(|task| match task {
            AgentTask::DropReplica { schema_hash, .. } => Some(schema_hash),
            _ => None,
        })
        .collect()
}

// ========================================================================
// Staleness and idempotence
// ========================================================================

#[test]
fn test_healthy_report_changes_nothing() {
    let f = fixture(3);
    let backend = f.backends[0];

    let summary = f.reconciler.reconcile(backend, &inventory(&f), 1);

    assert_eq!(summary, ReconcileSummary::default());
    assert_eq!(f.catalog.system_info().last_tablet_report_version(backend), 1);
}

#[test]
fn test_replayed_report_is_stale() {
    // Arrange
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, schema_hash) = tablet(&f);
    let report = BTreeMap::from([(
        tablet_id,
        ReportedTablet {
            infos: vec![info(schema_hash, 6, 66)],
        },
    )]);
    f.reconciler.reconcile(backend, &report, 7);
    let after_first = f.db.read().table(f.table_id).unwrap().clone();
    let log_len = f.log.len();

    // Act
    let again = f.reconciler.reconcile(backend, &report, 7);
    let older = f.reconciler.reconcile(backend, &BTreeMap::new(), 6);

    // Assert
    assert!(again.stale);
    assert!(older.stale);
    assert_eq!(f.db.read().table(f.table_id).unwrap(), &after_first);
    assert_eq!(f.log.len(), log_len);
}

#[test]
fn test_report_behind_acknowledged_version_is_stale() {
    let f = fixture(3);
    let backend = f.backends[0];
    f.catalog.system_info().update_report_version(backend, 10);

    let summary = f.reconciler.reconcile(backend, &BTreeMap::new(), 9);

    assert!(summary.stale);
    assert_eq!(replica_backends(&f).len(), 3);
}

// ========================================================================
// Sync
// ========================================================================

#[test]
fn test_sync_brings_replica_to_reported_version() {
    // Arrange
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, schema_hash) = tablet(&f);
    let meta = f.catalog.inverted_index().tablet_meta(tablet_id).unwrap();
    {
        let mut tables = f.db.write();
        let replica = tables
            .table_mut(f.table_id)
            .unwrap()
            .tablet_mut(meta.partition_id, meta.index_id, tablet_id)
            .unwrap()
            .replica_by_backend_mut(backend)
            .unwrap();
        replica.update_info(5, 55, 0, 0);
    }
    let mut reported = info(schema_hash, 6, 66);
    reported.row_count = 100;
    reported.data_size = 4096;

    // Act
    let summary = f.reconciler.reconcile(
        backend,
        &BTreeMap::from([(tablet_id, ReportedTablet { infos: vec![reported] })]),
        1,
    );

    // Assert
    assert_eq!(summary.synced, 1);
    let tables = f.db.read();
    let replica = tables
        .table(f.table_id)
        .unwrap()
        .tablet(meta.partition_id, meta.index_id, tablet_id)
        .unwrap()
        .replica_by_backend(backend)
        .unwrap()
        .clone();
    assert_eq!((replica.version, replica.version_hash), (6, 66));
    assert_eq!((replica.row_count, replica.data_size), (100, 4096));
}

#[test]
fn test_sync_skips_busy_replica() {
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, schema_hash) = tablet(&f);
    let meta = f.catalog.inverted_index().tablet_meta(tablet_id).unwrap();
    f.db
        .write()
        .table_mut(f.table_id)
        .unwrap()
        .tablet_mut(meta.partition_id, meta.index_id, tablet_id)
        .unwrap()
        .replica_by_backend_mut(backend)
        .unwrap()
        .state = ReplicaState::Clone;

    let summary = f.reconciler.reconcile(
        backend,
        &BTreeMap::from([(
            tablet_id,
            ReportedTablet {
                infos: vec![info(schema_hash, 9, 99)],
            },
        )]),
        1,
    );

    assert_eq!(summary.synced, 0);
    assert_eq!(summary.skipped, 1);
}

// ========================================================================
// Delete from meta
// ========================================================================

#[test]
fn test_missing_tablet_deleted_from_meta() {
    // Arrange
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, _) = tablet(&f);

    // Act
    let summary = f.reconciler.reconcile(backend, &BTreeMap::new(), 1);

    // Assert
    assert_eq!(summary.deleted_from_meta, 1);
    assert!(!replica_backends(&f).contains(&backend));
    assert!(f.catalog.inverted_index().tablets_on_backend(backend).is_empty());
    assert!(matches!(
        f.log.entries().last(),
        Some(EditLogEntry::DeleteReplica(info)) if info.tablet_id == tablet_id && info.backend_id == backend
    ));
    assert_eq!(f.clone_checker.take_pending()[0].tablet_id, tablet_id);
}

#[test]
fn test_last_replica_never_deleted() {
    let f = fixture(1);
    let backend = f.backends[0];
    let log_len = f.log.len();

    let summary = f.reconciler.reconcile(backend, &BTreeMap::new(), 1);

    assert_eq!(summary.deleted_from_meta, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(replica_backends(&f), vec![backend]);
    assert_eq!(f.log.len(), log_len);
}

#[test]
fn test_delete_not_applied_when_log_rejects() {
    let f = fixture(3);
    let backend = f.backends[0];
    f.log.set_fail_appends(true);

    let summary = f.reconciler.reconcile(backend, &BTreeMap::new(), 1);

    assert_eq!(summary.deleted_from_meta, 0);
    assert!(replica_backends(&f).contains(&backend));
}

// ========================================================================
// Unknown and invalid tablets
// ========================================================================

#[test]
fn test_admission_rejected_when_replicas_sufficient() {
    // Arrange
    let f = fixture(3);
    let spare = f.backends[3];
    let (_, schema_hash) = tablet(&f);
    let report = inventory(&f);

    // Act
    let summary = f.reconciler.reconcile(spare, &report, 1);

    // Assert
    assert_eq!(summary.admitted, 0);
    assert_eq!(summary.dropped_from_backend, 1);
    assert_eq!(drop_tasks(&f, spare), vec![schema_hash]);
    assert_eq!(replica_backends(&f).len(), 3);
}

#[test]
fn test_admission_fills_missing_replica() {
    // Arrange
    let f = fixture(3);
    let spare = f.backends[3];
    let (tablet_id, schema_hash) = tablet(&f);
    f.catalog.system_info().set_alive(f.backends[0], false);
    let report = BTreeMap::from([(
        tablet_id,
        ReportedTablet {
            infos: vec![info(schema_hash, INITIAL_VERSION, 0)],
        },
    )]);

    // Act
    let summary = f.reconciler.reconcile(spare, &report, 1);

    // Assert
    assert_eq!(summary.admitted, 1);
    assert!(replica_backends(&f).contains(&spare));
    assert!(matches!(
        f.log.entries().last(),
        Some(EditLogEntry::AddReplica(info)) if info.backend_id == spare
    ));
    // the next report sees the replica as known
    let again = f.reconciler.reconcile(spare, &report, 2);
    assert_eq!(again, ReconcileSummary::default());
}

#[test]
fn test_admission_is_noop_for_existing_replica() {
    let f = fixture(3);
    let (tablet_id, schema_hash) = tablet(&f);

    let admitted = f
        .reconciler
        .admit(f.backends[0], tablet_id, &info(schema_hash, INITIAL_VERSION, 0));

    assert_eq!(admitted, Ok(false));
}

#[test]
fn test_admission_rules() {
    let f = fixture(3);
    let spare = f.backends[3];
    let (tablet_id, schema_hash) = tablet(&f);
    f.catalog.system_info().set_alive(f.backends[0], false);

    let old = f.reconciler.admit(spare, tablet_id, &info(schema_hash, 0, 0));
    let wrong_hash = f
        .reconciler
        .admit(spare, tablet_id, &info(schema_hash + 1, INITIAL_VERSION, 0));
    let unknown = f
        .reconciler
        .admit(spare, 999_999, &info(schema_hash, INITIAL_VERSION, 0));

    assert!(matches!(old, Err(ReconcileError::VersionTooOld { committed: INITIAL_VERSION, .. })));
    assert!(matches!(wrong_hash, Err(ReconcileError::SchemaHashMismatch { .. })));
    assert_eq!(
        unknown,
        Err(ReconcileError::MetaNotFound("tablet[999999]".to_string()))
    );
}

#[test]
fn test_unknown_tablets_admitted_or_dropped_in_one_report() {
    // Arrange: the spare holds the real tablet and one the catalog never had
    let f = fixture(3);
    let spare = f.backends[3];
    let (tablet_id, schema_hash) = tablet(&f);
    f.catalog.system_info().set_alive(f.backends[0], false);
    let report = BTreeMap::from([
        (
            tablet_id,
            ReportedTablet {
                infos: vec![info(schema_hash, INITIAL_VERSION, 0)],
            },
        ),
        (
            999_999,
            ReportedTablet {
                infos: vec![info(777, INITIAL_VERSION, 0)],
            },
        ),
    ]);

    // Act
    let summary = f.reconciler.reconcile(spare, &report, 1);

    // Assert
    assert_eq!(summary.admitted, 1);
    assert_eq!(summary.dropped_from_backend, 1);
    assert_eq!(drop_tasks(&f, spare), vec![777]);
    assert!(replica_backends(&f).contains(&spare));
}

#[test]
fn test_invalid_schema_copy_dropped() {
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, schema_hash) = tablet(&f);
    let report = BTreeMap::from([(
        tablet_id,
        ReportedTablet {
            infos: vec![
                info(schema_hash, INITIAL_VERSION, 0),
                info(12_345, INITIAL_VERSION, 0),
            ],
        },
    )]);

    let summary = f.reconciler.reconcile(backend, &report, 1);

    assert_eq!(summary.dropped_from_backend, 1);
    assert_eq!(summary.deleted_from_meta, 0);
    assert_eq!(drop_tasks(&f, backend), vec![12_345]);
}

// ========================================================================
// Migration
// ========================================================================

#[test]
fn test_wrong_medium_triggers_migration() {
    let f = fixture(3);
    let backend = f.backends[0];
    let (tablet_id, schema_hash) = tablet(&f);
    let mut reported = info(schema_hash, INITIAL_VERSION, 0);
    reported.storage_medium = Some(StorageMedium::Ssd);

    let summary = f.reconciler.reconcile(
        backend,
        &BTreeMap::from([(tablet_id, ReportedTablet { infos: vec![reported] })]),
        1,
    );

    assert_eq!(summary.migrations, 1);
    assert!(matches!(
        &f.tasks.take_dispatched(backend)[..],
        [AgentTask::StorageMediumMigrate { medium: StorageMedium::Hdd, schema_hash: h, .. }] if *h == schema_hash
    ));
}
