//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_core::catalog::{ReportedTablet, ReportedTabletInfo};
use tessera_core::types::{AggregateType, BackendId, ColumnType, PrimitiveType, TableId, TabletId};
use tessera_core::{
    Column, FinishedReplica, ManualClock, Master, MemoryEditLog, RequestContext, TableDef,
    TesseraConfig,
};

/// Clock origin of every harness.
pub const START_MS: i64 = 1_700_000_000_000;

/// A master over an in-memory edit log with a manual clock.
pub struct Harness {
    pub master: Master,
    pub log: Arc<MemoryEditLog>,
    pub clock: Arc<ManualClock>,
    pub backends: Vec<BackendId>,
}

pub fn config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.alter.alter_table_timeout_secs = 600;
    config.alter.alter_delete_base_delay_secs = 60;
    config.alter.scheduler_interval_ms = 10;
    config.report.enqueue_timeout_ms = 10;
    config
}

/// Master with `backends` registered backends and database `db1`.
pub fn harness(backends: usize) -> Harness {
    let log = Arc::new(MemoryEditLog::new());
    let clock = Arc::new(ManualClock::new(START_MS));
    let master = Master::with_edit_log(config(), log.clone(), clock.clone())
        .expect("open master");
    let backends = (0..backends)
        .map(|i| master.add_backend(&format!("be{i}"), 9050).expect("add backend"))
        .collect();
    master.create_database(&ctx(), "db1").expect("create database");
    Harness {
        master,
        log,
        clock,
        backends,
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("admin", "default_cluster")
}

pub fn int(name: &str) -> Column {
    Column::new(name, ColumnType::new(PrimitiveType::Int))
}

pub fn big(name: &str) -> Column {
    Column::new(name, ColumnType::new(PrimitiveType::BigInt))
}

pub fn sum(name: &str) -> Column {
    big(name).aggregate(AggregateType::Sum)
}

pub fn names(columns: &[Column]) -> Vec<&str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

impl Harness {
    pub fn create_table(&self, def: &TableDef) -> TableId {
        self.master
            .create_table(&ctx(), "db1", def)
            .expect("create table")
    }

    /// Column names of an index of a table.
    pub fn schema(&self, table_id: TableId, index_name: &str) -> Vec<String> {
        let db = self.master.catalog().db_by_name("db1").expect("db1");
        let tables = db.read();
        let table = tables.table(table_id).expect("table");
        let index_id = table.index_id_by_name(index_name).expect("index");
        table
            .index_schema(index_id)
            .expect("schema")
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Reports every tracked replica of the live job of `table_id` as rewritten.
    pub fn finish_all_replicas(&self, table_id: TableId) {
        let job = self
            .master
            .schema_change()
            .live_job(table_id)
            .expect("live job");
        for task in job.replicas.values() {
            self.master
                .finish_schema_change_task(&FinishedReplica {
                    backend_id: task.backend_id,
                    tablet_id: task.tablet_id,
                    schema_hash: job.changes[&task.index_id].schema_hash,
                    version: 1,
                    version_hash: 0,
                    row_count: 0,
                    data_size: 0,
                    report_version: None,
                })
                .expect("finish replica");
        }
    }

    /// Full, accurate tablet inventory of a backend as the catalog sees it.
    pub fn inventory(&self, backend_id: BackendId) -> BTreeMap<TabletId, ReportedTablet> {
        let mut inventory = BTreeMap::new();
        let catalog = self.master.catalog();
        for db_id in catalog.db_ids() {
            let db = catalog.db(db_id).expect("db");
            let tables = db.read();
            for table in tables.iter() {
                for partition in table.partitions.values() {
                    for index in partition.indexes.values() {
                        let schema_hash = table.schema_hash(index.id).expect("schema hash");
                        for tablet in index.tablets.values() {
                            if let Some(replica) = tablet.replica_by_backend(backend_id) {
                                inventory.insert(
                                    tablet.id,
                                    ReportedTablet {
                                        infos: vec![ReportedTabletInfo {
                                            schema_hash,
                                            version: replica.version,
                                            version_hash: replica.version_hash,
                                            row_count: replica.row_count,
                                            data_size: replica.data_size,
                                            storage_medium: Some(partition.storage_medium),
                                        }],
                                    },
                                );
                            }
                        }
                    }
                }
            }
        }
        inventory
    }

    /// Backends hosting a replica of a tablet.
    pub fn replica_backends(&self, tablet_id: TabletId) -> Vec<BackendId> {
        let catalog = self.master.catalog();
        let meta = catalog.inverted_index().tablet_meta(tablet_id).expect("meta");
        let db = catalog.db(meta.db_id).expect("db");
        let tables = db.read();
        let table = tables.table(meta.table_id).expect("table");
        table
            .tablet(meta.partition_id, meta.index_id, tablet_id)
            .expect("tablet")
            .replicas
            .iter()
            .map(|r| r.backend_id)
            .collect()
    }
}
