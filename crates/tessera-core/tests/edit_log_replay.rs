//! Restart recovery: a master reopened over the same metadata directory
//! rebuilds its catalog and alter jobs from the file edit log.

mod common;

use std::collections::BTreeMap;

use common::{ctx, int, sum};
use tempfile::TempDir;
use tessera_core::types::{KeysType, TableId, TableState};
use tessera_core::{AlterClause, FinishedReplica, JobState, Master, ReportRequest, TableDef, TesseraConfig};

fn open(dir: &TempDir) -> Master {
    let mut config = TesseraConfig::default();
    config.storage.meta_dir = dir.path().to_string_lossy().into_owned();
    config.storage.edit_log_sync = false;
    Master::open(config).expect("open master")
}

fn seed(master: &Master) -> TableId {
    for i in 0..3 {
        master.add_backend(&format!("be{i}"), 9050).expect("add backend");
    }
    master.create_database(&ctx(), "db1").expect("create database");
    master
        .create_table(
            &ctx(),
            "db1",
            &TableDef::new("t", KeysType::AggKeys, vec![int("k1").key(), sum("v1")]),
        )
        .expect("create table")
}

fn table_state(master: &Master, table_id: TableId) -> (TableState, Vec<String>) {
    let db = master.catalog().db_by_name("db1").expect("db1");
    let tables = db.read();
    let table = tables.table(table_id).expect("table");
    let columns = table.base_schema().iter().map(|c| c.name.clone()).collect();
    (table.state, columns)
}

fn replica_count(master: &Master, table_id: TableId) -> usize {
    let db = master.catalog().db_by_name("db1").expect("db1");
    let tables = db.read();
    tables
        .table(table_id)
        .expect("table")
        .partitions
        .values()
        .flat_map(|p| p.indexes.values())
        .flat_map(|i| i.tablets.values())
        .map(|t| t.replicas.len())
        .sum()
}

#[test]
fn test_reopen_restores_finished_schema_change_and_deleted_replica() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let master = open(&dir);
    let table_id = seed(&master);
    let lost_on = master.catalog().system_info().backend_ids()[0];
    master
        .handle_report(ReportRequest {
            backend_id: lost_on,
            tablets: Some(BTreeMap::new()),
            report_version: 1,
            ..ReportRequest::default()
        })
        .expect("enqueue");
    master.process_pending_reports();

    master
        .alter_table(&ctx(), "db1", "t", &[AlterClause::add_column(sum("v2"))])
        .expect("alter");
    master.run_alter_cycle();
    let job = master.schema_change().live_job(table_id).expect("live job");
    for task in job.replicas.values() {
        master
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
    master.run_alter_cycle();
    drop(master);

    // Act
    let reopened = open(&dir);

    // Assert
    assert_eq!(
        table_state(&reopened, table_id),
        (TableState::Normal, vec!["k1".into(), "v1".into(), "v2".into()])
    );
    assert_eq!(replica_count(&reopened, table_id), 2);
    let rows = reopened.show_alter_jobs("db1").expect("show");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, JobState::Finished.to_string());
    assert!(reopened.catalog().next_id() > job.job_id);
}

#[test]
fn test_reopen_restores_running_job_then_cancel() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let master = open(&dir);
    let table_id = seed(&master);
    let job_id = master
        .alter_table(&ctx(), "db1", "t", &[AlterClause::add_column(sum("v2"))])
        .expect("alter");
    drop(master);

    // Act
    let reopened = open(&dir);
    let live = reopened.schema_change().live_job(table_id).map(|job| job.job_id);
    reopened
        .cancel_alter_table(&ctx(), "db1", "t")
        .expect("cancel");
    drop(reopened);
    let again = open(&dir);

    // Assert
    assert_eq!(live, Some(job_id));
    assert_eq!(
        table_state(&again, table_id),
        (TableState::Normal, vec!["k1".into(), "v1".into()])
    );
    assert!(again.schema_change().live_job(table_id).is_none());
    let rows = again.show_alter_jobs("db1").expect("show");
    assert_eq!(rows[0].state, JobState::Cancelled.to_string());
    assert_eq!(rows[0].msg, "user cancelled");
}
