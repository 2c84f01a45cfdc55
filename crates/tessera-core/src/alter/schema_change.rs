//! Schema change handler: turns validated statements into jobs and drives
//! them from the scheduler tick.
//!
//! Lock order is database lock, then job mutex, then the leaf registries.
//! Every state transition appends its edit log record before touching the
//! in-memory catalog; a rejected append leaves the job where it was.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::job::{FinishStatus, IndexChange, JobState, SchemaChangeJob};
use super::properties::{
    analyze_bloom_filter_columns, analyze_bloom_filter_fpp, resolve_bloom_filter_change,
    short_key_overrides, BloomFilterChange,
};
use super::registry::{AlterJobRegistry, JobHandle};
use super::validator::{SchemaMutator, ValidatedMutation};
use super::{format_time_ms, AlterClause, AlterHandler, AlterJobInfo, AlterKind};
use crate::catalog::{check_key_order, schema, Catalog, Column, Database, DistributionInfo, OlapTable};
use crate::clock::Clock;
use crate::config::AlterConfig;
use crate::error::{Error, Result};
use crate::persist::EditLog;
use crate::task::{AgentTaskQueue, CloneChecker, TaskType};
use crate::types::{
    BackendId, DbId, IndexId, IndexState, JobId, ReplicaId, ReplicaState, SchemaHash,
    StorageType, TableId, TableState, TabletId, Version, VersionHash,
};

/// A backend's answer to one schema change task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedReplica {
    /// Reporting backend.
    pub backend_id: BackendId,
    /// Rewritten tablet.
    pub tablet_id: TabletId,
    /// Schema hash the replica was rewritten into.
    pub schema_hash: SchemaHash,
    /// Version of the rewritten replica.
    pub version: Version,
    /// Hash of `version`.
    pub version_hash: VersionHash,
    /// Row count.
    pub row_count: i64,
    /// Bytes on disk.
    pub data_size: i64,
    /// Report version the backend attached to the answer.
    pub report_version: Option<i64>,
}

/// Schema change handler.
#[derive(Debug)]
pub struct SchemaChangeHandler {
    catalog: Arc<Catalog>,
    edit_log: Arc<dyn EditLog>,
    tasks: Arc<AgentTaskQueue>,
    clone_checker: Arc<CloneChecker>,
    clock: Arc<dyn Clock>,
    config: AlterConfig,
    jobs: AlterJobRegistry,
}

impl SchemaChangeHandler {
    /// Creates a handler with an empty job registry.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        edit_log: Arc<dyn EditLog>,
        tasks: Arc<AgentTaskQueue>,
        clone_checker: Arc<CloneChecker>,
        clock: Arc<dyn Clock>,
        config: AlterConfig,
    ) -> Self {
        Self {
            catalog,
            edit_log,
            tasks,
            clone_checker,
            clock,
            config,
            jobs: AlterJobRegistry::new(),
        }
    }

    /// Job registry.
    #[must_use]
    pub fn jobs(&self) -> &AlterJobRegistry {
        &self.jobs
    }

    /// Copy of the live job of a table.
    #[must_use]
    pub fn live_job(&self, table_id: TableId) -> Option<SchemaChangeJob> {
        self.jobs.live(table_id).map(|handle| handle.job.lock().clone())
    }

    /// Validates `clauses` against `table_name` and starts a job.
    ///
    /// # Errors
    ///
    /// Validation, precondition and busy-table errors leave the catalog
    /// untouched, as does an edit log failure.
    pub fn process(&self, db: &Database, table_name: &str, clauses: &[AlterClause]) -> Result<JobId> {
        let mut tables = db.write();
        let table = tables
            .table_by_name(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        let table_id = table.id;

        let mutation =
            SchemaMutator::apply_all(table, clauses, self.config.max_layout_length_per_row)?;
        let job = self.create_job(db.id(), table, mutation)?;

        self.edit_log.log_start_schema_change(&job)?;
        let table = tables
            .table_mut(table_id)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        job.apply_start(self.catalog.inverted_index(), table);

        let job_id = job.job_id;
        info!(job_id, db_id = db.id(), table_id, indexes = job.changes.len(),
              replicas = job.replicas.len(), "Schema change job created");
        self.jobs.add_live(JobHandle::new(job));
        Ok(job_id)
    }

    /// Builds the job for a validated mutation without changing anything.
    fn create_job(
        &self,
        db_id: DbId,
        table: &OlapTable,
        mutation: ValidatedMutation,
    ) -> Result<SchemaChangeJob> {
        if table.state == TableState::Rollup {
            return Err(Error::TableBusy(
                table.name.clone(),
                format!("Table[{}] is doing a ROLLUP job", table.name),
            ));
        }

        let now = self.clock.now_ms();
        if let Some(delayed) = self.jobs.delayed_for_table(table.id) {
            let finished_time = delayed.job.lock().finished_time_ms;
            let interval = i64::try_from(self.config.scheduler_interval_ms).unwrap_or(i64::MAX);
            let left_ms = self
                .config
                .delete_base_delay_ms()
                .saturating_add(interval)
                .saturating_sub(now - finished_time);
            return Err(Error::OldSchemaNotDeleted {
                remaining_secs: left_ms / 1000,
            });
        }

        if table.state != TableState::Normal {
            return Err(Error::TableBusy(
                table.name.clone(),
                format!("table state is {}", table.state),
            ));
        }

        let properties = &mutation.properties;
        let short_keys = short_key_overrides(table, properties)?;
        let base_schema = mutation
            .schemas
            .get(&table.base_index_id)
            .map_or(&[][..], Vec::as_slice);
        let bloom_filter = resolve_bloom_filter_change(
            analyze_bloom_filter_columns(properties, base_schema, table.keys_type)?,
            analyze_bloom_filter_fpp(properties)?,
            table.bloom_filter.as_ref(),
            self.config.default_bloom_filter_fpp,
        )?;
        let storage_type = StorageType::Column;

        let mut changes = BTreeMap::new();
        for (index_id, new_columns) in &mutation.schemas {
            let index = table
                .index_schema(*index_id)
                .ok_or_else(|| Error::Internal(format!("index {index_id} has no schema")))?;

            let need_alter = *new_columns != index.columns
                || bloom_filter_touches(table, &bloom_filter, new_columns)
                || index.storage_type != storage_type;
            if !need_alter {
                debug!(index_id, "Index not changed");
                continue;
            }

            check_key_order(new_columns, &index.name)?;
            check_compatibility(&index.columns, new_columns)?;
            check_partition_columns(table, *index_id, new_columns)?;
            check_distribution_columns(table, *index_id, new_columns)?;
            check_replica_quorum(table, *index_id)?;

            let short_key_count = schema::short_key_column_count(
                new_columns,
                short_keys.get(index_id).copied(),
                self.config.max_short_key_column_count,
                self.config.max_short_key_size_bytes,
            )?;

            if new_columns.iter().any(|c| c.nullable) && index.storage_type != StorageType::Column
            {
                return Err(Error::Validation(
                    "Only column rollup support null columns".into(),
                ));
            }

            let schema_version = index.schema_version + 1;
            let schema_hash =
                schema::schema_hash(schema_version, new_columns, bloom_filter.info.as_ref());
            debug!(index_id, schema_version, schema_hash, short_key_count, "Index change checked");
            changes.insert(
                *index_id,
                IndexChange {
                    index_id: *index_id,
                    index_name: index.name.clone(),
                    columns: new_columns.clone(),
                    schema_version,
                    schema_hash,
                    short_key_count,
                    old_schema_hash: index.schema_hash,
                },
            );
        }

        if changes.is_empty() {
            return Err(Error::NothingChanged("please check your alter stmt.".into()));
        }

        Ok(SchemaChangeJob::new(
            self.catalog.next_id(),
            db_id,
            table,
            changes,
            bloom_filter,
            storage_type,
            now,
            self.config.timeout_ms(),
        ))
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// One scheduler tick: advances every live job, then purges delayed
    /// jobs whose window has elapsed.
    pub fn run_one_cycle(&self) {
        for handle in self.jobs.live_snapshot() {
            self.advance(&handle);
        }
        self.purge_delayed();
    }

    fn advance(&self, handle: &Arc<JobHandle>) {
        let Some(db) = self.catalog.db(handle.db_id) else {
            let mut job = handle.job.lock();
            self.log_outcome(handle, self.cancel_locked(handle, &mut job, None, "database does not exist"));
            return;
        };

        let mut tables = db.write();
        let mut job = handle.job.lock();
        // a user cancel may have won the race for the locks
        if !self.jobs.is_live(handle) {
            return;
        }
        let now = self.clock.now_ms();
        let Some(table) = tables.table_mut(handle.table_id) else {
            self.log_outcome(handle, self.cancel_locked(handle, &mut job, None, "table does not exist"));
            return;
        };

        let outcome = match job.state {
            JobState::Pending => {
                if job.send_tasks(table, &self.tasks) {
                    info!(job_id = handle.job_id, "Schema change tasks sent");
                    Ok(())
                } else {
                    warn!(job_id = handle.job_id, table_id = handle.table_id,
                          "Sending schema change tasks failed, cancelling");
                    self.cancel_locked(handle, &mut job, Some(table), "failed to send tasks")
                }
            }
            JobState::Running => {
                if job.is_timeout(now) {
                    warn!(job_id = handle.job_id, "Schema change job timed out");
                    self.cancel_locked(handle, &mut job, Some(table), "timeout")
                } else {
                    match job.try_finish(table) {
                        FinishStatus::Running => Ok(()),
                        FinishStatus::Finished => self.finish_locked(handle, &mut job, table),
                        FinishStatus::Fatal(reason) => {
                            warn!(job_id = handle.job_id, %reason, "Cancelling bad schema change job");
                            self.cancel_locked(handle, &mut job, Some(table), &reason)
                        }
                    }
                }
            }
            JobState::Finished | JobState::Cancelled => unreachable!(
                "job {} is {} but still live",
                handle.job_id, job.state
            ),
        };
        self.log_outcome(handle, outcome);
    }

    fn log_outcome(&self, handle: &JobHandle, outcome: Result<()>) {
        if let Err(err) = outcome {
            error!(job_id = handle.job_id, error = %err, "Schema change transition failed, retrying next cycle");
        }
    }

    fn finish_locked(
        &self,
        handle: &Arc<JobHandle>,
        job: &mut SchemaChangeJob,
        table: &mut OlapTable,
    ) -> Result<()> {
        let mut finished = job.clone();
        finished.state = JobState::Finished;
        finished.finished_time_ms = self.clock.now_ms();
        self.edit_log.log_finish_schema_change(&finished)?;

        let supplements = finished.apply_finish(self.catalog.inverted_index(), table);
        *job = finished;
        for request in supplements {
            self.clone_checker.check_tablet_for_supplement(request);
        }
        self.jobs.move_to_delayed(handle.table_id);
        info!(job_id = handle.job_id, table_id = handle.table_id, "Schema change job finished");
        Ok(())
    }

    fn cancel_locked(
        &self,
        handle: &Arc<JobHandle>,
        job: &mut SchemaChangeJob,
        table: Option<&mut OlapTable>,
        reason: &str,
    ) -> Result<()> {
        let mut cancelled = job.clone();
        cancelled.state = JobState::Cancelled;
        cancelled.msg = reason.to_string();
        cancelled.finished_time_ms = self.clock.now_ms();
        self.edit_log.log_cancel_schema_change(&cancelled)?;

        if let Some(table) = table {
            cancelled.apply_cancel(self.catalog.inverted_index(), table);
        }
        for (backend_id, tablet_id) in cancelled.tracked_tasks() {
            self.tasks
                .remove_task(backend_id, TaskType::SchemaChange, tablet_id);
        }
        *job = cancelled;
        self.jobs.remove_live(handle.table_id);
        self.jobs.add_history(Arc::clone(handle));
        info!(job_id = handle.job_id, table_id = handle.table_id, reason, "Schema change job cancelled");
        Ok(())
    }

    fn purge_delayed(&self) {
        let now = self.clock.now_ms();
        let delay = self.config.delete_base_delay_ms();
        for handle in self.jobs.delayed_snapshot() {
            if let Some(db) = self.catalog.db(handle.db_id) {
                let tables = db.read();
                let job = handle.job.lock();
                if now - job.finished_time_ms < delay {
                    continue;
                }
                if let Some(table) = tables.table(handle.table_id) {
                    let drops = job.retired_drop_tasks(table);
                    let sent = self.tasks.submit_batch(drops);
                    for (partition_id, index_id) in job.changed_paths(table) {
                        self.catalog
                            .inverted_index()
                            .clear_retired_schema_hash(partition_id, index_id);
                    }
                    info!(job_id = handle.job_id, drop_tasks = sent, "Old schema purged");
                }
            }
            if let Some(done) = self.jobs.remove_delayed(handle.job_id) {
                self.jobs.add_history(done);
            }
        }
    }

    // ------------------------------------------------------------------
    // User cancel and status
    // ------------------------------------------------------------------

    /// Cancels the live job of a table.
    ///
    /// # Errors
    ///
    /// Fails if the table does not exist, has no live job, or the edit log
    /// rejects the record.
    pub fn cancel(&self, db: &Database, table_name: &str) -> Result<()> {
        let mut tables = db.write();
        let table_id = tables
            .table_id(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        let handle = self.jobs.live(table_id).ok_or_else(|| {
            Error::JobNotFound(format!("Table[{table_name}] is not under SCHEMA CHANGE"))
        })?;
        let mut job = handle.job.lock();
        self.cancel_locked(&handle, &mut job, tables.table_mut(table_id), "user cancelled")
    }

    /// One row per (live job, changed index) and one per delayed or
    /// historical job, sorted by job id then index name.
    #[must_use]
    pub fn job_infos(&self, db: &Database) -> Vec<AlterJobInfo> {
        let tables = db.read();
        let is_master = self.catalog.is_master();
        let mut rows = Vec::new();

        for handle in self.jobs.live_snapshot() {
            if handle.db_id != db.id() {
                continue;
            }
            let Some(table) = tables.table(handle.table_id) else {
                continue;
            };
            let job = handle.job.lock();
            for index_id in job.changes.keys() {
                let (finished, total) = job.index_progress(*index_id);
                let index_state = table
                    .partitions
                    .values()
                    .filter_map(|partition| partition.index(*index_id))
                    .map(|index| index.state)
                    .find(|state| *state != IndexState::Normal)
                    .unwrap_or(IndexState::Normal);
                let progress = if is_master
                    && matches!(job.state, JobState::Running | JobState::Finished)
                    && total > 0
                {
                    format!("{}%", finished * 100 / total)
                } else {
                    "0%".to_string()
                };
                rows.push(AlterJobInfo {
                    job_id: job.job_id,
                    table_name: table.name.clone(),
                    create_time: format_time_ms(job.create_time_ms),
                    finish_time: format_time_ms(job.finished_time_ms),
                    index_name: table.index_name(*index_id).to_string(),
                    index_state: index_state.to_string(),
                    state: job.state.to_string(),
                    msg: job.msg.clone(),
                    progress,
                });
            }
        }

        for handle in self.jobs.done_for_db(db.id()) {
            let job = handle.job.lock();
            let table_name = tables
                .table(handle.table_id)
                .map_or_else(|| job.table_name.clone(), |t| t.name.clone());
            rows.push(AlterJobInfo {
                job_id: job.job_id,
                table_name,
                create_time: format_time_ms(job.create_time_ms),
                finish_time: format_time_ms(job.finished_time_ms),
                index_name: "N/A".to_string(),
                index_state: "N/A".to_string(),
                state: job.state.to_string(),
                msg: job.msg.clone(),
                progress: "N/A".to_string(),
            });
        }

        rows.sort_by(|a, b| {
            a.job_id
                .cmp(&b.job_id)
                .then_with(|| a.index_name.cmp(&b.index_name))
        });
        rows
    }

    // ------------------------------------------------------------------
    // Backend callbacks
    // ------------------------------------------------------------------

    /// Records a finished replica rewrite.
    ///
    /// # Errors
    ///
    /// Fails if the tablet, its job or the tracked replica cannot be
    /// resolved, or the schema hash is not the one being built.
    pub fn handle_replica_finished(&self, report: &FinishedReplica) -> Result<()> {
        self.record_replica(report.backend_id, report.tablet_id, report.schema_hash, |job, replica_id| {
            job.record_replica_finished(
                replica_id,
                report.version,
                report.version_hash,
                report.row_count,
                report.data_size,
            )
        })?;
        if let Some(version) = report.report_version {
            self.catalog
                .system_info()
                .update_report_version(report.backend_id, version);
        }
        debug!(backend_id = report.backend_id, tablet_id = report.tablet_id,
               "Schema change replica finished");
        Ok(())
    }

    /// Records a failed replica rewrite.
    ///
    /// # Errors
    ///
    /// As [`handle_replica_finished`](Self::handle_replica_finished).
    pub fn handle_replica_failed(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> Result<()> {
        self.record_replica(backend_id, tablet_id, schema_hash, |job, replica_id| {
            job.record_replica_failed(replica_id)
        })?;
        warn!(backend_id, tablet_id, "Schema change replica failed");
        Ok(())
    }

    fn record_replica(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
        record: impl FnOnce(&mut SchemaChangeJob, ReplicaId) -> bool,
    ) -> Result<()> {
        let meta = self.catalog.inverted_index().tablet_meta(tablet_id).ok_or_else(|| {
            Error::Precondition(format!("tablet[{tablet_id}] does not exist"))
        })?;
        let db = self
            .catalog
            .db(meta.db_id)
            .ok_or_else(|| Error::DatabaseNotFound(meta.db_id.to_string()))?;

        let _tables = db.write();
        let handle = self.jobs.live(meta.table_id).ok_or_else(|| {
            Error::JobNotFound(format!("table[{}] is not under SCHEMA CHANGE", meta.table_id))
        })?;
        let mut job = handle.job.lock();
        let expected = job
            .changes
            .get(&meta.index_id)
            .map(|change| change.schema_hash);
        if expected != Some(schema_hash) {
            return Err(Error::Precondition(format!(
                "tablet[{tablet_id}] reported schema hash {schema_hash}, expected {expected:?}"
            )));
        }
        let replica_id = job.replica_for(tablet_id, backend_id).ok_or_else(|| {
            Error::Precondition(format!(
                "tablet[{tablet_id}] has no tracked replica on backend[{backend_id}]"
            ))
        })?;
        record(&mut job, replica_id);
        drop(job);
        self.tasks
            .remove_task(backend_id, TaskType::SchemaChange, tablet_id);
        Ok(())
    }

    /// Stops tracking a replica that reconciliation removed. The caller
    /// holds the database write lock.
    pub fn remove_replica_related_task(
        &self,
        table_id: TableId,
        tablet_id: TabletId,
        replica_id: ReplicaId,
        backend_id: BackendId,
    ) {
        let Some(handle) = self.jobs.live(table_id) else {
            return;
        };
        if handle
            .job
            .lock()
            .remove_replica(tablet_id, replica_id, backend_id)
        {
            self.tasks
                .remove_task(backend_id, TaskType::SchemaChange, tablet_id);
            debug!(job_id = handle.job_id, tablet_id, replica_id, "Replica dropped from job");
        }
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Reapplies a logged job start.
    pub fn replay_start(&self, job: SchemaChangeJob) {
        self.catalog.ensure_next_id_above(job.job_id);
        if let Some(db) = self.catalog.db(job.db_id) {
            if let Some(table) = db.write().table_mut(job.table_id) {
                job.apply_start(self.catalog.inverted_index(), table);
            }
        }
        self.jobs.add_live(JobHandle::new(job));
    }

    /// Reapplies a logged job finish.
    pub fn replay_finish(&self, job: SchemaChangeJob) {
        if let Some(db) = self.catalog.db(job.db_id) {
            if let Some(table) = db.write().table_mut(job.table_id) {
                job.apply_finish(self.catalog.inverted_index(), table);
            }
        }
        self.jobs.remove_live(job.table_id);
        self.jobs.add_delayed(JobHandle::new(job));
    }

    /// Reapplies a logged job cancellation.
    pub fn replay_cancel(&self, job: SchemaChangeJob) {
        if let Some(db) = self.catalog.db(job.db_id) {
            if let Some(table) = db.write().table_mut(job.table_id) {
                job.apply_cancel(self.catalog.inverted_index(), table);
            }
        }
        self.jobs.remove_live(job.table_id);
        self.jobs.add_history(JobHandle::new(job));
    }
}

impl AlterHandler for SchemaChangeHandler {
    fn kind(&self) -> AlterKind {
        AlterKind::SchemaChange
    }

    fn process(&self, db: &Database, table_name: &str, clauses: &[AlterClause]) -> Result<JobId> {
        Self::process(self, db, table_name, clauses)
    }

    fn run_one_cycle(&self) {
        Self::run_one_cycle(self);
    }

    fn cancel(&self, db: &Database, table_name: &str) -> Result<()> {
        Self::cancel(self, db, table_name)
    }

    fn job_infos(&self, db: &Database) -> Vec<AlterJobInfo> {
        Self::job_infos(self, db)
    }

    fn remove_replica_related_task(
        &self,
        table_id: TableId,
        tablet_id: TabletId,
        replica_id: ReplicaId,
        backend_id: BackendId,
    ) {
        Self::remove_replica_related_task(self, table_id, tablet_id, replica_id, backend_id);
    }

    fn interval(&self) -> Duration {
        self.config.scheduler_interval()
    }
}

/// True if the bloom filter change adds, removes or re-tunes a column of
/// this index.
#[allow(clippy::float_cmp)]
fn bloom_filter_touches(table: &OlapTable, change: &BloomFilterChange, columns: &[Column]) -> bool {
    if !change.has_change {
        return false;
    }
    let original = table.bloom_filter.as_ref();
    let new_fpp = change.info.as_ref().map(|bf| bf.fpp);
    columns.iter().any(|column| {
        let was = original.is_some_and(|bf| bf.columns.contains(&column.name));
        let is = change.contains(&column.name);
        was != is || (was && is && original.map(|bf| bf.fpp) != new_fpp)
    })
}

fn check_compatibility(old_columns: &[Column], new_columns: &[Column]) -> Result<()> {
    for new in new_columns {
        if let Some(old) = old_columns.iter().find(|c| c.name_is(&new.name)) {
            if old != new {
                old.check_schema_change_allowed(new)
                    .map_err(Error::Validation)?;
            }
        }
    }
    Ok(())
}

fn check_partition_columns(table: &OlapTable, index_id: IndexId, columns: &[Column]) -> Result<()> {
    let index_name = table.index_name(index_id);
    for partition_column in &table.partition_columns {
        match columns.iter().find(|c| c.name_is(&partition_column.name)) {
            Some(column) if column != partition_column => {
                return Err(Error::Validation(format!(
                    "Can not modify partition column[{}]. index[{index_name}]",
                    partition_column.name
                )));
            }
            None if index_id == table.base_index_id => {
                return Err(Error::Validation(format!(
                    "Partition column[{}] cannot be dropped. index[{index_name}]",
                    partition_column.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_distribution_columns(
    table: &OlapTable,
    index_id: IndexId,
    columns: &[Column],
) -> Result<()> {
    let DistributionInfo::Hash {
        columns: distribution_columns,
        ..
    } = &table.default_distribution
    else {
        return Ok(());
    };
    let index_name = table.index_name(index_id);
    for distribution_column in distribution_columns {
        match columns.iter().find(|c| c.name_is(&distribution_column.name)) {
            Some(column) if column != distribution_column => {
                return Err(Error::Validation(format!(
                    "Cannot modify distribution column[{}]. index[{index_name}]",
                    distribution_column.name
                )));
            }
            None if index_id == table.base_index_id => {
                return Err(Error::Validation(format!(
                    "Distribution column[{}] cannot be dropped. index[{index_name}]",
                    distribution_column.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_replica_quorum(table: &OlapTable, index_id: IndexId) -> Result<()> {
    for partition in table.partitions.values() {
        let Some(index) = partition.index(index_id) else {
            continue;
        };
        for tablet in index.tablets.values() {
            let replica_num = tablet
                .replicas
                .iter()
                .filter(|r| r.state != ReplicaState::Clone)
                .count();
            if replica_num < partition.quorum() {
                let msg = format!(
                    "Tablet[{}] does not have enough replicas. [{replica_num}/{}]",
                    tablet.id, partition.replication_num
                );
                warn!(tablet_id = tablet.id, "{msg}");
                return Err(Error::Precondition(msg));
            }
        }
    }
    Ok(())
}
