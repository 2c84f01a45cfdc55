//! Alter subsystem: statement validation, schema change jobs and their
//! scheduler.
//!
//! A statement flows through [`SchemaMutator`] (pure validation against a
//! working copy of every index schema), then [`SchemaChangeHandler`] builds
//! a [`SchemaChangeJob`], logs it and marks the catalog. The scheduler tick
//! ([`AlterHandler::run_one_cycle`]) sends rewrite tasks, evaluates quorum
//! and finishes or cancels the job; finished jobs linger in a delayed pool
//! until their old schema is dropped from the backends.

mod clause;
mod job;
mod properties;
#[cfg(test)]
mod properties_tests;
mod registry;
mod schema_change;
mod validator;

pub use clause::{AlterClause, AlterOp, ColumnPosition};
pub use job::{FinishStatus, IndexChange, JobState, ReplicaProgress, ReplicaTask, SchemaChangeJob};
pub use properties::{
    analyze_bloom_filter_columns, analyze_bloom_filter_fpp, resolve_bloom_filter_change,
    short_key_overrides, BloomFilterChange, MAX_FPP, MIN_FPP,
};
pub use registry::{AlterJobRegistry, JobHandle};
pub use schema_change::{FinishedReplica, SchemaChangeHandler};
pub use validator::{resolve_key_attributes, SchemaMutator, ValidatedMutation};

use chrono::{Local, TimeZone};
use indexmap::IndexMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Database;
use crate::error::Result;
use crate::types::{BackendId, JobId, ReplicaId, TableId, TabletId};

/// Kinds of alter work a handler can own.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlterKind {
    /// Column add, drop, modify, reorder and property changes.
    SchemaChange,
}

/// A family of alter jobs driven by the master's scheduler.
pub trait AlterHandler: Send + Sync + Debug {
    /// Kind of job this handler owns.
    fn kind(&self) -> AlterKind;

    /// Validates an alter statement and starts a job for it.
    fn process(&self, db: &Database, table_name: &str, clauses: &[AlterClause]) -> Result<JobId>;

    /// Advances every live job by one step.
    fn run_one_cycle(&self);

    /// Cancels the live job of a table.
    fn cancel(&self, db: &Database, table_name: &str) -> Result<()>;

    /// Status rows for `SHOW ALTER`.
    fn job_infos(&self, db: &Database) -> Vec<AlterJobInfo>;

    /// Forgets a replica that was removed from the catalog.
    fn remove_replica_related_task(
        &self,
        table_id: TableId,
        tablet_id: TabletId,
        replica_id: ReplicaId,
        backend_id: BackendId,
    );

    /// Scheduler tick interval.
    fn interval(&self) -> Duration;
}

/// Alter handlers keyed by kind, in registration order.
#[derive(Debug, Default)]
pub struct AlterHandlers {
    handlers: IndexMap<AlterKind, Arc<dyn AlterHandler>>,
}

impl AlterHandlers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one of the same kind.
    pub fn register(&mut self, handler: Arc<dyn AlterHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Handler of a kind.
    #[must_use]
    pub fn get(&self, kind: AlterKind) -> Option<&Arc<dyn AlterHandler>> {
        self.handlers.get(&kind)
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AlterHandler>> {
        self.handlers.values()
    }

    /// Forwards a replica removal to every handler.
    pub fn remove_replica_related_task(
        &self,
        table_id: TableId,
        tablet_id: TabletId,
        replica_id: ReplicaId,
        backend_id: BackendId,
    ) {
        for handler in self.handlers.values() {
            handler.remove_replica_related_task(table_id, tablet_id, replica_id, backend_id);
        }
    }
}

/// One row of `SHOW ALTER TABLE COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterJobInfo {
    /// Job id.
    pub job_id: JobId,
    /// Table name.
    pub table_name: String,
    /// Creation time, local.
    pub create_time: String,
    /// Finish time, local, or `N/A`.
    pub finish_time: String,
    /// Changed index, or `N/A` for done jobs.
    pub index_name: String,
    /// Index state, or `N/A` for done jobs.
    pub index_state: String,
    /// Job state.
    pub state: String,
    /// Cancel reason.
    pub msg: String,
    /// Finished percentage, or `N/A` for done jobs.
    pub progress: String,
}

/// Formats epoch milliseconds as local `YYYY-MM-DD HH:MM:SS`; unset times
/// render as `N/A`.
#[must_use]
pub fn format_time_ms(ms: i64) -> String {
    if ms <= 0 {
        return "N/A".to_string();
    }
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| "N/A".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}
