//! The master service: one value owning the catalog, the edit log, the
//! alter handlers and the report pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_core::{Master, RequestContext, TesseraConfig};
//!
//! let master = Master::open(TesseraConfig::load()?)?;
//! let ctx = RequestContext::new("root", "default_cluster");
//! master.create_database(&ctx, "sales")?;
//! let daemons = master.start()?;
//! ```

use std::sync::Arc;
use tracing::{debug, info};

use crate::alter::{
    AlterClause, AlterHandler, AlterHandlers, AlterJobInfo, AlterKind, FinishedReplica,
    SchemaChangeHandler,
};
use crate::catalog::{Catalog, TableDef};
use crate::clock::{Clock, SystemClock};
use crate::config::TesseraConfig;
use crate::daemon::{self, DaemonHandle};
use crate::error::{Error, Result};
use crate::persist::{EditLog, EditLogEntry, FileEditLog};
use crate::reconcile::TabletReconciler;
use crate::report::{ReportError, ReportHandler, ReportOutcome, ReportRequest};
use crate::task::{AgentTask, AgentTaskQueue, CloneChecker, SupplementRequest, TaskType};
use crate::types::{BackendId, DbId, JobId, SchemaHash, TableId, TabletId};

/// Identity of the caller of a DDL operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Authenticated user.
    pub user: String,
    /// Cluster the session is bound to.
    pub cluster: String,
}

impl RequestContext {
    /// Creates a context.
    #[must_use]
    pub fn new(user: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            cluster: cluster.into(),
        }
    }
}

/// Background threads of a running master. Dropping stops them.
#[derive(Debug)]
pub struct MasterDaemons {
    daemons: Vec<DaemonHandle>,
}

impl MasterDaemons {
    /// Names of the running daemons.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.daemons.iter().map(DaemonHandle::name).collect()
    }

    /// Stops every daemon, report consumer last.
    pub fn stop(&mut self) {
        for daemon in &mut self.daemons {
            daemon.stop();
        }
    }
}

/// The elected master.
#[derive(Debug)]
pub struct Master {
    config: TesseraConfig,
    catalog: Arc<Catalog>,
    edit_log: Arc<dyn EditLog>,
    tasks: Arc<AgentTaskQueue>,
    clone_checker: Arc<CloneChecker>,
    schema_change: Arc<SchemaChangeHandler>,
    alter: Arc<AlterHandlers>,
    reports: Arc<ReportHandler>,
}

impl Master {
    /// Opens the file edit log under `storage.meta_dir` and replays it.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or an unreadable edit log.
    pub fn open(config: TesseraConfig) -> Result<Self> {
        config.validate()?;
        let edit_log = FileEditLog::open(&config.storage.meta_dir, config.storage.edit_log_sync)?;
        info!(path = %edit_log.path().display(), "Edit log opened");
        Self::with_edit_log(config, Arc::new(edit_log), Arc::new(SystemClock))
    }

    /// Builds a master over an existing edit log and replays it.
    ///
    /// # Errors
    ///
    /// Fails if the edit log cannot be read.
    pub fn with_edit_log(
        config: TesseraConfig,
        edit_log: Arc<dyn EditLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let tasks = Arc::new(AgentTaskQueue::new());
        let clone_checker = Arc::new(CloneChecker::new());
        let schema_change = Arc::new(SchemaChangeHandler::new(
            Arc::clone(&catalog),
            Arc::clone(&edit_log),
            Arc::clone(&tasks),
            Arc::clone(&clone_checker),
            clock,
            config.alter.clone(),
        ));

        let mut alter = AlterHandlers::new();
        alter.register(Arc::clone(&schema_change) as Arc<dyn AlterHandler>);
        let alter = Arc::new(alter);

        let reconciler = Arc::new(TabletReconciler::new(
            Arc::clone(&catalog),
            Arc::clone(&edit_log),
            Arc::clone(&tasks),
            Arc::clone(&clone_checker),
            Arc::clone(&alter),
        ));
        let reports = Arc::new(ReportHandler::new(
            Arc::clone(&catalog),
            Arc::clone(&tasks),
            reconciler,
            &config.report,
        ));

        let master = Self {
            config,
            catalog,
            edit_log,
            tasks,
            clone_checker,
            schema_change,
            alter,
            reports,
        };
        master.replay()?;
        Ok(master)
    }

    fn replay(&self) -> Result<()> {
        let entries = self.edit_log.replay()?;
        let count = entries.len();
        for entry in entries {
            debug!(kind = entry.kind(), "Replaying edit");
            match entry {
                EditLogEntry::CreateDatabase { db_id, name } => {
                    self.catalog.replay_create_database(db_id, &name);
                }
                EditLogEntry::CreateTable { db_id, table } => {
                    self.catalog.replay_create_table(db_id, table);
                }
                EditLogEntry::AddBackend(backend) => self.catalog.replay_add_backend(backend),
                EditLogEntry::StartSchemaChange(job) => self.schema_change.replay_start(job),
                EditLogEntry::FinishSchemaChange(job) => self.schema_change.replay_finish(job),
                EditLogEntry::CancelSchemaChange(job) => self.schema_change.replay_cancel(job),
                EditLogEntry::AddReplica(info) => self.catalog.replay_add_replica(&info),
                EditLogEntry::DeleteReplica(info) => self.catalog.replay_delete_replica(&info),
            }
        }
        info!(entries = count, databases = self.catalog.db_ids().len(), "Edit log replayed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    /// The catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Outbound task queue.
    #[must_use]
    pub fn tasks(&self) -> &Arc<AgentTaskQueue> {
        &self.tasks
    }

    /// Schema change handler.
    #[must_use]
    pub fn schema_change(&self) -> &Arc<SchemaChangeHandler> {
        &self.schema_change
    }

    /// Report handler.
    #[must_use]
    pub fn reports(&self) -> &Arc<ReportHandler> {
        &self.reports
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    /// Creates a database.
    ///
    /// # Errors
    ///
    /// Fails on a taken name or an edit log failure.
    pub fn create_database(&self, ctx: &RequestContext, name: &str) -> Result<DbId> {
        let db_id = self.catalog.create_database(name, &*self.edit_log)?;
        info!(user = %ctx.user, cluster = %ctx.cluster, db_id, name, "CREATE DATABASE");
        Ok(db_id)
    }

    /// Creates a table with its tablets placed on available backends.
    ///
    /// # Errors
    ///
    /// See [`Catalog::create_table`].
    pub fn create_table(&self, ctx: &RequestContext, db_name: &str, def: &TableDef) -> Result<TableId> {
        let table_id = self
            .catalog
            .create_table(db_name, def, &self.config.alter, &*self.edit_log)?;
        info!(
            user = %ctx.user,
            cluster = %ctx.cluster,
            table_id,
            db = db_name,
            table = %def.name,
            "CREATE TABLE"
        );
        Ok(table_id)
    }

    /// Registers a backend.
    ///
    /// # Errors
    ///
    /// Fails on an edit log failure.
    pub fn add_backend(&self, host: &str, port: u16) -> Result<BackendId> {
        self.catalog.add_backend(host, port, &*self.edit_log)
    }

    /// Runs an `ALTER TABLE` statement and returns the started job.
    ///
    /// # Errors
    ///
    /// Unknown database or table, validation and precondition failures, a
    /// busy table, or an edit log failure. Nothing is changed on error.
    pub fn alter_table(
        &self,
        ctx: &RequestContext,
        db_name: &str,
        table_name: &str,
        clauses: &[AlterClause],
    ) -> Result<JobId> {
        let db = self
            .catalog
            .db_by_name(db_name)
            .ok_or_else(|| Error::DatabaseNotFound(db_name.to_string()))?;
        let job_id = self
            .handler(AlterKind::SchemaChange)?
            .process(&db, table_name, clauses)?;
        info!(
            user = %ctx.user,
            cluster = %ctx.cluster,
            job_id,
            db = db_name,
            table = table_name,
            clauses = clauses.len(),
            "ALTER TABLE"
        );
        Ok(job_id)
    }

    /// Cancels the running schema change of a table.
    ///
    /// # Errors
    ///
    /// Unknown database or table, no live job, or an edit log failure.
    pub fn cancel_alter_table(&self, ctx: &RequestContext, db_name: &str, table_name: &str) -> Result<()> {
        let db = self
            .catalog
            .db_by_name(db_name)
            .ok_or_else(|| Error::DatabaseNotFound(db_name.to_string()))?;
        self.handler(AlterKind::SchemaChange)?.cancel(&db, table_name)?;
        info!(
            user = %ctx.user,
            cluster = %ctx.cluster,
            db = db_name,
            table = table_name,
            "CANCEL ALTER TABLE"
        );
        Ok(())
    }

    /// Status rows of every alter job in a database.
    ///
    /// # Errors
    ///
    /// Fails on an unknown database.
    pub fn show_alter_jobs(&self, db_name: &str) -> Result<Vec<AlterJobInfo>> {
        let db = self
            .catalog
            .db_by_name(db_name)
            .ok_or_else(|| Error::DatabaseNotFound(db_name.to_string()))?;
        Ok(self
            .alter
            .iter()
            .flat_map(|handler| handler.job_infos(&db))
            .collect())
    }

    fn handler(&self, kind: AlterKind) -> Result<&Arc<dyn AlterHandler>> {
        self.alter
            .get(kind)
            .ok_or_else(|| Error::Internal(format!("no alter handler for {kind:?}")))
    }

    // ------------------------------------------------------------------
    // Backend callbacks
    // ------------------------------------------------------------------

    /// Queues a backend report for the consumer thread.
    ///
    /// # Errors
    ///
    /// See [`ReportHandler::handle_report`].
    pub fn handle_report(&self, request: ReportRequest) -> std::result::Result<(), ReportError> {
        self.reports.handle_report(request)
    }

    /// Applies queued reports on the calling thread.
    pub fn process_pending_reports(&self) -> Vec<ReportOutcome> {
        self.reports.process_pending()
    }

    /// A backend finished rewriting a replica.
    ///
    /// # Errors
    ///
    /// See [`SchemaChangeHandler::handle_replica_finished`].
    pub fn finish_schema_change_task(&self, report: &FinishedReplica) -> Result<()> {
        self.schema_change.handle_replica_finished(report)
    }

    /// A backend failed to rewrite a replica.
    ///
    /// # Errors
    ///
    /// See [`SchemaChangeHandler::handle_replica_failed`].
    pub fn fail_schema_change_task(
        &self,
        backend_id: BackendId,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> Result<()> {
        self.schema_change
            .handle_replica_failed(backend_id, tablet_id, schema_hash)
    }

    /// A backend finished moving a replica to another storage medium.
    ///
    /// Returns false if no such migration was outstanding.
    pub fn finish_storage_medium_migrate_task(&self, backend_id: BackendId, tablet_id: TabletId) -> bool {
        let finished = self
            .tasks
            .remove_task(backend_id, TaskType::StorageMediumMigrate, tablet_id)
            .is_some();
        if finished {
            info!(backend_id, tablet_id, "Storage medium migration finished");
        } else {
            debug!(backend_id, tablet_id, "Unknown storage medium migration finished");
        }
        finished
    }

    /// Drains the tasks ready for a backend.
    #[must_use]
    pub fn take_dispatched(&self, backend_id: BackendId) -> Vec<AgentTask> {
        self.tasks.take_dispatched(backend_id)
    }

    /// Drains the clone supplement requests.
    #[must_use]
    pub fn take_supplements(&self) -> Vec<SupplementRequest> {
        self.clone_checker.take_pending()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Advances every alter handler by one tick on the calling thread.
    pub fn run_alter_cycle(&self) {
        for handler in self.alter.iter() {
            handler.run_one_cycle();
        }
    }

    /// Starts one scheduler daemon per alter handler and the report consumer.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a thread cannot be spawned. Daemons already
    /// started are stopped.
    pub fn start(&self) -> Result<MasterDaemons> {
        let mut daemons = Vec::new();
        for handler in self.alter.iter() {
            let name = format!("tessera-alter-{:?}", handler.kind()).to_lowercase();
            let cycle = Arc::clone(handler);
            daemons.push(daemon::spawn_periodic(&name, handler.interval(), move || {
                cycle.run_one_cycle();
            })?);
        }
        daemons.push(self.reports.start()?);
        Ok(MasterDaemons { daemons })
    }
}
