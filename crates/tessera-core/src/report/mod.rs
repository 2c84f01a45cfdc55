//! Backend report ingestion.
//!
//! RPC handlers enqueue reports into a bounded queue; a single consumer
//! drains it and applies each report in order. A full queue pushes back on
//! the producer after `enqueue_timeout_ms`, and the backend retries on its
//! own schedule.


use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{Catalog, DiskInfo, ReportedTablet};
use crate::config::ReportConfig;
use crate::daemon::{self, DaemonHandle};
use crate::reconcile::{ReconcileSummary, TabletReconciler};
use crate::task::{AgentTaskQueue, TaskType};
use crate::types::{BackendId, TabletId};

/// Report ingestion failures, returned to the reporting backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// The reporting backend is not registered.
    #[error("backend[{0}] does not exist")]
    UnknownBackend(BackendId),

    /// The queue stayed full for the whole enqueue timeout.
    #[error("report queue is full")]
    QueueFull,

    /// The consumer has stopped.
    #[error("report handler is shut down")]
    Shutdown,
}

/// One report from one backend. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    /// Reporting backend.
    pub backend_id: BackendId,
    /// Signatures of tasks still running, by task type.
    pub tasks: Option<BTreeMap<TaskType, BTreeSet<u64>>>,
    /// Disk usage keyed by path.
    pub disks: Option<BTreeMap<String, DiskInfo>>,
    /// Full tablet inventory.
    pub tablets: Option<BTreeMap<TabletId, ReportedTablet>>,
    /// Monotonic report counter of the backend.
    pub report_version: i64,
}

/// What applying one report did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Outstanding tasks put back into the outbox.
    pub resent_tasks: usize,
    /// The disk map was replaced.
    pub disks_updated: bool,
    /// Result of the tablet section, if present.
    pub tablets: Option<ReconcileSummary>,
}

/// Bounded report queue plus the logic that applies a report.
#[derive(Debug)]
pub struct ReportHandler {
    catalog: Arc<Catalog>,
    tasks: Arc<AgentTaskQueue>,
    reconciler: Arc<TabletReconciler>,
    sender: Sender<ReportRequest>,
    receiver: Receiver<ReportRequest>,
    enqueue_timeout: Duration,
}

impl ReportHandler {
    /// Creates a handler with an empty queue of `config.queue_capacity`.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        tasks: Arc<AgentTaskQueue>,
        reconciler: Arc<TabletReconciler>,
        config: &ReportConfig,
    ) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);
        Self {
            catalog,
            tasks,
            reconciler,
            sender,
            receiver,
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
        }
    }

    /// Queues a report for the consumer.
    ///
    /// # Errors
    ///
    /// [`ReportError::UnknownBackend`] for an unregistered sender,
    /// [`ReportError::QueueFull`] when the queue stays full for the enqueue
    /// timeout.
    pub fn handle_report(&self, request: ReportRequest) -> Result<(), ReportError> {
        let backend_id = request.backend_id;
        if self.catalog.system_info().backend(backend_id).is_none() {
            warn!(backend_id, "Report from unknown backend rejected");
            return Err(ReportError::UnknownBackend(backend_id));
        }
        match self.sender.send_timeout(request, self.enqueue_timeout) {
            Ok(()) => {
                debug!(backend_id, queued = self.sender.len(), "Report queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(backend_id, capacity = ?self.sender.capacity(), "Report queue full");
                Err(ReportError::QueueFull)
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(ReportError::Shutdown),
        }
    }

    /// Reports waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.receiver.len()
    }

    /// Applies every queued report on the calling thread.
    pub fn process_pending(&self) -> Vec<ReportOutcome> {
        self.receiver
            .try_iter()
            .map(|request| self.process(&request))
            .collect()
    }

    /// Applies one report: task resends, disk map, then tablet inventory.
    pub fn process(&self, request: &ReportRequest) -> ReportOutcome {
        let backend_id = request.backend_id;
        let mut outcome = ReportOutcome::default();

        if let Some(running) = &request.tasks {
            let missing = self.tasks.diff_tasks(backend_id, running);
            outcome.resent_tasks = missing.len();
            self.tasks.resend(missing);
        }
        if let Some(disks) = &request.disks {
            outcome.disks_updated = self
                .catalog
                .system_info()
                .update_disks(backend_id, disks.clone());
        }
        if let Some(tablets) = &request.tablets {
            outcome.tablets =
                Some(self.reconciler.reconcile(backend_id, tablets, request.report_version));
        }

        debug!(
            backend_id,
            report_version = request.report_version,
            resent = outcome.resent_tasks,
            "Report processed"
        );
        outcome
    }

    /// Starts the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread cannot be spawned.
    pub fn start(self: &Arc<Self>) -> std::io::Result<DaemonHandle> {
        let handler = Arc::clone(self);
        daemon::spawn("tessera-report", move |shutdown| loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(handler.receiver) -> request => match request {
                    Ok(request) => {
                        handler.process(&request);
                    }
                    Err(_) => break,
                },
            }
        })
    }
}
