use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::info;

use crate::types::{DbId, IndexId, PartitionId, TableId, TabletId};

/// A tablet that has fallen below its replication factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupplementRequest {
    /// Owning database.
    pub db_id: DbId,
    /// Owning table.
    pub table_id: TableId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Owning index.
    pub index_id: IndexId,
    /// Under-replicated tablet.
    pub tablet_id: TabletId,
}

/// Deduplicated queue of clone supplement requests, drained by the clone scheduler.
#[derive(Debug, Default)]
pub struct CloneChecker {
    pending: Mutex<IndexSet<SupplementRequest>>,
}

impl CloneChecker {
    /// Creates an empty checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a new replica of a tablet. Returns false if already requested.
    pub fn check_tablet_for_supplement(&self, request: SupplementRequest) -> bool {
        let added = self.pending.lock().insert(request);
        if added {
            info!(db_id = request.db_id, table_id = request.table_id,
                  tablet_id = request.tablet_id, "Tablet queued for clone supplement");
        }
        added
    }

    /// Drains every pending request in arrival order.
    pub fn take_pending(&self) -> Vec<SupplementRequest> {
        self.pending.lock().drain(..).collect()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
