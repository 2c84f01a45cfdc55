//! Backend membership, liveness and report versions.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::BackendId;

/// Usage of one data directory on a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Mount path.
    pub path: String,
    /// Capacity in bytes.
    pub total_bytes: u64,
    /// Bytes used by tablets.
    pub used_bytes: u64,
    /// Bytes still free.
    pub available_bytes: u64,
}

/// A storage node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    /// Backend id.
    pub id: BackendId,
    /// Host name or address.
    pub host: String,
    /// Storage service port.
    pub port: u16,
    /// Heartbeat status.
    pub alive: bool,
    /// Being drained of replicas.
    pub decommissioned: bool,
    /// Disks keyed by path.
    pub disks: BTreeMap<String, DiskInfo>,
    /// Highest report version acknowledged through task completions.
    #[serde(skip)]
    pub report_version: i64,
    /// Report version of the last tablet report applied.
    #[serde(skip, default = "no_report")]
    pub last_tablet_report_version: i64,
}

const fn no_report() -> i64 {
    -1
}

impl Backend {
    /// A live backend with no disks and no report seen yet.
    #[must_use]
    pub fn new(id: BackendId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            alive: true,
            decommissioned: false,
            disks: BTreeMap::new(),
            report_version: 0,
            last_tablet_report_version: no_report(),
        }
    }

    /// Alive and not decommissioned.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.alive && !self.decommissioned
    }
}

/// Registry of backends. A leaf lock: never held while acquiring another.
#[derive(Debug, Default)]
pub struct SystemInfo {
    backends: RwLock<FxHashMap<BackendId, Backend>>,
}

impl SystemInfo {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a backend.
    pub fn add_backend(&self, backend: Backend) {
        self.backends.write().insert(backend.id, backend);
    }

    /// Snapshot of one backend.
    #[must_use]
    pub fn backend(&self, backend_id: BackendId) -> Option<Backend> {
        self.backends.read().get(&backend_id).cloned()
    }

    /// Resolves a backend by its address.
    #[must_use]
    pub fn backend_id_by_addr(&self, host: &str, port: u16) -> Option<BackendId> {
        self.backends
            .read()
            .values()
            .find(|b| b.host == host && b.port == port)
            .map(|b| b.id)
    }

    /// Ids of all backends, sorted.
    #[must_use]
    pub fn backend_ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<_> = self.backends.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of available backends, sorted.
    #[must_use]
    pub fn available_backend_ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<_> = self
            .backends
            .read()
            .values()
            .filter(|b| b.is_available())
            .map(|b| b.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// True if the backend exists, is alive and is not decommissioned.
    #[must_use]
    pub fn is_available(&self, backend_id: BackendId) -> bool {
        self.backends
            .read()
            .get(&backend_id)
            .is_some_and(Backend::is_available)
    }

    /// Updates heartbeat status. Returns false for an unknown backend.
    pub fn set_alive(&self, backend_id: BackendId, alive: bool) -> bool {
        self.update(backend_id, |b| b.alive = alive)
    }

    /// Marks a backend as decommissioned. Returns false for an unknown backend.
    pub fn decommission(&self, backend_id: BackendId) -> bool {
        self.update(backend_id, |b| b.decommissioned = true)
    }

    /// Replaces the disk map from a disk report.
    pub fn update_disks(&self, backend_id: BackendId, disks: BTreeMap<String, DiskInfo>) -> bool {
        self.update(backend_id, |b| b.disks = disks)
    }

    /// Acknowledged report version, or -1 for an unknown backend.
    #[must_use]
    pub fn report_version(&self, backend_id: BackendId) -> i64 {
        self.backends
            .read()
            .get(&backend_id)
            .map_or(-1, |b| b.report_version)
    }

    /// Raises the acknowledged report version. Never lowers it.
    pub fn update_report_version(&self, backend_id: BackendId, version: i64) {
        self.update(backend_id, |b| {
            if version > b.report_version {
                b.report_version = version;
            }
        });
    }

    /// Report version of the last applied tablet report.
    #[must_use]
    pub fn last_tablet_report_version(&self, backend_id: BackendId) -> i64 {
        self.backends
            .read()
            .get(&backend_id)
            .map_or(-1, |b| b.last_tablet_report_version)
    }

    /// Records that a tablet report has been applied.
    pub fn set_last_tablet_report_version(&self, backend_id: BackendId, version: i64) {
        self.update(backend_id, |b| {
            if version > b.last_tablet_report_version {
                b.last_tablet_report_version = version;
            }
        });
    }

    /// True when a tablet report with `version` must be ignored.
    #[must_use]
    pub fn is_stale_tablet_report(&self, backend_id: BackendId, version: i64) -> bool {
        self.backends.read().get(&backend_id).map_or(true, |b| {
            version < b.report_version || version <= b.last_tablet_report_version
        })
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    /// True when no backend is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }

    fn update(&self, backend_id: BackendId, f: impl FnOnce(&mut Backend)) -> bool {
        match self.backends.write().get_mut(&backend_id) {
            Some(backend) => {
                f(backend);
                true
            }
            None => false,
        }
    }
}
