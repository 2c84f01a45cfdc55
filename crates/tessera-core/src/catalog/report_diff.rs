//! Three-way diff between a backend's tablet inventory and the catalog.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{Catalog, TabletMeta};
use crate::types::{
    BackendId, DbId, SchemaHash, StorageMedium, TabletId, Version, VersionHash,
};

/// One schema version of a tablet as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedTabletInfo {
    /// Schema hash the on-disk data conforms to.
    pub schema_hash: SchemaHash,
    /// Data version.
    pub version: Version,
    /// Hash of `version`.
    pub version_hash: VersionHash,
    /// Row count.
    pub row_count: i64,
    /// Bytes on disk.
    pub data_size: i64,
    /// Medium the tablet currently sits on.
    pub storage_medium: Option<StorageMedium>,
}

/// Every schema version a backend holds for one tablet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedTablet {
    /// Reported schema versions.
    pub infos: Vec<ReportedTabletInfo>,
}

/// Result of [`Catalog::diff_tablet_report`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TabletReportDiff {
    /// Tablets whose catalog replica lags the report, grouped by database.
    pub sync: IndexMap<DbId, Vec<TabletId>>,
    /// Tablets the catalog places on the backend but the report omits, grouped by database.
    pub delete_from_meta: IndexMap<DbId, Vec<TabletId>>,
    /// Tablets on the backend with at least one recognised schema hash.
    pub found_valid: BTreeSet<TabletId>,
    /// Unrecognised schema hashes of tablets the catalog places on the backend.
    pub found_invalid: BTreeMap<TabletId, Vec<SchemaHash>>,
    /// Tablets sitting on the wrong storage medium, with the configured medium.
    pub migration: Vec<(TabletId, StorageMedium)>,
    /// Reported tablets the catalog does not place on this backend.
    pub unknown: Vec<TabletId>,
}

impl Catalog {
    /// Compares a backend's full tablet inventory with the catalog.
    ///
    /// Placement is snapshotted from the inverted index first; replica
    /// versions are then read under one database read lock per database.
    #[must_use]
    pub fn diff_tablet_report(
        &self,
        backend_id: BackendId,
        reported: &BTreeMap<TabletId, ReportedTablet>,
    ) -> TabletReportDiff {
        let mut by_db: IndexMap<DbId, Vec<(TabletId, TabletMeta)>> = IndexMap::new();
        for (tablet_id, meta) in self.inverted_index.tablets_on_backend(backend_id) {
            by_db.entry(meta.db_id).or_default().push((tablet_id, meta));
        }

        let mut diff = TabletReportDiff::default();
        let mut seen = BTreeSet::new();

        for (db_id, tablets) in by_db {
            let Some(db) = self.db(db_id) else {
                continue;
            };
            let guard = db.read();
            for (tablet_id, meta) in tablets {
                let Some(replica) = guard
                    .table(meta.table_id)
                    .and_then(|t| t.tablet(meta.partition_id, meta.index_id, tablet_id))
                    .and_then(|t| t.replica_by_backend(backend_id))
                else {
                    continue;
                };
                seen.insert(tablet_id);

                let Some(report) = reported.get(&tablet_id) else {
                    diff.delete_from_meta.entry(db_id).or_default().push(tablet_id);
                    continue;
                };

                let mut needs_sync = false;
                let mut migrate_to = None;
                for info in &report.infos {
                    if !meta.contains_schema_hash(info.schema_hash) {
                        diff.found_invalid
                            .entry(tablet_id)
                            .or_default()
                            .push(info.schema_hash);
                        continue;
                    }
                    diff.found_valid.insert(tablet_id);

                    if info.schema_hash == meta.old_schema_hash
                        && (replica.version < info.version
                            || (replica.version == info.version
                                && replica.version_hash != info.version_hash))
                    {
                        needs_sync = true;
                    }

                    if let Some(medium) = info.storage_medium {
                        if medium != meta.storage_medium {
                            migrate_to = Some(meta.storage_medium);
                        }
                    }
                }

                if needs_sync {
                    diff.sync.entry(db_id).or_default().push(tablet_id);
                }
                if let Some(medium) = migrate_to {
                    diff.migration.push((tablet_id, medium));
                }
            }
        }

        diff.unknown = reported
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();

        debug!(
            backend_id,
            sync = diff.sync.values().map(Vec::len).sum::<usize>(),
            delete_from_meta = diff.delete_from_meta.values().map(Vec::len).sum::<usize>(),
            valid = diff.found_valid.len(),
            invalid = diff.found_invalid.len(),
            migration = diff.migration.len(),
            unknown = diff.unknown.len(),
            "Tablet report diffed"
        );
        diff
    }
}
