//! Tablet inverted index: tablet id → owning path and schema hashes, plus
//! the backend → tablets membership used to diff tablet reports.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::{
    BackendId, DbId, IndexId, PartitionId, SchemaHash, StorageMedium, TableId, TabletId,
};

/// Where a tablet lives and which schema hashes it may legitimately carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabletMeta {
    /// Owning database.
    pub db_id: DbId,
    /// Owning table.
    pub table_id: TableId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Owning index.
    pub index_id: IndexId,
    /// Active schema hash.
    pub old_schema_hash: SchemaHash,
    /// Schema hash being built by a running schema change.
    pub new_schema_hash: Option<SchemaHash>,
    /// Schema hash replaced by a finished schema change, kept until purged.
    pub retired_schema_hash: Option<SchemaHash>,
    /// Storage medium configured for the partition.
    pub storage_medium: StorageMedium,
}

impl TabletMeta {
    /// True if `schema_hash` belongs to this tablet's active, pending or retired schema.
    #[must_use]
    pub fn contains_schema_hash(&self, schema_hash: SchemaHash) -> bool {
        self.old_schema_hash == schema_hash
            || self.new_schema_hash == Some(schema_hash)
            || self.retired_schema_hash == Some(schema_hash)
    }
}

#[derive(Debug, Default)]
struct InvertedInner {
    metas: FxHashMap<TabletId, TabletMeta>,
    by_index: FxHashMap<(PartitionId, IndexId), Vec<TabletId>>,
    backend_tablets: FxHashMap<BackendId, FxHashSet<TabletId>>,
}

impl InvertedInner {
    fn for_index(
        &mut self,
        partition_id: PartitionId,
        index_id: IndexId,
        mut f: impl FnMut(&mut TabletMeta),
    ) {
        let Some(tablet_ids) = self.by_index.get(&(partition_id, index_id)) else {
            return;
        };
        for tablet_id in tablet_ids {
            if let Some(meta) = self.metas.get_mut(tablet_id) {
                f(meta);
            }
        }
    }
}

/// Registry of tablet placement. A leaf lock: never held while acquiring another.
#[derive(Debug, Default)]
pub struct TabletInvertedIndex {
    inner: RwLock<InvertedInner>,
}

impl TabletInvertedIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tablet.
    pub fn add_tablet(&self, tablet_id: TabletId, meta: TabletMeta) {
        let mut inner = self.inner.write();
        inner
            .by_index
            .entry((meta.partition_id, meta.index_id))
            .or_default()
            .push(tablet_id);
        inner.metas.insert(tablet_id, meta);
    }

    /// Records that `backend_id` hosts a replica of `tablet_id`.
    pub fn add_replica(&self, tablet_id: TabletId, backend_id: BackendId) {
        self.inner
            .write()
            .backend_tablets
            .entry(backend_id)
            .or_default()
            .insert(tablet_id);
    }

    /// Forgets that `backend_id` hosts a replica of `tablet_id`.
    pub fn delete_replica(&self, tablet_id: TabletId, backend_id: BackendId) {
        let mut inner = self.inner.write();
        if let Some(tablets) = inner.backend_tablets.get_mut(&backend_id) {
            tablets.remove(&tablet_id);
        }
    }

    /// Placement of a tablet.
    #[must_use]
    pub fn tablet_meta(&self, tablet_id: TabletId) -> Option<TabletMeta> {
        self.inner.read().metas.get(&tablet_id).copied()
    }

    /// Snapshot of every tablet hosted on a backend, sorted by tablet id.
    #[must_use]
    pub fn tablets_on_backend(&self, backend_id: BackendId) -> Vec<(TabletId, TabletMeta)> {
        let inner = self.inner.read();
        let Some(tablets) = inner.backend_tablets.get(&backend_id) else {
            return Vec::new();
        };
        let mut out: Vec<_> = tablets
            .iter()
            .filter_map(|id| inner.metas.get(id).map(|meta| (*id, *meta)))
            .collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    /// Installs the schema hash a schema change is building for (partition, index).
    pub fn set_new_schema_hash(
        &self,
        partition_id: PartitionId,
        index_id: IndexId,
        schema_hash: SchemaHash,
    ) {
        self.inner
            .write()
            .for_index(partition_id, index_id, |meta| {
                meta.new_schema_hash = Some(schema_hash);
            });
    }

    /// Drops the pending schema hash after a cancelled schema change.
    pub fn delete_new_schema_hash(&self, partition_id: PartitionId, index_id: IndexId) {
        self.inner
            .write()
            .for_index(partition_id, index_id, |meta| meta.new_schema_hash = None);
    }

    /// Promotes the pending schema hash; the previous one becomes retired.
    pub fn update_to_new_schema_hash(&self, partition_id: PartitionId, index_id: IndexId) {
        self.inner.write().for_index(partition_id, index_id, |meta| {
            if let Some(new_hash) = meta.new_schema_hash.take() {
                meta.retired_schema_hash = Some(meta.old_schema_hash);
                meta.old_schema_hash = new_hash;
            }
        });
    }

    /// Forgets the retired schema hash once its files have been purged.
    pub fn clear_retired_schema_hash(&self, partition_id: PartitionId, index_id: IndexId) {
        self.inner
            .write()
            .for_index(partition_id, index_id, |meta| meta.retired_schema_hash = None);
    }

    /// Schema hash backends should operate on for a tablet.
    #[must_use]
    pub fn effective_schema_hash(&self, tablet_id: TabletId) -> Option<SchemaHash> {
        self.inner
            .read()
            .metas
            .get(&tablet_id)
            .map(|meta| meta.old_schema_hash)
    }

    /// Number of registered tablets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().metas.len()
    }

    /// True when no tablet is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().metas.is_empty()
    }
}
