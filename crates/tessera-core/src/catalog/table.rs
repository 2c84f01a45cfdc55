//! OLAP table tree: table → partition → materialized index → tablet → replica.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::Column;
use crate::types::{
    BackendId, IndexId, IndexState, KeysType, PartitionId, PartitionState, ReplicaId,
    ReplicaState, SchemaHash, StorageMedium, StorageType, TableId, TableState, TabletId, Version,
    VersionHash,
};

/// One physical copy of a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Replica id.
    pub id: ReplicaId,
    /// Hosting backend.
    pub backend_id: BackendId,
    /// Latest data version known to the master.
    pub version: Version,
    /// Hash accompanying `version`.
    pub version_hash: VersionHash,
    /// Bytes on disk.
    pub data_size: i64,
    /// Row count.
    pub row_count: i64,
    /// Current state.
    pub state: ReplicaState,
}

impl Replica {
    /// Overwrites the version and statistics with values observed on the backend.
    pub fn update_info(
        &mut self,
        version: Version,
        version_hash: VersionHash,
        data_size: i64,
        row_count: i64,
    ) {
        self.version = version;
        self.version_hash = version_hash;
        self.data_size = data_size;
        self.row_count = row_count;
    }
}

/// A shard of one (partition, index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tablet {
    /// Tablet id.
    pub id: TabletId,
    /// Replicas, at most one per backend.
    pub replicas: Vec<Replica>,
}

impl Tablet {
    /// Replica hosted on `backend_id`.
    #[must_use]
    pub fn replica_by_backend(&self, backend_id: BackendId) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.backend_id == backend_id)
    }

    /// Mutable replica hosted on `backend_id`.
    pub fn replica_by_backend_mut(&mut self, backend_id: BackendId) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.backend_id == backend_id)
    }

    /// Mutable replica by id.
    pub fn replica_mut(&mut self, replica_id: ReplicaId) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.id == replica_id)
    }

    /// Removes and returns the replica hosted on `backend_id`.
    pub fn delete_replica_by_backend(&mut self, backend_id: BackendId) -> Option<Replica> {
        let pos = self.replicas.iter().position(|r| r.backend_id == backend_id)?;
        Some(self.replicas.remove(pos))
    }
}

/// One materialized index inside one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedIndex {
    /// Index id, shared with the table-level [`IndexSchema`].
    pub id: IndexId,
    /// State within this partition.
    pub state: IndexState,
    /// Tablets keyed by id.
    pub tablets: BTreeMap<TabletId, Tablet>,
}

impl MaterializedIndex {
    /// Tablet by id.
    #[must_use]
    pub fn tablet(&self, tablet_id: TabletId) -> Option<&Tablet> {
        self.tablets.get(&tablet_id)
    }

    /// Mutable tablet by id.
    pub fn tablet_mut(&mut self, tablet_id: TabletId) -> Option<&mut Tablet> {
        self.tablets.get_mut(&tablet_id)
    }
}

/// How rows are spread over the tablets of a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DistributionInfo {
    /// Hash of the given columns.
    Hash {
        /// Distribution columns, copies of the base schema definitions.
        columns: Vec<Column>,
        /// Tablets per index.
        buckets: u32,
    },
    /// Uniform random placement.
    Random {
        /// Tablets per index.
        buckets: u32,
    },
}

impl DistributionInfo {
    /// Number of tablets per index.
    #[must_use]
    pub fn buckets(&self) -> u32 {
        match self {
            Self::Hash { buckets, .. } | Self::Random { buckets } => *buckets,
        }
    }
}

/// A partition of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition id.
    pub id: PartitionId,
    /// Partition name.
    pub name: String,
    /// State.
    pub state: PartitionState,
    /// Distribution of this partition.
    pub distribution: DistributionInfo,
    /// Latest fully visible data version.
    pub committed_version: Version,
    /// Hash of `committed_version`.
    pub committed_version_hash: VersionHash,
    /// Configured replication factor.
    pub replication_num: u16,
    /// Configured storage medium.
    pub storage_medium: StorageMedium,
    /// Materialized indexes keyed by id.
    pub indexes: BTreeMap<IndexId, MaterializedIndex>,
}

impl Partition {
    /// Materialized index by id.
    #[must_use]
    pub fn index(&self, index_id: IndexId) -> Option<&MaterializedIndex> {
        self.indexes.get(&index_id)
    }

    /// Mutable materialized index by id.
    pub fn index_mut(&mut self, index_id: IndexId) -> Option<&mut MaterializedIndex> {
        self.indexes.get_mut(&index_id)
    }

    /// Majority of the replication factor.
    #[must_use]
    pub fn quorum(&self) -> usize {
        usize::from(self.replication_num) / 2 + 1
    }
}

/// Table-level definition of one materialized index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index id.
    pub index_id: IndexId,
    /// Index name; the base index is named after the table.
    pub name: String,
    /// Ordered columns, keys first.
    pub columns: Vec<Column>,
    /// Monotonic schema version.
    pub schema_version: i32,
    /// Active schema hash.
    pub schema_hash: SchemaHash,
    /// Number of leading key columns in the short key.
    pub short_key_count: u16,
    /// On-disk layout.
    pub storage_type: StorageType,
}

/// Bloom filter configuration of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterInfo {
    /// Indexed column names.
    pub columns: BTreeSet<String>,
    /// False-positive probability.
    pub fpp: f64,
}

/// An OLAP table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlapTable {
    /// Table id, also the base index id.
    pub id: TableId,
    /// Table name.
    pub name: String,
    /// Key model.
    pub keys_type: KeysType,
    /// Structural-change state.
    pub state: TableState,
    /// Base index id.
    pub base_index_id: IndexId,
    /// Index schemas keyed by index id.
    pub indexes: BTreeMap<IndexId, IndexSchema>,
    /// Range partition columns.
    pub partition_columns: Vec<Column>,
    /// Distribution applied to new partitions.
    pub default_distribution: DistributionInfo,
    /// Bloom filter configuration.
    pub bloom_filter: Option<BloomFilterInfo>,
    /// Partitions keyed by id.
    pub partitions: BTreeMap<PartitionId, Partition>,
}

impl OlapTable {
    /// Base index columns.
    #[must_use]
    pub fn base_schema(&self) -> &[Column] {
        self.indexes
            .get(&self.base_index_id)
            .map_or(&[], |index| index.columns.as_slice())
    }

    /// Index schema by id.
    #[must_use]
    pub fn index_schema(&self, index_id: IndexId) -> Option<&IndexSchema> {
        self.indexes.get(&index_id)
    }

    /// Index id for an index name.
    #[must_use]
    pub fn index_id_by_name(&self, name: &str) -> Option<IndexId> {
        self.indexes
            .values()
            .find(|index| index.name == name)
            .map(|index| index.index_id)
    }

    /// Index name for an id, empty when unknown.
    #[must_use]
    pub fn index_name(&self, index_id: IndexId) -> &str {
        self.indexes
            .get(&index_id)
            .map_or("", |index| index.name.as_str())
    }

    /// Active schema hash of an index.
    #[must_use]
    pub fn schema_hash(&self, index_id: IndexId) -> Option<SchemaHash> {
        self.indexes.get(&index_id).map(|index| index.schema_hash)
    }

    /// Base schema column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.base_schema().iter().find(|c| c.name_is(name))
    }

    /// True if any partition is randomly distributed.
    #[must_use]
    pub fn has_random_distribution(&self) -> bool {
        self.partitions
            .values()
            .any(|p| matches!(p.distribution, DistributionInfo::Random { .. }))
    }

    /// Partition by id.
    #[must_use]
    pub fn partition(&self, partition_id: PartitionId) -> Option<&Partition> {
        self.partitions.get(&partition_id)
    }

    /// Mutable partition by id.
    pub fn partition_mut(&mut self, partition_id: PartitionId) -> Option<&mut Partition> {
        self.partitions.get_mut(&partition_id)
    }

    /// Mutable tablet addressed by its full path.
    pub fn tablet_mut(
        &mut self,
        partition_id: PartitionId,
        index_id: IndexId,
        tablet_id: TabletId,
    ) -> Option<&mut Tablet> {
        self.partitions
            .get_mut(&partition_id)?
            .indexes
            .get_mut(&index_id)?
            .tablets
            .get_mut(&tablet_id)
    }

    /// Tablet addressed by its full path.
    #[must_use]
    pub fn tablet(
        &self,
        partition_id: PartitionId,
        index_id: IndexId,
        tablet_id: TabletId,
    ) -> Option<&Tablet> {
        self.partitions
            .get(&partition_id)?
            .indexes
            .get(&index_id)?
            .tablets
            .get(&tablet_id)
    }
}
