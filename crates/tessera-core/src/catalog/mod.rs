//! Authoritative metadata: databases, tables, tablet placement and backends.
//!
//! # Locking
//!
//! Each [`Database`] carries the read/write lock for everything beneath it.
//! The database map, [`TabletInvertedIndex`] and [`SystemInfo`] are leaf
//! locks taken briefly and never held while acquiring a database lock.

mod column;
#[cfg(test)]
mod column_tests;
mod database;
mod inverted_index;
mod report_diff;
#[cfg(test)]
mod report_diff_tests;
pub mod schema;
mod system_info;
mod table;
#[cfg(test)]
mod tests;

pub use column::Column;
pub use database::{Database, DatabaseTables};
pub use inverted_index::{TabletInvertedIndex, TabletMeta};
pub use report_diff::{ReportedTablet, ReportedTabletInfo, TabletReportDiff};
pub use system_info::{Backend, DiskInfo, SystemInfo};
pub use table::{
    BloomFilterInfo, DistributionInfo, IndexSchema, MaterializedIndex, OlapTable, Partition,
    Replica, Tablet,
};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AlterConfig;
use crate::error::{Error, Result};
use crate::persist::{EditLog, EditLogEntry, ReplicaPersistInfo};
use crate::types::{
    BackendId, DbId, IndexState, KeysType, PartitionState, ReplicaState, StorageMedium,
    StorageType, TableId, TableState, Version, VersionHash,
};

/// First id handed out by a fresh catalog.
pub const NEXT_ID_INIT_VALUE: u64 = 10_000;

/// Version every replica of a new table starts at.
pub const INITIAL_VERSION: Version = 1;
/// Hash of [`INITIAL_VERSION`].
pub const INITIAL_VERSION_HASH: VersionHash = 0;

/// Distribution requested at table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionDef {
    /// Hash on the named base columns.
    Hash {
        /// Column names.
        columns: Vec<String>,
        /// Tablets per index per partition.
        buckets: u32,
    },
    /// Random placement.
    Random {
        /// Tablets per index per partition.
        buckets: u32,
    },
}

/// A rollup requested at table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupDef {
    /// Rollup name.
    pub name: String,
    /// Base column names, keys first.
    pub columns: Vec<String>,
}

/// Table creation request.
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table name; also the base index name.
    pub name: String,
    /// Key model.
    pub keys_type: KeysType,
    /// Base columns, keys first.
    pub columns: Vec<Column>,
    /// Rollup indexes.
    pub rollups: Vec<RollupDef>,
    /// Partition names.
    pub partitions: Vec<String>,
    /// Range partition column names.
    pub partition_columns: Vec<String>,
    /// Distribution of every partition.
    pub distribution: DistributionDef,
    /// Replication factor.
    pub replication_num: u16,
    /// Storage medium of every partition.
    pub storage_medium: StorageMedium,
    /// Bloom filter configuration.
    pub bloom_filter: Option<BloomFilterInfo>,
}

impl TableDef {
    /// A single-partition table hashed on its first column into one bucket,
    /// three replicas on HDD.
    #[must_use]
    pub fn new(name: impl Into<String>, keys_type: KeysType, columns: Vec<Column>) -> Self {
        let name = name.into();
        let hash_column = columns.first().map(|c| c.name.clone()).into_iter().collect();
        Self {
            partitions: vec![name.clone()],
            name,
            keys_type,
            columns,
            rollups: Vec::new(),
            partition_columns: Vec::new(),
            distribution: DistributionDef::Hash {
                columns: hash_column,
                buckets: 1,
            },
            replication_num: 3,
            storage_medium: StorageMedium::Hdd,
            bloom_filter: None,
        }
    }

    /// Adds a rollup.
    #[must_use]
    pub fn with_rollup(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.rollups.push(RollupDef {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        });
        self
    }

    /// Replaces the partition list.
    #[must_use]
    pub fn with_partitions(mut self, names: &[&str]) -> Self {
        self.partitions = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Sets the range partition columns.
    #[must_use]
    pub fn with_partition_columns(mut self, names: &[&str]) -> Self {
        self.partition_columns = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Sets the distribution.
    #[must_use]
    pub fn with_distribution(mut self, distribution: DistributionDef) -> Self {
        self.distribution = distribution;
        self
    }

    /// Sets the replication factor.
    #[must_use]
    pub fn with_replication_num(mut self, replication_num: u16) -> Self {
        self.replication_num = replication_num;
        self
    }

    /// Sets the storage medium.
    #[must_use]
    pub fn with_storage_medium(mut self, medium: StorageMedium) -> Self {
        self.storage_medium = medium;
        self
    }

    /// Sets the bloom filter configuration.
    #[must_use]
    pub fn with_bloom_filter(mut self, bloom_filter: BloomFilterInfo) -> Self {
        self.bloom_filter = Some(bloom_filter);
        self
    }
}

#[derive(Debug, Default)]
struct DatabaseMap {
    by_id: FxHashMap<DbId, Arc<Database>>,
    by_name: FxHashMap<String, DbId>,
}

/// The metadata catalog owned by the master.
#[derive(Debug)]
pub struct Catalog {
    next_id: AtomicU64,
    databases: RwLock<DatabaseMap>,
    inverted_index: TabletInvertedIndex,
    system_info: SystemInfo,
    is_master: AtomicBool,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates an empty catalog acting as master.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(NEXT_ID_INIT_VALUE),
            databases: RwLock::new(DatabaseMap::default()),
            inverted_index: TabletInvertedIndex::new(),
            system_info: SystemInfo::new(),
            is_master: AtomicBool::new(true),
        }
    }

    /// Allocates a fresh id for any catalog object, job or replica.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Makes sure future ids are strictly greater than `id`.
    pub fn ensure_next_id_above(&self, id: u64) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    /// True while this process is the elected master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.is_master.load(Ordering::SeqCst)
    }

    /// Updates the master flag.
    pub fn set_master(&self, is_master: bool) {
        self.is_master.store(is_master, Ordering::SeqCst);
    }

    /// Tablet inverted index.
    #[must_use]
    pub fn inverted_index(&self) -> &TabletInvertedIndex {
        &self.inverted_index
    }

    /// Backend registry.
    #[must_use]
    pub fn system_info(&self) -> &SystemInfo {
        &self.system_info
    }

    /// Database by id.
    #[must_use]
    pub fn db(&self, db_id: DbId) -> Option<Arc<Database>> {
        self.databases.read().by_id.get(&db_id).cloned()
    }

    /// Database by name.
    #[must_use]
    pub fn db_by_name(&self, name: &str) -> Option<Arc<Database>> {
        let map = self.databases.read();
        map.by_name.get(name).and_then(|id| map.by_id.get(id)).cloned()
    }

    /// Ids of all databases, sorted.
    #[must_use]
    pub fn db_ids(&self) -> Vec<DbId> {
        let mut ids: Vec<_> = self.databases.read().by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Databases and backends
    // ------------------------------------------------------------------

    /// Creates a database.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or the edit log rejects the record.
    pub fn create_database(&self, name: &str, edit_log: &dyn EditLog) -> Result<DbId> {
        let mut map = self.databases.write();
        if map.by_name.contains_key(name) {
            return Err(Error::Validation(format!(
                "Can't create database '{name}'; database exists"
            )));
        }
        let db_id = self.next_id();
        edit_log.append(&EditLogEntry::CreateDatabase {
            db_id,
            name: name.to_string(),
        })?;
        Self::insert_database(&mut map, db_id, name);
        info!(db_id, name, "Database created");
        Ok(db_id)
    }

    /// Reapplies a logged database creation.
    pub fn replay_create_database(&self, db_id: DbId, name: &str) {
        Self::insert_database(&mut self.databases.write(), db_id, name);
        self.ensure_next_id_above(db_id);
    }

    fn insert_database(map: &mut DatabaseMap, db_id: DbId, name: &str) {
        map.by_name.insert(name.to_string(), db_id);
        map.by_id.insert(db_id, Arc::new(Database::new(db_id, name)));
    }

    /// Registers a backend.
    ///
    /// # Errors
    ///
    /// Fails if the address is taken or the edit log rejects the record.
    pub fn add_backend(&self, host: &str, port: u16, edit_log: &dyn EditLog) -> Result<BackendId> {
        if self.system_info.backend_id_by_addr(host, port).is_some() {
            return Err(Error::Validation(format!(
                "Same backend already exists[{host}:{port}]"
            )));
        }
        let backend = Backend::new(self.next_id(), host, port);
        edit_log.append(&EditLogEntry::AddBackend(backend.clone()))?;
        let backend_id = backend.id;
        self.system_info.add_backend(backend);
        info!(backend_id, host, port, "Backend added");
        Ok(backend_id)
    }

    /// Reapplies a logged backend registration.
    pub fn replay_add_backend(&self, backend: Backend) {
        self.ensure_next_id_above(backend.id);
        self.system_info.add_backend(backend);
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Creates a table with its whole partition → tablet → replica tree.
    ///
    /// # Errors
    ///
    /// Fails on an unknown database, a taken name, an invalid definition,
    /// too few available backends, or an edit log failure.
    pub fn create_table(
        &self,
        db_name: &str,
        def: &TableDef,
        config: &AlterConfig,
        edit_log: &dyn EditLog,
    ) -> Result<TableId> {
        let db = self
            .db_by_name(db_name)
            .ok_or_else(|| Error::DatabaseNotFound(db_name.to_string()))?;

        let mut tables = db.write();
        if tables.table_id(&def.name).is_some() {
            return Err(Error::Validation(format!(
                "Table '{}' already exists",
                def.name
            )));
        }

        let table = self.build_table(def, config)?;
        let table_id = table.id;
        edit_log.append(&EditLogEntry::CreateTable {
            db_id: db.id(),
            table: table.clone(),
        })?;
        self.apply_create_table(db.id(), &mut tables, table);
        info!(db_id = db.id(), table_id, name = %def.name, "Table created");
        Ok(table_id)
    }

    /// Reapplies a logged table creation.
    pub fn replay_create_table(&self, db_id: DbId, table: OlapTable) {
        let Some(db) = self.db(db_id) else {
            warn!(db_id, table_id = table.id, "Replay create table: database missing");
            return;
        };
        let mut tables = db.write();
        self.apply_create_table(db_id, &mut tables, table);
    }

    fn apply_create_table(&self, db_id: DbId, tables: &mut DatabaseTables, table: OlapTable) {
        let mut max_id = table.id;
        for partition in table.partitions.values() {
            max_id = max_id.max(partition.id);
            for index in partition.indexes.values() {
                let schema_hash = table.schema_hash(index.id).unwrap_or_default();
                for tablet in index.tablets.values() {
                    max_id = max_id.max(tablet.id);
                    self.inverted_index.add_tablet(
                        tablet.id,
                        TabletMeta {
                            db_id,
                            table_id: table.id,
                            partition_id: partition.id,
                            index_id: index.id,
                            old_schema_hash: schema_hash,
                            new_schema_hash: None,
                            retired_schema_hash: None,
                            storage_medium: partition.storage_medium,
                        },
                    );
                    for replica in &tablet.replicas {
                        max_id = max_id.max(replica.id);
                        self.inverted_index.add_replica(tablet.id, replica.backend_id);
                    }
                }
            }
        }
        for index_id in table.indexes.keys() {
            max_id = max_id.max(*index_id);
        }
        self.ensure_next_id_above(max_id);
        tables.insert(table);
    }

    fn build_table(&self, def: &TableDef, config: &AlterConfig) -> Result<OlapTable> {
        let base_columns = normalize_base_columns(def.keys_type, &def.columns)?;
        if def.replication_num == 0 {
            return Err(Error::Validation("Replication num should larger than 0".into()));
        }

        let find = |name: &str| -> Result<Column> {
            base_columns
                .iter()
                .find(|c| c.name_is(name))
                .cloned()
                .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
        };

        let partition_columns = def
            .partition_columns
            .iter()
            .map(|name| find(name))
            .collect::<Result<Vec<_>>>()?;

        let distribution = match &def.distribution {
            DistributionDef::Hash { columns, buckets } => DistributionInfo::Hash {
                columns: columns.iter().map(|name| find(name)).collect::<Result<_>>()?,
                buckets: (*buckets).max(1),
            },
            DistributionDef::Random { buckets } => DistributionInfo::Random {
                buckets: (*buckets).max(1),
            },
        };

        let table_id = self.next_id();
        let mut indexes = BTreeMap::new();
        let mut index_defs = vec![(table_id, def.name.clone(), base_columns.clone())];
        for rollup in &def.rollups {
            let columns = rollup
                .columns
                .iter()
                .map(|name| find(name))
                .collect::<Result<Vec<_>>>()?;
            index_defs.push((self.next_id(), rollup.name.clone(), columns));
        }

        for (index_id, name, columns) in index_defs {
            check_key_order(&columns, &name)?;
            let short_key_count = schema::short_key_column_count(
                &columns,
                None,
                config.max_short_key_column_count,
                config.max_short_key_size_bytes,
            )?;
            let schema_hash = schema::schema_hash(0, &columns, def.bloom_filter.as_ref());
            indexes.insert(
                index_id,
                IndexSchema {
                    index_id,
                    name,
                    columns,
                    schema_version: 0,
                    schema_hash,
                    short_key_count,
                    storage_type: StorageType::Column,
                },
            );
        }

        let backends = self.system_info.available_backend_ids();
        let replication_num = usize::from(def.replication_num);
        if backends.len() < replication_num {
            return Err(Error::Precondition(format!(
                "Failed to find enough backends. need: {replication_num}, available: {}",
                backends.len()
            )));
        }

        let mut cursor = 0usize;
        let mut partitions = BTreeMap::new();
        for partition_name in &def.partitions {
            let partition_id = self.next_id();
            let mut materialized = BTreeMap::new();
            for index_id in indexes.keys() {
                let mut tablets = BTreeMap::new();
                for _ in 0..distribution.buckets() {
                    let tablet_id = self.next_id();
                    let replicas = (0..replication_num)
                        .map(|i| Replica {
                            id: self.next_id(),
                            backend_id: backends[(cursor + i) % backends.len()],
                            version: INITIAL_VERSION,
                            version_hash: INITIAL_VERSION_HASH,
                            data_size: 0,
                            row_count: 0,
                            state: ReplicaState::Normal,
                        })
                        .collect();
                    cursor += 1;
                    tablets.insert(
                        tablet_id,
                        Tablet {
                            id: tablet_id,
                            replicas,
                        },
                    );
                }
                materialized.insert(
                    *index_id,
                    MaterializedIndex {
                        id: *index_id,
                        state: IndexState::Normal,
                        tablets,
                    },
                );
            }
            partitions.insert(
                partition_id,
                Partition {
                    id: partition_id,
                    name: partition_name.clone(),
                    state: PartitionState::Normal,
                    distribution: distribution.clone(),
                    committed_version: INITIAL_VERSION,
                    committed_version_hash: INITIAL_VERSION_HASH,
                    replication_num: def.replication_num,
                    storage_medium: def.storage_medium,
                    indexes: materialized,
                },
            );
        }

        Ok(OlapTable {
            id: table_id,
            name: def.name.clone(),
            keys_type: def.keys_type,
            state: TableState::Normal,
            base_index_id: table_id,
            indexes,
            partition_columns,
            default_distribution: distribution,
            bloom_filter: def.bloom_filter.clone(),
            partitions,
        })
    }

    // ------------------------------------------------------------------
    // Replica point mutations
    // ------------------------------------------------------------------

    /// Attaches a replica described by `info` in NORMAL state.
    ///
    /// Returns false if the path no longer resolves or the backend already
    /// hosts a replica of the tablet.
    pub fn apply_add_replica(&self, tables: &mut DatabaseTables, info: &ReplicaPersistInfo) -> bool {
        let Some(tablet) = tables.table_mut(info.table_id).and_then(|t| {
            t.tablet_mut(info.partition_id, info.index_id, info.tablet_id)
        }) else {
            return false;
        };
        if tablet.replica_by_backend(info.backend_id).is_some() {
            return false;
        }
        tablet.replicas.push(Replica {
            id: info.replica_id,
            backend_id: info.backend_id,
            version: info.version,
            version_hash: info.version_hash,
            data_size: info.data_size,
            row_count: info.row_count,
            state: ReplicaState::Normal,
        });
        self.inverted_index.add_replica(info.tablet_id, info.backend_id);
        self.ensure_next_id_above(info.replica_id);
        true
    }

    /// Detaches the replica of `info.tablet_id` hosted on `info.backend_id`.
    pub fn apply_delete_replica(
        &self,
        tables: &mut DatabaseTables,
        info: &ReplicaPersistInfo,
    ) -> Option<Replica> {
        let tablet = tables
            .table_mut(info.table_id)?
            .tablet_mut(info.partition_id, info.index_id, info.tablet_id)?;
        let removed = tablet.delete_replica_by_backend(info.backend_id)?;
        self.inverted_index
            .delete_replica(info.tablet_id, info.backend_id);
        Some(removed)
    }

    /// Reapplies a logged replica addition.
    pub fn replay_add_replica(&self, info: &ReplicaPersistInfo) {
        if let Some(db) = self.db(info.db_id) {
            let mut tables = db.write();
            if !self.apply_add_replica(&mut tables, info) {
                warn!(tablet_id = info.tablet_id, backend_id = info.backend_id,
                      "Replay add replica skipped");
            }
        }
    }

    /// Reapplies a logged replica deletion.
    pub fn replay_delete_replica(&self, info: &ReplicaPersistInfo) {
        if let Some(db) = self.db(info.db_id) {
            let mut tables = db.write();
            if self.apply_delete_replica(&mut tables, info).is_none() {
                warn!(tablet_id = info.tablet_id, backend_id = info.backend_id,
                      "Replay delete replica skipped");
            }
        }
    }
}

/// Assigns key-ness and implicit aggregation per the key model and checks
/// the base column list of a new table.
fn normalize_base_columns(keys_type: KeysType, columns: &[Column]) -> Result<Vec<Column>> {
    if columns.is_empty() {
        return Err(Error::Validation("Table should contain at least one column".into()));
    }

    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        if out.iter().any(|c: &Column| c.name_is(&column.name)) {
            return Err(Error::Validation(format!(
                "Duplicate column name '{}'",
                column.name
            )));
        }
        let mut column = column.clone();
        if column.column_type.primitive == crate::types::PrimitiveType::Hll
            && keys_type != KeysType::AggKeys
        {
            return Err(Error::Validation("HLL must be used in AGG_KEYS".into()));
        }
        match keys_type {
            KeysType::AggKeys => {
                if column.is_key && column.aggregation.is_some() {
                    return Err(Error::Validation(format!(
                        "Key column[{}] should not specify aggregate type",
                        column.name
                    )));
                }
                if !column.is_key && column.aggregation.is_none() {
                    return Err(Error::Validation(format!(
                        "Value column[{}] of AGG_KEYS table should specify aggregate type",
                        column.name
                    )));
                }
            }
            KeysType::UniqueKeys | KeysType::DupKeys => {
                if column.aggregation.is_some() && !column.aggregation_implicit {
                    return Err(Error::Validation(format!(
                        "Column[{}] of {} table cannot use aggregation method",
                        column.name, keys_type
                    )));
                }
                if column.is_key {
                    column.aggregation = None;
                    column.aggregation_implicit = false;
                } else {
                    column.aggregation = (keys_type == KeysType::UniqueKeys)
                        .then_some(crate::types::AggregateType::Replace);
                    column.aggregation_implicit = true;
                }
            }
        }
        out.push(column);
    }
    Ok(out)
}

/// Keys before values, at least one key.
pub(crate) fn check_key_order(columns: &[Column], index_name: &str) -> Result<()> {
    let mut meet_value = false;
    let mut has_key = false;
    for column in columns {
        if column.is_key && meet_value {
            return Err(Error::Validation(format!(
                "Invalid column order. value should be after key. index[{index_name}]"
            )));
        }
        if column.is_key {
            has_key = true;
        } else {
            meet_value = true;
        }
    }
    if !has_key {
        return Err(Error::Validation(format!(
            "No key column left. index[{index_name}]"
        )));
    }
    Ok(())
}
