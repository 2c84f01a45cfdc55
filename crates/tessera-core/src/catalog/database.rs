//! A database and the lock guarding its tables.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use super::OlapTable;
use crate::types::{DbId, TableId};

/// Tables of one database, only reachable through the database lock.
#[derive(Debug, Default)]
pub struct DatabaseTables {
    by_id: BTreeMap<TableId, OlapTable>,
    by_name: FxHashMap<String, TableId>,
}

impl DatabaseTables {
    /// Table by id.
    #[must_use]
    pub fn table(&self, table_id: TableId) -> Option<&OlapTable> {
        self.by_id.get(&table_id)
    }

    /// Mutable table by id.
    pub fn table_mut(&mut self, table_id: TableId) -> Option<&mut OlapTable> {
        self.by_id.get_mut(&table_id)
    }

    /// Table by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&OlapTable> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Table id for a name.
    #[must_use]
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    /// Adds a table, replacing any table with the same id.
    pub fn insert(&mut self, table: OlapTable) {
        self.by_name.insert(table.name.clone(), table.id);
        self.by_id.insert(table.id, table);
    }

    /// Iterates tables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &OlapTable> {
        self.by_id.values()
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if the database holds no table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A database. Its read/write lock guards every table, partition, tablet
/// and replica below it.
#[derive(Debug)]
pub struct Database {
    id: DbId,
    name: String,
    tables: RwLock<DatabaseTables>,
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new(id: DbId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tables: RwLock::new(DatabaseTables::default()),
        }
    }

    /// Database id.
    #[must_use]
    pub fn id(&self) -> DbId {
        self.id
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the read lock.
    pub fn read(&self) -> RwLockReadGuard<'_, DatabaseTables> {
        self.tables.read()
    }

    /// Acquires the write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, DatabaseTables> {
        self.tables.write()
    }
}
