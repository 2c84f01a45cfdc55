//! Tests for the catalog: databases, table creation and replica point mutations.

use super::*;
use crate::persist::MemoryEditLog;
use crate::types::{AggregateType, ColumnType, PrimitiveType};

fn catalog_with_backends(n: usize) -> (Catalog, MemoryEditLog) {
    let catalog = Catalog::new();
    let log = MemoryEditLog::new();
    for i in 0..n {
        catalog.add_backend(&format!("be{i}"), 9050, &log).unwrap();
    }
    catalog.create_database("db1", &log).unwrap();
    (catalog, log)
}

fn agg_def(name: &str) -> TableDef {
    TableDef::new(
        name,
        KeysType::AggKeys,
        vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("k2", ColumnType::varchar(32)).key(),
            Column::new("v1", ColumnType::new(PrimitiveType::BigInt)).aggregate(AggregateType::Sum),
        ],
    )
}

// ========================================================================
// Databases and backends
// ========================================================================

#[test]
fn test_create_database_rejects_duplicate() {
    let (catalog, log) = catalog_with_backends(0);

    let err = catalog.create_database("db1", &log).unwrap_err();

    assert_eq!(err.code(), "TESS-001");
    assert!(catalog.db_by_name("db1").is_some());
}

#[test]
fn test_add_backend_rejects_duplicate_address() {
    let (catalog, log) = catalog_with_backends(1);

    assert!(catalog.add_backend("be0", 9050, &log).is_err());
    assert!(catalog.add_backend("be0", 9051, &log).is_ok());
    assert_eq!(catalog.system_info().len(), 2);
}

#[test]
fn test_ids_are_unique_and_increasing() {
    let catalog = Catalog::new();

    let a = catalog.next_id();
    let b = catalog.next_id();
    catalog.ensure_next_id_above(50_000);

    assert!(a >= NEXT_ID_INIT_VALUE);
    assert_eq!(b, a + 1);
    assert_eq!(catalog.next_id(), 50_001);
}

// ========================================================================
// Table creation
// ========================================================================

#[test]
fn test_create_table_builds_tablet_tree() {
    // Arrange
    let (catalog, log) = catalog_with_backends(3);
    let def = agg_def("t1")
        .with_rollup("r1", &["k1", "v1"])
        .with_partitions(&["p1", "p2"])
        .with_distribution(DistributionDef::Hash {
            columns: vec!["k1".to_string()],
            buckets: 2,
        });

    // Act
    let table_id = catalog
        .create_table("db1", &def, &AlterConfig::default(), &log)
        .unwrap();

    // Assert
    let db = catalog.db_by_name("db1").unwrap();
    let tables = db.read();
    let table = tables.table(table_id).unwrap();
    assert_eq!(table.base_index_id, table_id);
    assert_eq!(table.indexes.len(), 2);
    assert_eq!(table.partitions.len(), 2);
    for partition in table.partitions.values() {
        assert_eq!(partition.indexes.len(), 2);
        for index in partition.indexes.values() {
            assert_eq!(index.tablets.len(), 2);
            for tablet in index.tablets.values() {
                assert_eq!(tablet.replicas.len(), 3);
                let meta = catalog.inverted_index().tablet_meta(tablet.id).unwrap();
                assert_eq!(meta.table_id, table_id);
                assert_eq!(meta.old_schema_hash, table.schema_hash(index.id).unwrap());
            }
        }
    }
    assert_eq!(catalog.inverted_index().len(), 8);
}

#[test]
fn test_create_table_requires_enough_backends() {
    let (catalog, log) = catalog_with_backends(2);

    let err = catalog
        .create_table("db1", &agg_def("t1"), &AlterConfig::default(), &log)
        .unwrap_err();

    assert_eq!(err.code(), "TESS-002");
    assert!(err.to_string().contains("need: 3, available: 2"));
}

#[test]
fn test_create_table_unknown_database() {
    let (catalog, log) = catalog_with_backends(3);

    let err = catalog
        .create_table("nope", &agg_def("t1"), &AlterConfig::default(), &log)
        .unwrap_err();

    assert!(matches!(err, Error::DatabaseNotFound(_)));
}

#[test]
fn test_unique_value_columns_get_implicit_replace() {
    let (catalog, log) = catalog_with_backends(1);
    let def = TableDef::new(
        "u1",
        KeysType::UniqueKeys,
        vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("v1", ColumnType::new(PrimitiveType::Int)),
        ],
    )
    .with_replication_num(1);

    let table_id = catalog
        .create_table("db1", &def, &AlterConfig::default(), &log)
        .unwrap();

    let db = catalog.db_by_name("db1").unwrap();
    let tables = db.read();
    let v1 = tables.table(table_id).unwrap().column("v1").unwrap().clone();
    assert_eq!(v1.aggregation, Some(AggregateType::Replace));
    assert!(v1.aggregation_implicit);
}

#[test]
fn test_hll_outside_agg_table_rejected() {
    let (catalog, log) = catalog_with_backends(1);
    let def = TableDef::new(
        "d1",
        KeysType::DupKeys,
        vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("h", ColumnType::hll()),
        ],
    )
    .with_replication_num(1);

    let err = catalog
        .create_table("db1", &def, &AlterConfig::default(), &log)
        .unwrap_err();

    assert!(err.to_string().contains("HLL must be used in AGG_KEYS"));
}

#[test]
fn test_replay_create_table_restores_inverted_index() {
    // Arrange
    let (catalog, log) = catalog_with_backends(3);
    catalog
        .create_table("db1", &agg_def("t1"), &AlterConfig::default(), &log)
        .unwrap();

    // Act
    let restored = Catalog::new();
    for entry in log.replay().unwrap() {
        match entry {
            EditLogEntry::CreateDatabase { db_id, name } => {
                restored.replay_create_database(db_id, &name);
            }
            EditLogEntry::AddBackend(backend) => restored.replay_add_backend(backend),
            EditLogEntry::CreateTable { db_id, table } => restored.replay_create_table(db_id, table),
            _ => {}
        }
    }

    // Assert
    assert_eq!(restored.inverted_index().len(), catalog.inverted_index().len());
    let db = restored.db_by_name("db1").unwrap();
    let table_id = db.read().table_id("t1").unwrap();
    assert!(restored.next_id() > table_id);
}

// ========================================================================
// Replica point mutations
// ========================================================================

#[test]
fn test_add_and_delete_replica() {
    // Arrange
    let (catalog, log) = catalog_with_backends(4);
    let table_id = catalog
        .create_table("db1", &agg_def("t1"), &AlterConfig::default(), &log)
        .unwrap();
    let db = catalog.db_by_name("db1").unwrap();
    let (partition_id, tablet_id, holders) = {
        let tables = db.read();
        let partition = tables.table(table_id).unwrap().partitions.values().next().unwrap();
        let tablet = partition.index(table_id).unwrap().tablets.values().next().unwrap();
        let holders: Vec<_> = tablet.replicas.iter().map(|r| r.backend_id).collect();
        (partition.id, tablet.id, holders)
    };
    let spare = catalog
        .system_info()
        .backend_ids()
        .into_iter()
        .find(|id| !holders.contains(id))
        .unwrap();
    let info = ReplicaPersistInfo {
        db_id: db.id(),
        table_id,
        partition_id,
        index_id: table_id,
        tablet_id,
        backend_id: spare,
        replica_id: catalog.next_id(),
        version: 1,
        version_hash: 0,
        data_size: 0,
        row_count: 0,
    };

    // Act
    let added = catalog.apply_add_replica(&mut db.write(), &info);
    let added_twice = catalog.apply_add_replica(&mut db.write(), &info);

    // Assert
    assert!(added);
    assert!(!added_twice);
    assert!(catalog
        .inverted_index()
        .tablets_on_backend(spare)
        .iter()
        .any(|(id, _)| *id == tablet_id));

    let removed = catalog.apply_delete_replica(&mut db.write(), &info).unwrap();
    assert_eq!(removed.backend_id, spare);
    assert!(catalog.inverted_index().tablets_on_backend(spare).is_empty());
}

#[test]
fn test_check_key_order() {
    let key = Column::new("k", ColumnType::new(PrimitiveType::Int)).key();
    let value = Column::new("v", ColumnType::new(PrimitiveType::Int)).aggregate(AggregateType::Sum);

    assert!(check_key_order(&[key.clone(), value.clone()], "t").is_ok());

    let err = check_key_order(&[value.clone(), key], "t").unwrap_err();
    assert!(err.to_string().contains("value should be after key. index[t]"));

    let err = check_key_order(&[value], "r").unwrap_err();
    assert!(err.to_string().contains("No key column left. index[r]"));
}
