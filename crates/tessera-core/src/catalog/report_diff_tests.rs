//! Tests for the tablet report diff

#[cfg(test)]
mod tests {
    use crate::catalog::{
        Catalog, Column, DistributionDef, ReportedTablet, ReportedTabletInfo, TableDef,
    };
    use crate::config::AlterConfig;
    use crate::persist::MemoryEditLog;
    use crate::types::{
        AggregateType, BackendId, ColumnType, KeysType, PrimitiveType, SchemaHash, StorageMedium,
        TabletId,
    };
    use std::collections::BTreeMap;

    struct Fixture {
        catalog: Catalog,
        backend: BackendId,
        tablets: Vec<TabletId>,
        schema_hash: SchemaHash,
    }

    fn fixture() -> Fixture {
        let catalog = Catalog::new();
        let log = MemoryEditLog::new();
        for i in 0..3 {
            catalog.add_backend(&format!("be{i}"), 9050, &log).unwrap();
        }
        catalog.create_database("db1", &log).unwrap();
        let def = TableDef::new(
            "t1",
            KeysType::AggKeys,
            vec![
                Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
                Column::new("v1", ColumnType::new(PrimitiveType::BigInt))
                    .aggregate(AggregateType::Sum),
            ],
        )
        .with_distribution(DistributionDef::Hash {
            columns: vec!["k1".to_string()],
            buckets: 2,
        });
        let table_id = catalog
            .create_table("db1", &def, &AlterConfig::default(), &log)
            .unwrap();
        let db = catalog.db_by_name("db1").unwrap();
        let schema_hash = db.read().table(table_id).unwrap().schema_hash(table_id).unwrap();
        let backend = catalog.system_info().backend_ids()[0];
        let tablets = catalog
            .inverted_index()
            .tablets_on_backend(backend)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        Fixture {
            catalog,
            backend,
            tablets,
            schema_hash,
        }
    }

    fn info(schema_hash: SchemaHash, version: i64, version_hash: i64) -> ReportedTabletInfo {
        ReportedTabletInfo {
            schema_hash,
            version,
            version_hash,
            row_count: 10,
            data_size: 100,
            storage_medium: None,
        }
    }

    fn report(entries: &[(TabletId, ReportedTabletInfo)]) -> BTreeMap<TabletId, ReportedTablet> {
        let mut out: BTreeMap<TabletId, ReportedTablet> = BTreeMap::new();
        for (tablet_id, info) in entries {
            out.entry(*tablet_id).or_default().infos.push(info.clone());
        }
        out
    }

    #[test]
    fn test_matching_report_is_clean() {
        let f = fixture();
        let reported = report(&[
            (f.tablets[0], info(f.schema_hash, 1, 0)),
            (f.tablets[1], info(f.schema_hash, 1, 0)),
        ]);

        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        assert!(diff.sync.is_empty());
        assert!(diff.delete_from_meta.is_empty());
        assert!(diff.found_invalid.is_empty());
        assert!(diff.unknown.is_empty());
        assert_eq!(diff.found_valid.len(), 2);
    }

    #[test]
    fn test_newer_version_needs_sync() {
        // Arrange
        let f = fixture();
        let reported = report(&[
            (f.tablets[0], info(f.schema_hash, 2, 7)),
            (f.tablets[1], info(f.schema_hash, 1, 9)),
        ]);

        // Act
        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        // Assert: newer version and equal version with another hash both sync
        let synced: Vec<_> = diff.sync.values().flatten().copied().collect();
        assert_eq!(synced, vec![f.tablets[0], f.tablets[1]]);
    }

    #[test]
    fn test_missing_tablet_is_delete_from_meta() {
        let f = fixture();
        let reported = report(&[(f.tablets[0], info(f.schema_hash, 1, 0))]);

        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        let missing: Vec<_> = diff.delete_from_meta.values().flatten().copied().collect();
        assert_eq!(missing, vec![f.tablets[1]]);
    }

    #[test]
    fn test_unrecognised_schema_hash_is_invalid() {
        let f = fixture();
        let bogus = f.schema_hash.wrapping_add(1);
        let reported = report(&[
            (f.tablets[0], info(f.schema_hash, 1, 0)),
            (f.tablets[0], info(bogus, 1, 0)),
            (f.tablets[1], info(f.schema_hash, 1, 0)),
        ]);

        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        assert_eq!(diff.found_invalid.get(&f.tablets[0]), Some(&vec![bogus]));
        assert!(diff.found_valid.contains(&f.tablets[0]));
    }

    #[test]
    fn test_unknown_and_migration() {
        // Arrange
        let f = fixture();
        let mut on_ssd = info(f.schema_hash, 1, 0);
        on_ssd.storage_medium = Some(StorageMedium::Ssd);
        let reported = report(&[
            (f.tablets[0], on_ssd),
            (f.tablets[1], info(f.schema_hash, 1, 0)),
            (999_999, info(f.schema_hash, 1, 0)),
        ]);

        // Act
        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        // Assert
        assert_eq!(diff.unknown, vec![999_999]);
        assert_eq!(diff.migration, vec![(f.tablets[0], StorageMedium::Hdd)]);
    }

    #[test]
    fn test_pending_schema_hash_is_valid() {
        let f = fixture();
        let meta = f.catalog.inverted_index().tablet_meta(f.tablets[0]).unwrap();
        f.catalog
            .inverted_index()
            .set_new_schema_hash(meta.partition_id, meta.index_id, 4242);
        let reported = report(&[
            (f.tablets[0], info(f.schema_hash, 1, 0)),
            (f.tablets[0], info(4242, 1, 0)),
            (f.tablets[1], info(f.schema_hash, 1, 0)),
        ]);

        let diff = f.catalog.diff_tablet_report(f.backend, &reported);

        assert!(diff.found_invalid.is_empty());
    }
}
