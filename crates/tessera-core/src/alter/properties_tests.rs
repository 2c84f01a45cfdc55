//! Tests for alter table properties

#[cfg(test)]
mod tests {
    use crate::alter::properties::{
        analyze_bloom_filter_columns, analyze_bloom_filter_fpp, resolve_bloom_filter_change,
        short_key_overrides,
    };
    use crate::catalog::{BloomFilterInfo, Catalog, Column, OlapTable, TableDef};
    use crate::config::AlterConfig;
    use crate::persist::MemoryEditLog;
    use crate::types::{AggregateType, ColumnType, KeysType, PrimitiveType};
    use std::collections::{BTreeMap, BTreeSet};

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn agg_columns() -> Vec<Column> {
        vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("K2", ColumnType::new(PrimitiveType::TinyInt)).key(),
            Column::new("v1", ColumnType::new(PrimitiveType::BigInt)).aggregate(AggregateType::Sum),
        ]
    }

    fn table_with_rollup() -> OlapTable {
        let catalog = Catalog::new();
        let log = MemoryEditLog::new();
        for i in 0..3 {
            catalog.add_backend(&format!("be{i}"), 9050, &log).unwrap();
        }
        catalog.create_database("db1", &log).unwrap();
        let def = TableDef::new("t", KeysType::AggKeys, agg_columns()).with_rollup("r1", &["k1", "v1"]);
        let table_id = catalog
            .create_table("db1", &def, &AlterConfig::default(), &log)
            .unwrap();
        let db = catalog.db_by_name("db1").unwrap();
        let table = db.read().table(table_id).unwrap().clone();
        table
    }

    // ========================================================================
    // Short key overrides
    // ========================================================================

    #[test]
    fn test_short_key_overrides_resolve_index_names() {
        let table = table_with_rollup();
        let rollup = table.index_id_by_name("r1").unwrap();

        let overrides =
            short_key_overrides(&table, &props(&[("r1#short_key", "1"), ("t#short_key", "2")]))
                .unwrap();

        assert_eq!(overrides[&rollup], 1);
        assert_eq!(overrides[&table.base_index_id], 2);
    }

    #[test]
    fn test_short_key_override_errors() {
        let table = table_with_rollup();

        let malformed = short_key_overrides(&table, &props(&[("short_key", "1")])).unwrap_err();
        let unknown = short_key_overrides(&table, &props(&[("r9#short_key", "1")])).unwrap_err();
        let not_a_number =
            short_key_overrides(&table, &props(&[("r1#short_key", "x")])).unwrap_err();

        assert!(malformed.to_string().contains("Invalid alter table property"));
        assert_eq!(unknown.code(), "TESS-008");
        assert!(not_a_number.to_string().contains("Invalid short key: x"));
    }

    // ========================================================================
    // Bloom filter columns and fpp
    // ========================================================================

    #[test]
    fn test_bloom_filter_columns_keep_declared_spelling() {
        let columns = agg_columns();

        let parsed =
            analyze_bloom_filter_columns(&props(&[("bloom_filter_columns", " K1 ")]), &columns, KeysType::AggKeys)
                .unwrap();

        assert_eq!(parsed, Some(set(&["k1"])));
        assert_eq!(
            analyze_bloom_filter_columns(&BTreeMap::new(), &columns, KeysType::AggKeys).unwrap(),
            None
        );
    }

    #[test]
    fn test_bloom_filter_column_rules() {
        let columns = agg_columns();
        let check = |value: &str| {
            analyze_bloom_filter_columns(
                &props(&[("bloom_filter_columns", value)]),
                &columns,
                KeysType::AggKeys,
            )
            .unwrap_err()
            .to_string()
        };

        assert!(check("nope").contains("does not exist in table"));
        assert!(check("K2").contains("TINYINT is not supported"));
        assert!(check("v1").contains("DUP_KEYS table or key columns"));
        assert!(check("k1,K1").contains("Reduplicated bloom filter column"));
    }

    #[test]
    fn test_bloom_filter_value_column_allowed_in_dup_table() {
        let columns = vec![
            Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
            Column::new("v1", ColumnType::varchar(10)),
        ];

        let parsed = analyze_bloom_filter_columns(
            &props(&[("bloom_filter_columns", "v1")]),
            &columns,
            KeysType::DupKeys,
        )
        .unwrap();

        assert_eq!(parsed, Some(set(&["v1"])));
    }

    #[test]
    fn test_bloom_filter_fpp_range() {
        assert_eq!(
            analyze_bloom_filter_fpp(&props(&[("bloom_filter_fpp", "0.01")])).unwrap(),
            Some(0.01)
        );
        assert!(analyze_bloom_filter_fpp(&props(&[("bloom_filter_fpp", "0.5")])).is_err());
        assert!(analyze_bloom_filter_fpp(&props(&[("bloom_filter_fpp", "abc")])).is_err());
        assert_eq!(analyze_bloom_filter_fpp(&BTreeMap::new()).unwrap(), None);
    }

    // ========================================================================
    // Change detection
    // ========================================================================

    #[test]
    fn test_same_columns_is_no_change() {
        let original = BloomFilterInfo {
            columns: set(&["k1"]),
            fpp: 0.05,
        };

        let err = resolve_bloom_filter_change(Some(set(&["k1"])), None, Some(&original), 0.05)
            .unwrap_err();

        assert_eq!(err.code(), "TESS-003");
    }

    #[test]
    fn test_new_columns_default_fpp() {
        let change = resolve_bloom_filter_change(Some(set(&["k1"])), None, None, 0.05).unwrap();

        assert!(change.has_change);
        assert!(change.contains("k1"));
        assert_eq!(change.info.unwrap().fpp, 0.05);
    }

    #[test]
    fn test_fpp_only_requires_existing_columns() {
        let original = BloomFilterInfo {
            columns: set(&["k1"]),
            fpp: 0.05,
        };

        let without = resolve_bloom_filter_change(None, Some(0.01), None, 0.05);
        let same = resolve_bloom_filter_change(None, Some(0.05), Some(&original), 0.05);
        let changed = resolve_bloom_filter_change(None, Some(0.01), Some(&original), 0.05).unwrap();

        assert!(without.is_err());
        assert!(same.is_err());
        assert!(changed.has_change);
        assert_eq!(changed.info.unwrap().fpp, 0.01);
    }

    #[test]
    fn test_empty_column_list_removes_bloom_filter() {
        let original = BloomFilterInfo {
            columns: set(&["k1"]),
            fpp: 0.05,
        };

        let change = resolve_bloom_filter_change(Some(BTreeSet::new()), None, Some(&original), 0.05)
            .unwrap();

        assert!(change.has_change);
        assert!(change.info.is_none());
    }

    #[test]
    fn test_absent_properties_keep_original() {
        let original = BloomFilterInfo {
            columns: set(&["k1"]),
            fpp: 0.02,
        };

        let change = resolve_bloom_filter_change(None, None, Some(&original), 0.05).unwrap();

        assert!(!change.has_change);
        assert_eq!(change.info, Some(original));
    }
}
