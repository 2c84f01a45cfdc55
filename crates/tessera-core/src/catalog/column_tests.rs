//! Tests for column compatibility rules

#[cfg(test)]
mod tests {
    use crate::catalog::Column;
    use crate::types::{AggregateType, ColumnType, PrimitiveType};

    fn int_col(name: &str, ty: PrimitiveType) -> Column {
        Column::new(name, ColumnType::new(ty)).aggregate(AggregateType::Sum)
    }

    #[test]
    fn test_name_is_case_insensitive() {
        let col = Column::new("UserId", ColumnType::new(PrimitiveType::BigInt));
        assert!(col.name_is("userid"));
        assert!(col.name_is("USERID"));
        assert!(!col.name_is("user_id"));
    }

    #[test]
    fn test_integer_widening_allowed() {
        let old = int_col("v", PrimitiveType::SmallInt);
        let new = int_col("v", PrimitiveType::BigInt);

        assert!(old.check_schema_change_allowed(&new).is_ok());
    }

    #[test]
    fn test_integer_narrowing_rejected() {
        let old = int_col("v", PrimitiveType::BigInt);
        let new = int_col("v", PrimitiveType::Int);

        let err = old.check_schema_change_allowed(&new).unwrap_err();
        assert!(err.contains("column[v]"));
    }

    #[test]
    fn test_float_to_double_and_date_to_datetime() {
        let f = int_col("f", PrimitiveType::Float);
        let d = int_col("f", PrimitiveType::Double);
        assert!(f.check_schema_change_allowed(&d).is_ok());
        assert!(d.check_schema_change_allowed(&f).is_err());

        let date = Column::new("d", ColumnType::new(PrimitiveType::Date)).key();
        let datetime = Column::new("d", ColumnType::new(PrimitiveType::DateTime)).key();
        assert!(date.check_schema_change_allowed(&datetime).is_ok());
    }

    #[test]
    fn test_string_length_only_grows() {
        let old = Column::new("s", ColumnType::varchar(32)).key();
        let longer = Column::new("s", ColumnType::varchar(64)).key();
        let shorter = Column::new("s", ColumnType::varchar(16)).key();
        let from_char = Column::new("s", ColumnType::char(10)).key();

        assert!(old.check_schema_change_allowed(&longer).is_ok());
        assert!(old.check_schema_change_allowed(&shorter).is_err());
        assert!(from_char.check_schema_change_allowed(&old).is_ok());
        assert!(old.check_schema_change_allowed(&from_char).is_err());
    }

    #[test]
    fn test_decimal_precision_rules() {
        let old = Column::new("m", ColumnType::decimal(10, 2)).aggregate(AggregateType::Sum);
        let wider = Column::new("m", ColumnType::decimal(12, 4)).aggregate(AggregateType::Sum);
        let lossy = Column::new("m", ColumnType::decimal(12, 1)).aggregate(AggregateType::Sum);

        assert!(old.check_schema_change_allowed(&wider).is_ok());
        assert!(old.check_schema_change_allowed(&lossy).is_err());
    }

    #[test]
    fn test_aggregation_change_rejected() {
        let old = int_col("v", PrimitiveType::Int);
        let new = Column::new("v", ColumnType::new(PrimitiveType::Int)).aggregate(AggregateType::Max);

        let err = old.check_schema_change_allowed(&new).unwrap_err();
        assert!(err.contains("aggregation"));
    }

    #[test]
    fn test_nullable_to_not_null_rejected() {
        let old = int_col("v", PrimitiveType::Int).nullable();
        let new = int_col("v", PrimitiveType::Int);

        assert!(old.check_schema_change_allowed(&new).is_err());
        assert!(new.check_schema_change_allowed(&old).is_ok());
    }

    #[test]
    fn test_default_value_change_rejected() {
        let old = int_col("v", PrimitiveType::Int).with_default("0");
        let new = int_col("v", PrimitiveType::Int).with_default("1");

        assert!(old.check_schema_change_allowed(&new).is_err());
    }

    #[test]
    fn test_mem_layout_bytes() {
        assert_eq!(Column::new("a", ColumnType::new(PrimitiveType::Int)).mem_layout_bytes(), 4);
        assert_eq!(Column::new("b", ColumnType::char(20)).mem_layout_bytes(), 20);
        assert_eq!(Column::new("c", ColumnType::varchar(20)).mem_layout_bytes(), 22);
    }
}
