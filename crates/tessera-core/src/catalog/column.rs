//! Column definition and schema-change compatibility rules.

use serde::{Deserialize, Serialize};

use crate::types::{AggregateType, ColumnType, PrimitiveType};

/// One column of an index schema.
///
/// Identity within an index is the name, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as declared.
    pub name: String,
    /// Type with its parameters.
    pub column_type: ColumnType,
    /// Whether the column is part of the sort key.
    pub is_key: bool,
    /// Aggregation of a value column; `None` for keys and duplicate-key values.
    pub aggregation: Option<AggregateType>,
    /// True when the aggregation was assigned by the system rather than declared.
    pub aggregation_implicit: bool,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value literal.
    pub default_value: Option<String>,
    /// Free-form comment.
    pub comment: String,
}

impl Column {
    /// A non-null value column without aggregation.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_key: false,
            aggregation: None,
            aggregation_implicit: false,
            nullable: false,
            default_value: None,
            comment: String::new(),
        }
    }

    /// Marks the column as a key column.
    #[must_use]
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    /// Sets an explicit aggregation.
    #[must_use]
    pub fn aggregate(mut self, aggregation: AggregateType) -> Self {
        self.aggregation = Some(aggregation);
        self.aggregation_implicit = false;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value literal.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Case-insensitive name comparison.
    #[must_use]
    pub fn name_is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Bytes this column contributes to the in-memory row layout.
    #[must_use]
    pub fn mem_layout_bytes(&self) -> usize {
        self.column_type.mem_layout_bytes()
    }

    /// Checks that `new` is a legal redefinition of this column.
    ///
    /// Types may only widen. Aggregation, default value and NOT NULL
    /// constraints are fixed once declared.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the change is not allowed.
    pub fn check_schema_change_allowed(&self, new: &Column) -> Result<(), String> {
        if self.aggregation != new.aggregation {
            return Err(format!(
                "Can not change aggregation type of column[{}]",
                self.name
            ));
        }

        if self.nullable && !new.nullable {
            return Err(format!(
                "Can not change column[{}] from nullable to not nullable",
                self.name
            ));
        }

        if self.default_value != new.default_value {
            return Err(format!(
                "Can not change default value of column[{}]",
                self.name
            ));
        }

        check_type_widening(&self.column_type, &new.column_type).map_err(|reason| {
            format!(
                "Can not change column[{}] from {} to {}: {}",
                self.name, self.column_type, new.column_type, reason
            )
        })
    }
}

fn check_type_widening(old: &ColumnType, new: &ColumnType) -> Result<(), &'static str> {
    use PrimitiveType as P;

    match (old.primitive, new.primitive) {
        (P::Char, P::Char) | (P::Varchar, P::Varchar) | (P::Char, P::Varchar) => {
            if new.len < old.len {
                Err("string length can not be shortened")
            } else {
                Ok(())
            }
        }
        (P::Decimal, P::Decimal) => {
            if new.precision < old.precision || new.scale < old.scale {
                Err("decimal precision and scale can only grow")
            } else {
                Ok(())
            }
        }
        (P::Float, P::Double) | (P::Date, P::DateTime) => Ok(()),
        (a, b) if a == b => Ok(()),
        (a, b) => match (a.integer_rank(), b.integer_rank()) {
            (Some(from), Some(to)) if to >= from => Ok(()),
            _ => Err("incompatible type"),
        },
    }
}
