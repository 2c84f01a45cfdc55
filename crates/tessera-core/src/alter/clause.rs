//! Alter table clauses as handed over by the statement analyzer.

use std::collections::BTreeMap;

use crate::catalog::Column;

/// Where an added or modified column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPosition {
    /// Before every other column.
    First,
    /// Right after the named column.
    After(String),
}

/// The structural part of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterOp {
    /// `ADD COLUMN col [FIRST | AFTER c] [TO rollup]`
    AddColumn {
        /// New column.
        column: Column,
        /// Requested position.
        position: Option<ColumnPosition>,
        /// Target rollup.
        rollup: Option<String>,
    },
    /// `ADD COLUMN (c1, c2, ...) [TO rollup]`
    AddColumns {
        /// New columns in order.
        columns: Vec<Column>,
        /// Target rollup.
        rollup: Option<String>,
    },
    /// `DROP COLUMN c [FROM rollup]`
    DropColumn {
        /// Column name.
        name: String,
        /// Target rollup.
        rollup: Option<String>,
    },
    /// `MODIFY COLUMN col [FIRST | AFTER c] [FROM rollup]`
    ModifyColumn {
        /// New definition; the name selects the column.
        column: Column,
        /// Requested position.
        position: Option<ColumnPosition>,
        /// Index used to locate and move the column.
        rollup: Option<String>,
    },
    /// `ORDER BY (c1, c2, ...) [FROM rollup]`
    ReorderColumns {
        /// Complete new ordering.
        columns: Vec<String>,
        /// Target rollup.
        rollup: Option<String>,
    },
    /// `SET ("k" = "v", ...)`
    ModifyTableProperties,
}

/// One clause of an `ALTER TABLE` statement with its optional properties.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterClause {
    /// Structural change.
    pub op: AlterOp,
    /// `PROPERTIES (...)` attached to the clause. At most one clause per
    /// statement may carry properties.
    pub properties: Option<BTreeMap<String, String>>,
}

impl AlterClause {
    fn new(op: AlterOp) -> Self {
        Self {
            op,
            properties: None,
        }
    }

    /// Adds one column to the base index.
    #[must_use]
    pub fn add_column(column: Column) -> Self {
        Self::new(AlterOp::AddColumn {
            column,
            position: None,
            rollup: None,
        })
    }

    /// Adds several columns at their default positions.
    #[must_use]
    pub fn add_columns(columns: Vec<Column>) -> Self {
        Self::new(AlterOp::AddColumns {
            columns,
            rollup: None,
        })
    }

    /// Drops a column from the base index and every rollup.
    #[must_use]
    pub fn drop_column(name: impl Into<String>) -> Self {
        Self::new(AlterOp::DropColumn {
            name: name.into(),
            rollup: None,
        })
    }

    /// Redefines a column.
    #[must_use]
    pub fn modify_column(column: Column) -> Self {
        Self::new(AlterOp::ModifyColumn {
            column,
            position: None,
            rollup: None,
        })
    }

    /// Replaces the column order of the base index.
    #[must_use]
    pub fn reorder_columns(columns: &[&str]) -> Self {
        Self::new(AlterOp::ReorderColumns {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rollup: None,
        })
    }

    /// Changes table properties only.
    #[must_use]
    pub fn modify_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(AlterOp::ModifyTableProperties).with_properties(properties)
    }

    /// Places the column after `name`. Ignored by clauses without a position.
    #[must_use]
    pub fn after(self, name: impl Into<String>) -> Self {
        self.with_position(ColumnPosition::After(name.into()))
    }

    /// Places the column first. Ignored by clauses without a position.
    #[must_use]
    pub fn first(self) -> Self {
        self.with_position(ColumnPosition::First)
    }

    fn with_position(mut self, pos: ColumnPosition) -> Self {
        if let AlterOp::AddColumn { position, .. } | AlterOp::ModifyColumn { position, .. } =
            &mut self.op
        {
            *position = Some(pos);
        }
        self
    }

    /// Targets a rollup instead of the base index.
    #[must_use]
    pub fn rollup(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match &mut self.op {
            AlterOp::AddColumn { rollup, .. }
            | AlterOp::AddColumns { rollup, .. }
            | AlterOp::DropColumn { rollup, .. }
            | AlterOp::ModifyColumn { rollup, .. }
            | AlterOp::ReorderColumns { rollup, .. } => *rollup = Some(name),
            AlterOp::ModifyTableProperties => {}
        }
        self
    }

    /// Attaches properties.
    #[must_use]
    pub fn with_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties = Some(
            properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}
