//! Applies alter clauses to a working copy of every index's column list.
//!
//! Nothing here touches the live table. Each clause either rewrites the
//! working copy or fails, and a failure discards the whole statement.

use std::collections::{BTreeMap, BTreeSet};

use super::clause::{AlterClause, AlterOp, ColumnPosition};
use crate::catalog::{Column, OlapTable};
use crate::error::{Error, Result};
use crate::types::{AggregateType, IndexId, KeysType, PrimitiveType};

/// Column lists and merged properties of a statement that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMutation {
    /// Proposed column list per index, one entry for every index of the table.
    pub schemas: BTreeMap<IndexId, Vec<Column>>,
    /// Properties carried by the statement.
    pub properties: BTreeMap<String, String>,
}

/// Working copy of a table's index schemas.
#[derive(Debug)]
pub struct SchemaMutator<'a> {
    table: &'a OlapTable,
    max_row_bytes: usize,
    schemas: BTreeMap<IndexId, Vec<Column>>,
    properties: BTreeMap<String, String>,
}

impl<'a> SchemaMutator<'a> {
    /// Starts from the table's current schemas.
    #[must_use]
    pub fn new(table: &'a OlapTable, max_row_bytes: usize) -> Self {
        let schemas = table
            .indexes
            .iter()
            .map(|(id, index)| (*id, index.columns.clone()))
            .collect();
        Self {
            table,
            max_row_bytes,
            schemas,
            properties: BTreeMap::new(),
        }
    }

    /// Applies every clause in order.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn apply_all(
        table: &'a OlapTable,
        clauses: &[AlterClause],
        max_row_bytes: usize,
    ) -> Result<ValidatedMutation> {
        let mut mutator = Self::new(table, max_row_bytes);
        for clause in clauses {
            mutator.apply(clause)?;
        }
        Ok(mutator.finish())
    }

    /// Current working schema of an index.
    #[must_use]
    pub fn schema(&self, index_id: IndexId) -> Option<&[Column]> {
        self.schemas.get(&index_id).map(Vec::as_slice)
    }

    /// Consumes the mutator.
    #[must_use]
    pub fn finish(self) -> ValidatedMutation {
        ValidatedMutation {
            schemas: self.schemas,
            properties: self.properties,
        }
    }

    /// Applies one clause.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`], [`Error::IndexNotFound`] on an unknown
    /// rollup, or an error if a second clause carries properties.
    pub fn apply(&mut self, clause: &AlterClause) -> Result<()> {
        if let Some(properties) = &clause.properties {
            if !self.properties.is_empty() {
                return Err(Error::Validation("reduplicated PROPERTIES".into()));
            }
            self.properties
                .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        match &clause.op {
            AlterOp::AddColumn {
                column,
                position,
                rollup,
            } => self.add_column(column, position.as_ref(), rollup.as_deref()),
            AlterOp::AddColumns { columns, rollup } => self.add_columns(columns, rollup.as_deref()),
            AlterOp::DropColumn { name, rollup } => self.drop_column(name, rollup.as_deref()),
            AlterOp::ModifyColumn {
                column,
                position,
                rollup,
            } => self.modify_column(column, position.as_ref(), rollup.as_deref()),
            AlterOp::ReorderColumns { columns, rollup } => {
                self.reorder_columns(columns, rollup.as_deref())
            }
            AlterOp::ModifyTableProperties => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn add_column(
        &mut self,
        column: &Column,
        position: Option<&ColumnPosition>,
        rollup: Option<&str>,
    ) -> Result<()> {
        self.check_index_exists(rollup)?;
        let column = resolve_key_attributes(self.table.keys_type, column)?;
        if column.is_key {
            self.check_key_modification()?;
        }
        let target = self.resolve_target(rollup)?;
        self.add_column_internal(column, position, target)
    }

    fn add_columns(&mut self, columns: &[Column], rollup: Option<&str>) -> Result<()> {
        self.check_index_exists(rollup)?;
        let columns = columns
            .iter()
            .map(|c| resolve_key_attributes(self.table.keys_type, c))
            .collect::<Result<Vec<_>>>()?;
        if columns.iter().any(|c| c.is_key) {
            self.check_key_modification()?;
        }
        let target = self.resolve_target(rollup)?;
        for column in columns {
            self.add_column_internal(column, None, target)?;
        }
        Ok(())
    }

    fn drop_column(&mut self, name: &str, rollup: Option<&str>) -> Result<()> {
        self.check_index_exists(rollup)?;
        if self.table.column(name).is_some_and(|c| c.is_key) {
            self.check_key_modification()?;
        }
        let target = self.resolve_target(rollup)?;
        let base_id = self.table.base_index_id;

        match self.table.keys_type {
            KeysType::UniqueKeys => {
                if self.working(base_id)?.iter().any(|c| c.is_key && c.name_is(name)) {
                    return Err(Error::Validation(format!(
                        "key column[{name}] of unique key table cannot be dropped"
                    )));
                }
            }
            KeysType::AggKeys => {
                let schema = self.working(target.unwrap_or(base_id))?;
                let is_key = schema.iter().any(|c| c.is_key && c.name_is(name));
                let has_replace = schema.iter().any(|c| {
                    !(c.is_key && c.name_is(name)) && c.aggregation == Some(AggregateType::Replace)
                });
                if is_key && has_replace {
                    return Err(Error::Validation(format!(
                        "key column[{name}] of table with replace aggregation method \
                         cannot be dropped"
                    )));
                }
            }
            KeysType::DupKeys => {}
        }

        let not_found = || Error::Validation(format!("Column[{name}] does not exists"));
        if let Some(target_id) = target {
            if !remove_named(self.working_mut(target_id)?, name) {
                return Err(not_found());
            }
            return Ok(());
        }

        if !remove_named(self.working_mut(base_id)?, name) {
            return Err(not_found());
        }
        for (index_id, schema) in &mut self.schemas {
            if *index_id != base_id {
                remove_named(schema, name);
            }
        }
        Ok(())
    }

    fn modify_column(
        &mut self,
        column: &Column,
        position: Option<&ColumnPosition>,
        rollup: Option<&str>,
    ) -> Result<()> {
        let mut column = resolve_key_attributes(self.table.keys_type, column)?;
        self.check_index_exists(rollup)?;
        if column.is_key {
            self.check_key_modification()?;
        }
        let target = self.resolve_target(rollup)?;
        if target.is_some() && position.is_none() {
            return Err(Error::Validation(
                "Do not need to specify index name when just modifying column type".into(),
            ));
        }

        let find_id = target.unwrap_or(self.table.base_index_id);
        let schema = self.working_mut(find_id)?;

        let mod_idx = schema
            .iter()
            .position(|c| c.name_is(&column.name))
            .ok_or_else(|| Error::Validation(format!("Column[{}] does not exists", column.name)))?;

        let last_idx: Option<isize> = match position {
            None => None,
            Some(ColumnPosition::First) => Some(-1),
            Some(ColumnPosition::After(after)) => {
                let idx = schema.iter().position(|c| c.name_is(after)).ok_or_else(|| {
                    Error::Validation(format!("Column[{after}] does not exists"))
                })?;
                Some(idx as isize)
            }
        };

        let original = schema[mod_idx].clone();
        column.name.clone_from(&original.name);

        match last_idx {
            None => schema[mod_idx] = column.clone(),
            Some(last) => {
                let insert_at = (last + 1) as usize;
                let mod_pos = mod_idx as isize;
                if last > mod_pos {
                    schema.insert(insert_at, column.clone());
                    schema.remove(mod_idx);
                } else if last < mod_pos {
                    schema.remove(mod_idx);
                    schema.insert(insert_at, column.clone());
                } else {
                    let after = match position {
                        Some(ColumnPosition::After(after)) => after.as_str(),
                        _ => "",
                    };
                    return Err(Error::Validation(format!(
                        "Column[{after}] modify position is invalid"
                    )));
                }
            }
        }

        if column == original {
            return Ok(());
        }

        // same definition everywhere, each index keeps its own key-ness
        for (index_id, other_schema) in &mut self.schemas {
            if *index_id == find_id {
                continue;
            }
            let Some(slot) = other_schema.iter_mut().find(|c| c.name_is(&column.name)) else {
                continue;
            };
            let mut redefined = column.clone();
            redefined.is_key = slot.is_key;
            redefined.aggregation = if slot.is_key {
                None
            } else {
                column.aggregation.or(slot.aggregation)
            };
            redefined.aggregation_implicit = slot.aggregation_implicit;
            *slot = redefined;
        }
        Ok(())
    }

    fn reorder_columns(&mut self, names: &[String], rollup: Option<&str>) -> Result<()> {
        self.check_index_exists(rollup)?;
        if names
            .iter()
            .any(|name| self.table.column(name).is_some_and(|c| c.is_key))
        {
            self.check_key_modification()?;
        }
        let target = self.resolve_target(rollup)?;
        let index_id = target.unwrap_or(self.table.base_index_id);
        let schema = self.working(index_id)?;

        let mut reordered = Vec::with_capacity(names.len());
        let mut seen = BTreeSet::new();
        for name in names {
            let column = schema
                .iter()
                .find(|c| c.name_is(name))
                .ok_or_else(|| Error::Validation(format!("Column[{name}] not exists")))?;
            reordered.push(column.clone());
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(Error::Validation(format!("Reduplicative column[{name}]")));
            }
        }
        if reordered.len() != schema.len() {
            return Err(Error::Validation(
                "Reorder stmt should contains all columns".into(),
            ));
        }
        self.schemas.insert(index_id, reordered);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn add_column_internal(
        &mut self,
        column: Column,
        position: Option<&ColumnPosition>,
        target: Option<IndexId>,
    ) -> Result<()> {
        let keys_type = self.table.keys_type;
        if column.column_type.primitive == PrimitiveType::Hll && keys_type != KeysType::AggKeys {
            return Err(Error::Validation("HLL must be used in AGG_KEYS".into()));
        }
        if self.table.column(&column.name).is_some() {
            return Err(Error::Validation(format!(
                "Column[{}] already exists in base index[{}]",
                column.name, self.table.name
            )));
        }

        let base_id = self.table.base_index_id;
        let max = self.max_row_bytes;
        match keys_type {
            KeysType::UniqueKeys if column.is_key => {
                for schema in self.schemas.values_mut() {
                    check_and_add_column(schema, &column, position, max)?;
                }
            }
            KeysType::DupKeys => match target {
                None => check_and_add_column(self.working_mut(base_id)?, &column, position, max)?,
                Some(target_id) => {
                    check_and_add_column(self.working_mut(target_id)?, &column, position, max)?;
                    // a rollup key also becomes the last key of the base index
                    let base_position = if column.is_key { None } else { position };
                    check_and_add_column(self.working_mut(base_id)?, &column, base_position, max)?;
                }
            },
            KeysType::UniqueKeys | KeysType::AggKeys => {
                check_and_add_column(self.working_mut(base_id)?, &column, position, max)?;
                if let Some(target_id) = target {
                    check_and_add_column(self.working_mut(target_id)?, &column, position, max)?;
                }
            }
        }
        Ok(())
    }

    fn check_index_exists(&self, rollup: Option<&str>) -> Result<()> {
        match rollup {
            Some(name) if self.table.index_id_by_name(name).is_none() => {
                Err(Error::IndexNotFound(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn resolve_target(&self, rollup: Option<&str>) -> Result<Option<IndexId>> {
        let Some(name) = rollup else {
            return Ok(None);
        };
        if name == self.table.name {
            return Err(Error::Validation(format!(
                "Do not need to assign base index[{name}] to do schema change"
            )));
        }
        self.table
            .index_id_by_name(name)
            .map(Some)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    fn check_key_modification(&self) -> Result<()> {
        if self.table.has_random_distribution() {
            return Err(Error::Validation(
                "Cannot add/del/reorder/modify key column in table which is distributed by random"
                    .into(),
            ));
        }
        Ok(())
    }

    fn working(&self, index_id: IndexId) -> Result<&Vec<Column>> {
        self.schemas
            .get(&index_id)
            .ok_or_else(|| Error::Internal(format!("index {index_id} missing from working copy")))
    }

    fn working_mut(&mut self, index_id: IndexId) -> Result<&mut Vec<Column>> {
        self.schemas
            .get_mut(&index_id)
            .ok_or_else(|| Error::Internal(format!("index {index_id} missing from working copy")))
    }
}

/// Fills in key-ness and implicit aggregation from the table's key model.
///
/// An aggregate-key column without aggregation is a key. Unique-key values
/// aggregate by REPLACE, duplicate-key values not at all.
///
/// # Errors
///
/// Rejects an explicit aggregation where the key model forbids it.
pub fn resolve_key_attributes(keys_type: KeysType, column: &Column) -> Result<Column> {
    let mut column = column.clone();
    let declared_aggregation = column.aggregation.is_some() && !column.aggregation_implicit;
    match keys_type {
        KeysType::AggKeys => {
            if column.is_key && declared_aggregation {
                return Err(Error::Validation(
                    "key column of aggregate key table cannot use aggregation method".into(),
                ));
            }
            if column.aggregation.is_none() {
                column.is_key = true;
            }
        }
        KeysType::UniqueKeys => {
            if declared_aggregation {
                return Err(Error::Validation(
                    "column of unique key table cannot use aggregation method".into(),
                ));
            }
            if column.is_key {
                column.aggregation = None;
                column.aggregation_implicit = false;
            } else {
                column.aggregation = Some(AggregateType::Replace);
                column.aggregation_implicit = true;
            }
        }
        KeysType::DupKeys => {
            if declared_aggregation {
                return Err(Error::Validation(
                    "column of duplicate key table cannot use aggregation method".into(),
                ));
            }
            column.aggregation = None;
            column.aggregation_implicit = !column.is_key;
        }
    }
    Ok(column)
}

/// Inserts `column` into one index schema and re-checks the row width.
fn check_and_add_column(
    schema: &mut Vec<Column>,
    column: &Column,
    position: Option<&ColumnPosition>,
    max_row_bytes: usize,
) -> Result<()> {
    if schema.iter().any(|c| c.name_is(&column.name)) {
        return Err(Error::Validation(format!(
            "Duplicately add column[{}]",
            column.name
        )));
    }

    let insert_at = match position {
        Some(ColumnPosition::First) => 0,
        Some(ColumnPosition::After(after)) => {
            schema
                .iter()
                .position(|c| c.name_is(after))
                .ok_or_else(|| Error::Validation(format!("Column[{after}] does not found")))?
                + 1
        }
        None if column.is_key => schema.iter().rposition(|c| c.is_key).map_or(0, |i| i + 1),
        None => schema.len(),
    };
    schema.insert(insert_at, column.clone());

    check_row_length(schema, max_row_bytes)
}

fn check_row_length(schema: &[Column], max_row_bytes: usize) -> Result<()> {
    let row_bytes: usize = schema.iter().map(Column::mem_layout_bytes).sum();
    if row_bytes > max_row_bytes {
        return Err(Error::Validation(format!(
            "The size of a row ({row_bytes}) exceed the maximal row size: {max_row_bytes}"
        )));
    }
    Ok(())
}

fn remove_named(schema: &mut Vec<Column>, name: &str) -> bool {
    match schema.iter().position(|c| c.name_is(name)) {
        Some(pos) => {
            schema.remove(pos);
            true
        }
        None => false,
    }
}
