//! Table properties that ride along with an alter statement: per-index
//! short key overrides and the bloom filter configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{BloomFilterInfo, Column, OlapTable};
use crate::error::{Error, Result};
use crate::types::{IndexId, KeysType, PrimitiveType};

/// Suffix of the per-index short key property, `"<index>#short_key"`.
pub const PROPERTIES_SHORT_KEY: &str = "short_key";
/// Comma separated bloom filter column list.
pub const PROPERTIES_BF_COLUMNS: &str = "bloom_filter_columns";
/// Bloom filter false-positive probability.
pub const PROPERTIES_BF_FPP: &str = "bloom_filter_fpp";

/// Smallest accepted bloom filter fpp.
pub const MIN_FPP: f64 = 0.0001;
/// Largest accepted bloom filter fpp.
pub const MAX_FPP: f64 = 0.05;

/// Outcome of comparing the requested bloom filter with the table's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterChange {
    /// True if the statement changes the bloom filter configuration.
    pub has_change: bool,
    /// Configuration in effect after the change; `None` removes it.
    pub info: Option<BloomFilterInfo>,
}

impl BloomFilterChange {
    /// Membership of `column` in the new configuration.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.info.as_ref().is_some_and(|bf| bf.columns.contains(column))
    }
}

/// Parses `"<index>#short_key" = "N"` entries into index id → count.
///
/// # Errors
///
/// Rejects malformed keys, unknown indexes and non-numeric counts.
pub fn short_key_overrides(
    table: &OlapTable,
    properties: &BTreeMap<String, String>,
) -> Result<BTreeMap<IndexId, u16>> {
    let mut out = BTreeMap::new();
    for (key, value) in properties {
        if !key.ends_with(PROPERTIES_SHORT_KEY) {
            continue;
        }
        let parts: Vec<&str> = key.split('#').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1] != PROPERTIES_SHORT_KEY {
            return Err(Error::Validation(format!(
                "Invalid alter table property: {key}"
            )));
        }
        let index_id = table
            .index_id_by_name(parts[0])
            .ok_or_else(|| Error::IndexNotFound(parts[0].to_string()))?;
        let count = value
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Validation(format!("Invalid short key: {value}")))?;
        out.insert(index_id, count);
    }
    Ok(out)
}

/// Parses `bloom_filter_columns` against the base schema.
///
/// Returns `None` when the property is absent and an empty set when it is
/// present but blank, which removes the bloom filter. Stored names use the
/// column's declared spelling.
///
/// # Errors
///
/// Rejects unknown or duplicated columns, unsupported types, and value
/// columns of tables that are not duplicate-key.
pub fn analyze_bloom_filter_columns(
    properties: &BTreeMap<String, String>,
    base_schema: &[Column],
    keys_type: KeysType,
) -> Result<Option<BTreeSet<String>>> {
    let Some(value) = properties.get(PROPERTIES_BF_COLUMNS) else {
        return Ok(None);
    };

    let mut columns = BTreeSet::new();
    let mut seen = BTreeSet::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let column = base_schema.iter().find(|c| c.name_is(name)).ok_or_else(|| {
            Error::Validation(format!(
                "Bloom filter column does not exist in table. invalid column: {name}"
            ))
        })?;

        let primitive = column.column_type.primitive;
        if matches!(
            primitive,
            PrimitiveType::TinyInt | PrimitiveType::Float | PrimitiveType::Double | PrimitiveType::Hll
        ) {
            return Err(Error::Validation(format!(
                "{primitive} is not supported in bloom filter index. invalid column: {name}"
            )));
        }
        if keys_type != KeysType::DupKeys && !column.is_key {
            return Err(Error::Validation(format!(
                "Bloom filter index only used in columns of DUP_KEYS table or key columns. \
                 invalid column: {name}"
            )));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "Reduplicated bloom filter column: {name}"
            )));
        }
        columns.insert(column.name.clone());
    }
    Ok(Some(columns))
}

/// Parses `bloom_filter_fpp`; `None` when absent.
///
/// # Errors
///
/// Rejects unparsable values and values outside `[MIN_FPP, MAX_FPP]`.
pub fn analyze_bloom_filter_fpp(properties: &BTreeMap<String, String>) -> Result<Option<f64>> {
    let Some(value) = properties.get(PROPERTIES_BF_FPP) else {
        return Ok(None);
    };
    let fpp: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid bloom filter fpp: {value}")))?;
    if !(MIN_FPP..=MAX_FPP).contains(&fpp) {
        return Err(Error::Validation(format!(
            "Bloom filter fpp should in [{MIN_FPP}, {MAX_FPP}]"
        )));
    }
    Ok(Some(fpp))
}

/// Combines the requested columns and fpp with the table's current
/// configuration.
///
/// | columns | fpp | result |
/// |---------|-----|--------|
/// | given   | -   | change unless equal; fpp kept or defaulted |
/// | given   | given | change unless both equal |
/// | -       | -   | unchanged |
/// | -       | given | change unless equal or no columns configured |
///
/// # Errors
///
/// Returns [`Error::NothingChanged`] for a bloom-filter-only no-op.
#[allow(clippy::float_cmp)]
pub fn resolve_bloom_filter_change(
    columns: Option<BTreeSet<String>>,
    fpp: Option<f64>,
    original: Option<&BloomFilterInfo>,
    default_fpp: f64,
) -> Result<BloomFilterChange> {
    let no_change = || Error::NothingChanged("Bloom filter index has no change".to_string());
    let original_columns = original.map(|bf| &bf.columns);
    let original_fpp = original.map(|bf| bf.fpp);

    let (has_change, columns, fpp) = match (columns, fpp) {
        (Some(columns), None) => {
            if Some(&columns) == original_columns {
                return Err(no_change());
            }
            let fpp = original_fpp.unwrap_or(default_fpp);
            (true, Some(columns), fpp)
        }
        (Some(columns), Some(fpp)) => {
            if Some(&columns) == original_columns && Some(fpp) == original_fpp {
                return Err(no_change());
            }
            (true, Some(columns), fpp)
        }
        (None, None) => (false, original_columns.cloned(), original_fpp.unwrap_or(0.0)),
        (None, Some(fpp)) => {
            if Some(fpp) == original_fpp || original_columns.is_none() {
                return Err(no_change());
            }
            (true, original_columns.cloned(), fpp)
        }
    };

    let info = columns
        .filter(|columns| !columns.is_empty())
        .map(|columns| BloomFilterInfo { columns, fpp });
    Ok(BloomFilterChange { has_change, info })
}
