//! Schema fingerprints and short-key computation.

use crc32fast::Hasher;

use super::{BloomFilterInfo, Column};
use crate::error::{Error, Result};
use crate::types::{PrimitiveType, SchemaHash};

/// Fingerprint of (version, columns, bloom filter configuration).
///
/// Always non-negative when read as an `i32`, so backends that store the
/// hash as a signed integer see the same value.
#[must_use]
pub fn schema_hash(
    schema_version: i32,
    columns: &[Column],
    bloom_filter: Option<&BloomFilterInfo>,
) -> SchemaHash {
    let mut hasher = Hasher::new();
    hasher.update(&schema_version.to_le_bytes());
    for column in columns {
        hasher.update(column.name.to_ascii_lowercase().as_bytes());
        hasher.update(column.column_type.to_string().as_bytes());
        hasher.update(&[u8::from(column.is_key), u8::from(column.nullable)]);
        if let Some(aggregation) = column.aggregation {
            hasher.update(aggregation.as_str().as_bytes());
        }
    }
    if let Some(bf) = bloom_filter {
        for name in &bf.columns {
            hasher.update(name.to_ascii_lowercase().as_bytes());
        }
        hasher.update(&bf.fpp.to_bits().to_le_bytes());
    }
    hasher.finalize() & 0x7fff_ffff
}

/// Number of leading key columns that form the short key of an index.
///
/// With an explicit `requested` count the value must lie within
/// `1..=key column count`. Otherwise leading keys are taken until
/// `max_columns` is reached, the accumulated width exceeds `max_bytes`
/// (a CHAR column crossing the limit still counts), or a VARCHAR key is
/// met (it counts and ends the prefix).
///
/// # Errors
///
/// Returns [`Error::Validation`] if the schema has no leading key column or
/// the requested count is out of range.
pub fn short_key_column_count(
    columns: &[Column],
    requested: Option<u16>,
    max_columns: u16,
    max_bytes: usize,
) -> Result<u16> {
    let key_count = columns.iter().take_while(|c| c.is_key).count();
    if key_count == 0 {
        return Err(Error::Validation(
            "First column should be key column".to_string(),
        ));
    }

    if let Some(count) = requested {
        if count == 0 {
            return Err(Error::Validation(
                "Short key column count should larger than 0".to_string(),
            ));
        }
        if usize::from(count) > key_count {
            return Err(Error::Validation(format!(
                "Short key is too large. should less than: {key_count}"
            )));
        }
        return Ok(count);
    }

    let mut count: u16 = 0;
    let mut size_bytes = 0usize;
    for column in columns.iter().take(key_count) {
        if column.column_type.primitive == PrimitiveType::Varchar {
            count += 1;
            break;
        }
        size_bytes += column.mem_layout_bytes();
        if size_bytes > max_bytes {
            if column.column_type.primitive == PrimitiveType::Char {
                count += 1;
            }
            break;
        }
        count += 1;
        if count >= max_columns {
            break;
        }
    }

    // a wide first key still anchors the short key
    Ok(count.max(1))
}
