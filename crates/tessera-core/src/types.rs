//! Core identifiers and enumerations shared by the catalog, alter jobs and
//! report reconciliation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database identifier.
pub type DbId = u64;
/// Table identifier.
pub type TableId = u64;
/// Partition identifier.
pub type PartitionId = u64;
/// Materialized index identifier. The base index shares its table's id.
pub type IndexId = u64;
/// Tablet identifier.
pub type TabletId = u64;
/// Replica identifier.
pub type ReplicaId = u64;
/// Backend (storage node) identifier.
pub type BackendId = u64;
/// Alter job identifier.
pub type JobId = u64;
/// Fingerprint of one physical column layout of an index.
pub type SchemaHash = u32;
/// Data version of a tablet replica.
pub type Version = i64;
/// Hash accompanying a data version.
pub type VersionHash = i64;

macro_rules! display_as_str {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// How rows sharing the same key are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeysType {
    /// Value columns aggregate with an explicit aggregation type.
    AggKeys,
    /// The latest row for a key wins; value columns aggregate by REPLACE.
    UniqueKeys,
    /// Rows are kept as inserted; no column aggregates.
    DupKeys,
}

impl KeysType {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AggKeys => "AGG_KEYS",
            Self::UniqueKeys => "UNIQUE_KEYS",
            Self::DupKeys => "DUP_KEYS",
        }
    }
}

display_as_str!(KeysType);

/// Aggregation applied to a value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    /// Sum of values.
    Sum,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Last written value.
    Replace,
    /// HyperLogLog union.
    HllUnion,
}

impl AggregateType {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Replace => "REPLACE",
            Self::HllUnion => "HLL_UNION",
        }
    }
}

display_as_str!(AggregateType);

/// Scalar column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// 1-byte integer.
    TinyInt,
    /// 2-byte integer.
    SmallInt,
    /// 4-byte integer.
    Int,
    /// 8-byte integer.
    BigInt,
    /// 16-byte integer.
    LargeInt,
    /// 4-byte float.
    Float,
    /// 8-byte float.
    Double,
    /// Fixed-point decimal.
    Decimal,
    /// Calendar date.
    Date,
    /// Date and time of day.
    DateTime,
    /// Fixed-length string.
    Char,
    /// Variable-length string.
    Varchar,
    /// HyperLogLog sketch.
    Hll,
}

impl PrimitiveType {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::LargeInt => "LARGEINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Hll => "HLL",
        }
    }

    /// Position in the integer widening chain, `None` for non-integers.
    #[must_use]
    pub const fn integer_rank(&self) -> Option<u8> {
        match self {
            Self::TinyInt => Some(0),
            Self::SmallInt => Some(1),
            Self::Int => Some(2),
            Self::BigInt => Some(3),
            Self::LargeInt => Some(4),
            _ => None,
        }
    }

    /// True for types whose width is carried by `ColumnType::len`.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::Hll)
    }
}

display_as_str!(PrimitiveType);

/// Default declared length of an HLL column.
pub const HLL_DEFAULT_LEN: u32 = 16385;

/// A column type with its length or precision parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// Scalar type.
    pub primitive: PrimitiveType,
    /// Declared length for CHAR, VARCHAR and HLL; zero otherwise.
    pub len: u32,
    /// Decimal precision; zero otherwise.
    pub precision: u8,
    /// Decimal scale; zero otherwise.
    pub scale: u8,
}

impl ColumnType {
    /// A fixed-width type without parameters.
    #[must_use]
    pub const fn new(primitive: PrimitiveType) -> Self {
        Self {
            primitive,
            len: 0,
            precision: 0,
            scale: 0,
        }
    }

    /// `CHAR(len)`.
    #[must_use]
    pub const fn char(len: u32) -> Self {
        Self {
            primitive: PrimitiveType::Char,
            len,
            precision: 0,
            scale: 0,
        }
    }

    /// `VARCHAR(len)`.
    #[must_use]
    pub const fn varchar(len: u32) -> Self {
        Self {
            primitive: PrimitiveType::Varchar,
            len,
            precision: 0,
            scale: 0,
        }
    }

    /// `DECIMAL(precision, scale)`.
    #[must_use]
    pub const fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            primitive: PrimitiveType::Decimal,
            len: 0,
            precision,
            scale,
        }
    }

    /// `HLL` with its default length.
    #[must_use]
    pub const fn hll() -> Self {
        Self {
            primitive: PrimitiveType::Hll,
            len: HLL_DEFAULT_LEN,
            precision: 0,
            scale: 0,
        }
    }

    /// Bytes one value occupies in the in-memory row layout.
    #[must_use]
    pub fn mem_layout_bytes(&self) -> usize {
        match self.primitive {
            PrimitiveType::TinyInt => 1,
            PrimitiveType::SmallInt => 2,
            PrimitiveType::Int | PrimitiveType::Float => 4,
            PrimitiveType::BigInt | PrimitiveType::Double | PrimitiveType::DateTime => 8,
            PrimitiveType::LargeInt => 16,
            PrimitiveType::Decimal => 12,
            PrimitiveType::Date => 3,
            PrimitiveType::Char => self.len as usize,
            // length prefix
            PrimitiveType::Varchar | PrimitiveType::Hll => self.len as usize + 2,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primitive {
            PrimitiveType::Char | PrimitiveType::Varchar => {
                write!(f, "{}({})", self.primitive, self.len)
            }
            PrimitiveType::Decimal => {
                write!(f, "DECIMAL({},{})", self.precision, self.scale)
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Physical storage medium of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMedium {
    /// Spinning disk.
    Hdd,
    /// Solid-state disk.
    Ssd,
}

impl StorageMedium {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hdd => "HDD",
            Self::Ssd => "SSD",
        }
    }
}

display_as_str!(StorageMedium);

/// On-disk layout of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    /// Columnar files.
    Column,
    /// Row files (legacy).
    Row,
}

/// State of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Serving reads and loads.
    Normal,
    /// Being rewritten by a schema change job.
    SchemaChange,
    /// Being copied from a healthy replica.
    Clone,
    /// Being built by a rollup job.
    Rollup,
    /// Hosted by a backend that is being drained.
    Decommission,
}

impl ReplicaState {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::SchemaChange => "SCHEMA_CHANGE",
            Self::Clone => "CLONE",
            Self::Rollup => "ROLLUP",
            Self::Decommission => "DECOMMISSION",
        }
    }
}

display_as_str!(ReplicaState);

/// State of a materialized index inside one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexState {
    /// Serving.
    Normal,
    /// Target of a running schema change.
    SchemaChange,
    /// Being built by a rollup job.
    Rollup,
}

impl IndexState {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::SchemaChange => "SCHEMA_CHANGE",
            Self::Rollup => "ROLLUP",
        }
    }
}

display_as_str!(IndexState);

/// State of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionState {
    /// Serving.
    Normal,
    /// At least one index is under schema change.
    SchemaChange,
    /// A rollup is being built.
    Rollup,
}

/// State of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableState {
    /// No structural change in flight.
    Normal,
    /// A schema change job owns the table.
    SchemaChange,
    /// A rollup job owns the table.
    Rollup,
}

impl TableState {
    /// Upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::SchemaChange => "SCHEMA_CHANGE",
            Self::Rollup => "ROLLUP",
        }
    }
}

display_as_str!(TableState);
