//! Error types for `Tessera`.
//!
//! [`Error`] is returned by every DDL-facing operation (alter statements,
//! cancellation, status queries, table creation). Reconciliation failures
//! are a separate type, [`crate::reconcile::ReconcileError`], because they
//! are logged and skipped rather than surfaced to a caller.
//!
//! Error codes follow the pattern `TESS-XXX`.

use thiserror::Error;

/// Result type alias for `Tessera` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `Tessera` control-plane operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The alter statement is malformed or violates a schema invariant (TESS-001).
    ///
    /// Raised before anything is committed; the live schema is untouched.
    #[error("[TESS-001] Invalid alter statement: {0}")]
    Validation(String),

    /// Cluster state does not allow the operation, e.g. too few replicas (TESS-002).
    #[error("[TESS-002] Precondition failed: {0}")]
    Precondition(String),

    /// The statement would not change any index (TESS-003).
    #[error("[TESS-003] Nothing is changed: {0}")]
    NothingChanged(String),

    /// A finished schema change on this table is still draining its old schema (TESS-004).
    #[error("[TESS-004] Old schema is not deleted. wait {remaining_secs} second(s) and try again")]
    OldSchemaNotDeleted {
        /// Seconds until the delayed-deletion window closes.
        remaining_secs: i64,
    },

    /// Another structural change is running on the table (TESS-005).
    #[error("[TESS-005] Table '{0}' is busy: {1}")]
    TableBusy(String, String),

    /// Database not found (TESS-006).
    #[error("[TESS-006] Database '{0}' does not exist")]
    DatabaseNotFound(String),

    /// Table not found (TESS-007).
    #[error("[TESS-007] Table '{0}' does not exist")]
    TableNotFound(String),

    /// Materialized index not found (TESS-008).
    #[error("[TESS-008] Index '{0}' does not exist")]
    IndexNotFound(String),

    /// Column not found (TESS-009).
    #[error("[TESS-009] Column '{0}' does not exist")]
    ColumnNotFound(String),

    /// No alter job matches the request (TESS-010).
    #[error("[TESS-010] No alter job: {0}")]
    JobNotFound(String),

    /// Configuration error (TESS-011).
    #[error("[TESS-011] Configuration error: {0}")]
    Config(String),

    /// The write-ahead log rejected an append (TESS-012).
    ///
    /// The in-memory mutation guarded by this append was not applied.
    #[error("[TESS-012] Edit log error: {0}")]
    EditLog(String),

    /// IO error (TESS-013).
    #[error("[TESS-013] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (TESS-014).
    #[error("[TESS-014] Serialization error: {0}")]
    Serialization(String),

    /// Internal error (TESS-015).
    ///
    /// Indicates inconsistent metadata. Please report if encountered.
    #[error("[TESS-015] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "TESS-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "TESS-001",
            Self::Precondition(_) => "TESS-002",
            Self::NothingChanged(_) => "TESS-003",
            Self::OldSchemaNotDeleted { .. } => "TESS-004",
            Self::TableBusy(..) => "TESS-005",
            Self::DatabaseNotFound(_) => "TESS-006",
            Self::TableNotFound(_) => "TESS-007",
            Self::IndexNotFound(_) => "TESS-008",
            Self::ColumnNotFound(_) => "TESS-009",
            Self::JobNotFound(_) => "TESS-010",
            Self::Config(_) => "TESS-011",
            Self::EditLog(_) => "TESS-012",
            Self::Io(_) => "TESS-013",
            Self::Serialization(_) => "TESS-014",
            Self::Internal(_) => "TESS-015",
        }
    }

    /// Returns true if retrying the request later may succeed.
    ///
    /// Edit log and internal errors leave the master in a state that needs
    /// operator attention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EditLog(_) | Self::Internal(_))
    }

    /// Returns true for errors raised while validating a statement, before commit.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NothingChanged(_)
                | Self::IndexNotFound(_)
                | Self::ColumnNotFound(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
