//! # `Tessera` Core
//!
//! Metadata control plane for a distributed columnar OLAP store.
//!
//! The master owns the authoritative catalog (databases, tables, partitions,
//! tablets, replicas and backends) and drives two long-running protocols
//! against the storage backends:
//!
//! - **Schema change**: an `ALTER TABLE` is validated against a working copy
//!   of every affected index schema, then run as an asynchronous job that
//!   rewrites each replica under a new schema hash and swaps it in once a
//!   quorum of every tablet has finished.
//! - **Tablet report reconciliation**: each backend periodically reports its
//!   full tablet inventory; the master syncs versions, deletes replicas the
//!   backend lost, admits unknown copies that are still wanted and asks the
//!   backend to drop the rest.
//!
//! Every mutation goes through the write-ahead [`persist::EditLog`] before it
//! is applied, and startup replays the log.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tessera_core::alter::AlterClause;
//! use tessera_core::catalog::{Column, TableDef};
//! use tessera_core::types::{AggregateType, ColumnType, KeysType, PrimitiveType};
//! use tessera_core::{Master, RequestContext, TesseraConfig};
//!
//! let master = Master::open(TesseraConfig::load()?)?;
//! let ctx = RequestContext::new("root", "default_cluster");
//! master.create_database(&ctx, "sales")?;
//!
//! let def = TableDef::new("orders", KeysType::AggKeys, vec![
//!     Column::new("k1", ColumnType::new(PrimitiveType::Int)).key(),
//!     Column::new("v1", ColumnType::new(PrimitiveType::BigInt)).aggregate(AggregateType::Sum),
//! ]);
//! master.create_table(&ctx, "sales", &def)?;
//!
//! let v2 = Column::new("v2", ColumnType::new(PrimitiveType::BigInt)).aggregate(AggregateType::Sum);
//! master.alter_table(&ctx, "sales", "orders", &[AlterClause::add_column(v2).after("v1")])?;
//!
//! let _daemons = master.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
// =============================================================================
// STYLISTIC LINTS - Safe to allow globally (no bug risk)
// =============================================================================
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::if_not_else)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::single_match_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::unused_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::manual_assert)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alter;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod daemon;
#[cfg(test)]
mod daemon_tests;
pub mod error;
#[cfg(test)]
mod error_tests;
pub mod master;
pub mod persist;
pub mod reconcile;
pub mod report;
pub mod task;
pub mod types;

pub use alter::{AlterClause, AlterJobInfo, FinishedReplica, JobState, SchemaChangeHandler};
pub use catalog::{Catalog, Column, TableDef};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, TesseraConfig};
pub use error::{Error, Result};
pub use master::{Master, MasterDaemons, RequestContext};
pub use persist::{EditLog, EditLogEntry, FileEditLog, MemoryEditLog};
pub use reconcile::{ReconcileError, ReconcileSummary, TabletReconciler};
pub use report::{ReportError, ReportHandler, ReportOutcome, ReportRequest};
pub use task::{AgentTask, AgentTaskQueue, CloneChecker};
