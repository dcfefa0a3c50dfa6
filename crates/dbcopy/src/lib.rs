//! # dbcopy
//!
//! Copy every table of one SQL database into another, across dialects.
//!
//! - **Reflection** of base tables, columns and foreign keys
//! - **Portable types**: native column types resolve to a small portable set
//!   that every target dialect can create
//! - **Name mapping** with optional prefix and snake_case normalization
//! - **Chunked streaming**: rows are fetched and bulk inserted one chunk at a
//!   time, PostgreSQL via `COPY`, MySQL via multi-row `INSERT`
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbcopy::{CopyConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbcopy::Result<()> {
//!     let mut config = CopyConfig::new("mysql://app@src/shop", "postgres://app@dst/warehouse");
//!     config.prefix = Some("stg_".into());
//!     config.normalize_tables = true;
//!     config.normalize_columns = true;
//!
//!     let report = Orchestrator::new(config).await?.run().await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod copy;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod sanitize;

pub use config::CopyConfig;
pub use copy::{copy_table, stream, stream_with, CopyOptions, CopyProgress};
pub use crate::core::{Catalog, RowCursor, SqlValue, Table, TargetTable};
pub use dialect::{DialectKind, PortableType};
pub use error::{CopyError, Result};
pub use naming::{normalize, NameMapping};
pub use orchestrator::{CopyReport, HealthCheckResult, Orchestrator, TableOutcome};
pub use sanitize::{sanitize, Sanitizer};
