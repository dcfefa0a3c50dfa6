//! Core abstractions for database-agnostic copying.
//!
//! - [`schema`]: source table and target table metadata
//! - [`value`]: SQL value representation and text decoding
//! - [`traits`]: the [`Catalog`] and [`RowCursor`] traits drivers implement
//! - [`identifier`]: identifier validation and quoting
//! - [`order`]: foreign-key dependency ordering

pub mod identifier;
pub mod order;
pub mod schema;
pub mod traits;
pub mod value;

pub use order::dependency_order;
pub use schema::{Column, ForeignKey, Table, TargetColumn, TargetTable};
pub use traits::{Catalog, RowCursor};
pub use value::{decode_bytes, decode_text, Row, SqlValue};
