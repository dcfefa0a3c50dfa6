//! Core traits for database-agnostic copying.
//!
//! - [`Catalog`]: one live database connection: reflection, counting, target
//!   table materialization, streaming reads and bulk writes.
//! - [`RowCursor`]: a pull-based streaming read of one table.
//!
//! # Design Patterns
//!
//! - **Template Method**: [`Catalog::create`] defines the skip/drop/create
//!   skeleton on top of the driver primitives.
//! - **Strategy**: each dialect implements the primitives its own way.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::dialect::{translate_column, DialectKind};
use crate::error::{CopyError, Result};
use crate::naming::NameMapping;

use super::schema::{Table, TargetColumn, TargetTable};
use super::value::Row;

/// Streaming read of one source table.
///
/// Each call asks for at most `max_rows` rows and waits for them; the source
/// is never read ahead of the consumer. An empty result means the table is
/// exhausted. Dropping the cursor releases its connection.
#[async_trait]
pub trait RowCursor: Send {
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>>;
}

/// A live connection to one database.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Dialect of the connected database.
    fn dialect(&self) -> DialectKind;

    /// Schema (PostgreSQL) or database (MySQL) this catalog works in.
    fn schema(&self) -> &str;

    /// All base tables, referenced tables first.
    ///
    /// Reflection runs once; later calls return the cached result.
    async fn reflect(&self) -> Result<Vec<Table>>;

    /// Exact row count of a table.
    async fn count(&self, table: &str) -> Result<u64>;

    /// Columns of an existing table, or `None` if it does not exist.
    async fn describe_table(&self, name: &str) -> Result<Option<Vec<TargetColumn>>>;

    /// Drop a table. Irreversible.
    async fn drop_table(&self, name: &str) -> Result<()>;

    /// Create a table with the given nullable columns.
    async fn create_table(&self, name: &str, columns: &[TargetColumn]) -> Result<()>;

    /// Open a streaming cursor over all columns of a source table, in column
    /// order.
    async fn open_cursor(&self, table: &Table) -> Result<Box<dyn RowCursor>>;

    /// Insert one chunk as a single atomic operation.
    ///
    /// Rows carry one value per target column, in `table.columns` order.
    async fn insert_chunk(&self, table: &TargetTable, rows: &[Row]) -> Result<u64>;

    /// Round-trip a trivial statement.
    async fn ping(&self) -> Result<()>;

    /// Release all connections.
    async fn close(&self);

    /// Materialize the target table for `table` under `mapping`.
    ///
    /// - Existing table, `drop == false`: reuse it without DDL. Every mapped
    ///   column must be present (`SchemaMismatch` otherwise); type drift is
    ///   logged.
    /// - Existing table, `drop == true`: drop it, then create.
    /// - Otherwise create it with one nullable column per source column, in
    ///   source order.
    ///
    /// Any failure other than `SchemaMismatch` is reported as `TableCreation`.
    async fn create(&self, table: &Table, mapping: &NameMapping, drop: bool) -> Result<TargetTable> {
        let mut columns = Vec::with_capacity(table.columns.len());
        for (column, (_, target_name)) in table.columns.iter().zip(&mapping.columns) {
            let translation = translate_column(column);
            if let Some(ref warning) = translation.warning {
                warn!("{}: {}", table.name, warning);
            }
            columns.push(TargetColumn::new(target_name.clone(), translation.portable));
        }

        let existing = self
            .describe_table(&mapping.name)
            .await
            .map_err(|e| CopyError::table_creation(&mapping.name, e))?;

        if let Some(existing) = existing {
            if !drop {
                let columns = reconcile_existing(&mapping.name, columns, &existing)?;
                debug!("Reusing existing table {}", mapping.name);
                return Ok(TargetTable {
                    name: mapping.name.clone(),
                    columns,
                    already_existed: true,
                });
            }

            warn!(
                "Dropping existing table {}.{} ({} columns); its rows are lost",
                self.schema(),
                mapping.name,
                existing.len()
            );
            self.drop_table(&mapping.name)
                .await
                .map_err(|e| CopyError::table_creation(&mapping.name, e))?;
        }

        self.create_table(&mapping.name, &columns)
            .await
            .map_err(|e| match e {
                CopyError::TableCreation { .. } => e,
                other => CopyError::table_creation(&mapping.name, other),
            })?;

        Ok(TargetTable {
            name: mapping.name.clone(),
            columns,
            already_existed: false,
        })
    }
}

/// Check the mapped columns against an existing table.
///
/// Returns the mapped columns carrying the existing table's types, so values
/// are sanitized for what the table actually stores.
fn reconcile_existing(
    table: &str,
    wanted: Vec<TargetColumn>,
    existing: &[TargetColumn],
) -> Result<Vec<TargetColumn>> {
    let missing: Vec<&str> = wanted
        .iter()
        .filter(|w| !existing.iter().any(|e| e.name == w.name))
        .map(|w| w.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(CopyError::schema_mismatch(
            table,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    Ok(wanted
        .into_iter()
        .map(|mut w| {
            if let Some(e) = existing.iter().find(|e| e.name == w.name) {
                if e.portable != w.portable {
                    warn!(
                        "{}.{}: existing column is {}, source maps to {}",
                        table, w.name, e.portable, w.portable
                    );
                }
                w.portable = e.portable;
            }
            w
        })
        .collect())
}
