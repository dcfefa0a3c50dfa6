//! Chunked streaming copy of one table.
//!
//! [`stream`] pulls at most `chunk_size` rows from a source cursor, converts
//! them for the target (positional rename, sanitization keyed on the target
//! column type), inserts the chunk with a single `insert_chunk` call and then
//! yields the converted rows one by one. The stream ends when a fetch returns
//! no rows or on the first error.
//!
//! ```text
//! open_cursor ─▶ fetch(C) ─▶ convert ─▶ insert_chunk ─▶ yield rows ─┐
//!                  ▲                                                  │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::schema::{Table, TargetTable};
use crate::core::traits::{Catalog, RowCursor};
use crate::core::value::{Row, SqlValue};
use crate::dialect::PortableType;
use crate::error::{CopyError, Result};
use crate::naming::NameMapping;
use crate::sanitize::Sanitizer;

/// Rows fetched and inserted per round.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Tuning for one table copy.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub chunk_size: usize,
    pub sanitizer: Sanitizer,
    /// Checked before every fetch.
    pub cancel: Option<CancellationToken>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sanitizer: Sanitizer::default(),
            cancel: None,
        }
    }
}

impl CopyOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }
}

/// One converted row, keyed by target column name.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    columns: Arc<[String]>,
    values: Row,
    last_in_chunk: bool,
}

impl CopyProgress {
    /// Value of a target column.
    pub fn get(&self, column: &str) -> Option<&SqlValue<'static>> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// `(target column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue<'static>)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn values(&self) -> &[SqlValue<'static>] {
        &self.values
    }

    pub fn into_values(self) -> Row {
        self.values
    }

    /// True for the last row of each inserted chunk.
    pub fn is_last_in_chunk(&self) -> bool {
        self.last_in_chunk
    }
}

/// Per-table conversion from source rows to target rows.
struct ConversionPlan {
    table: String,
    types: Vec<PortableType>,
    sanitizer: Sanitizer,
}

impl ConversionPlan {
    fn new(
        source_table: &Table,
        target_table: &TargetTable,
        mapping: &NameMapping,
        sanitizer: Sanitizer,
    ) -> Result<Self> {
        let width = source_table.columns.len();
        if mapping.len() != width || target_table.columns.len() != width {
            return Err(CopyError::stream_read(
                &source_table.name,
                format!(
                    "column count mismatch: source {}, mapping {}, target {}",
                    width,
                    mapping.len(),
                    target_table.columns.len()
                ),
            ));
        }
        for ((_, mapped), column) in mapping.columns.iter().zip(&target_table.columns) {
            if *mapped != column.name {
                return Err(CopyError::stream_read(
                    &source_table.name,
                    format!(
                        "mapped column '{}' does not match target column '{}'",
                        mapped, column.name
                    ),
                ));
            }
        }

        Ok(Self {
            table: source_table.name.clone(),
            types: target_table.columns.iter().map(|c| c.portable).collect(),
            sanitizer,
        })
    }

    fn convert(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        rows.into_iter()
            .map(|row| {
                if row.len() != self.types.len() {
                    return Err(CopyError::stream_read(
                        &self.table,
                        format!(
                            "cursor returned {} values, expected {}",
                            row.len(),
                            self.types.len()
                        ),
                    ));
                }
                Ok(row
                    .into_iter()
                    .zip(&self.types)
                    .map(|(value, portable)| self.sanitizer.apply(value, *portable))
                    .collect())
            })
            .collect()
    }
}

fn read_error(table: &str, e: CopyError) -> CopyError {
    match e {
        CopyError::StreamRead { .. } | CopyError::Cancelled => e,
        other => CopyError::stream_read(table, other),
    }
}

fn write_error(table: &str, e: CopyError) -> CopyError {
    match e {
        CopyError::StreamWrite { .. } => e,
        other => CopyError::stream_write(table, other),
    }
}

/// Stream `source_table` into `target_table` with the default sanitizer.
pub fn stream<'a>(
    source: &'a dyn Catalog,
    source_table: &'a Table,
    target: &'a dyn Catalog,
    target_table: &'a TargetTable,
    mapping: &'a NameMapping,
    chunk_size: usize,
) -> BoxStream<'a, Result<CopyProgress>> {
    stream_with(
        source,
        source_table,
        target,
        target_table,
        mapping,
        CopyOptions::with_chunk_size(chunk_size),
    )
}

/// Stream `source_table` into `target_table`.
///
/// Finite and single-pass. Each chunk is inserted before any of its rows is
/// yielded, so dropping the stream never leaves a half-inserted chunk.
pub fn stream_with<'a>(
    source: &'a dyn Catalog,
    source_table: &'a Table,
    target: &'a dyn Catalog,
    target_table: &'a TargetTable,
    mapping: &'a NameMapping,
    options: CopyOptions,
) -> BoxStream<'a, Result<CopyProgress>> {
    let chunk_size = options.chunk_size.max(1);
    let sanitizer = options.sanitizer;
    let cancel = options.cancel;
    let columns: Arc<[String]> = target_table.column_names().into();
    let table = source_table.name.as_str();

    let opened = async move {
        let plan = ConversionPlan::new(source_table, target_table, mapping, sanitizer)?;
        let cursor = source
            .open_cursor(source_table)
            .await
            .map_err(|e| read_error(table, e))?;
        Ok::<_, CopyError>((cursor, Arc::new(plan)))
    };

    stream::once(opened)
        .map_ok(move |(cursor, plan)| {
            let columns = Arc::clone(&columns);
            let cancel = cancel.clone();
            stream::try_unfold(cursor, move |mut cursor: Box<dyn RowCursor>| {
                let plan = Arc::clone(&plan);
                let columns = Arc::clone(&columns);
                let cancel = cancel.clone();
                async move {
                    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                        return Err(CopyError::Cancelled);
                    }

                    let rows = cursor
                        .fetch(chunk_size)
                        .await
                        .map_err(|e| read_error(table, e))?;
                    if rows.is_empty() {
                        return Ok(None);
                    }

                    let converted = plan.convert(rows)?;
                    let inserted = target
                        .insert_chunk(target_table, &converted)
                        .await
                        .map_err(|e| write_error(&target_table.name, e))?;
                    debug!(
                        "{} -> {}: inserted chunk of {} rows",
                        table, target_table.name, inserted
                    );

                    let last = converted.len() - 1;
                    let items: Vec<Result<CopyProgress>> = converted
                        .into_iter()
                        .enumerate()
                        .map(|(i, values)| {
                            Ok(CopyProgress {
                                columns: Arc::clone(&columns),
                                values,
                                last_in_chunk: i == last,
                            })
                        })
                        .collect();
                    Ok(Some((stream::iter(items), cursor)))
                }
            })
            .try_flatten()
        })
        .try_flatten()
        .boxed()
}

/// Drain [`stream_with`] and return the number of rows copied.
///
/// `on_chunk` is called with the running row total after every chunk.
pub async fn copy_table(
    source: &dyn Catalog,
    source_table: &Table,
    target: &dyn Catalog,
    target_table: &TargetTable,
    mapping: &NameMapping,
    options: CopyOptions,
    mut on_chunk: impl FnMut(u64) + Send,
) -> Result<u64> {
    let mut rows = stream_with(source, source_table, target, target_table, mapping, options);
    let mut copied: u64 = 0;
    while let Some(progress) = rows.try_next().await? {
        copied += 1;
        if progress.is_last_in_chunk() {
            on_chunk(copied);
        }
    }
    Ok(copied)
}
