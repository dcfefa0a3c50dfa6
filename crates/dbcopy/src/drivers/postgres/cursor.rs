//! Server-side cursor over one PostgreSQL table.
//!
//! The cursor owns a dedicated connection holding a read-only, repeatable
//! read transaction. Each fetch issues `FETCH FORWARD n`, so the server never
//! sends more rows than were asked for.

use async_trait::async_trait;
use tokio_postgres::{Client, SimpleQueryMessage};
use tracing::debug;

use super::dialect::{select_sql, CURSOR_NAME, SESSION_SETUP};
use crate::core::schema::Table;
use crate::core::traits::RowCursor;
use crate::core::value::{decode_text, Row, SqlValue};
use crate::dialect::{translate, PortableType};
use crate::error::{CopyError, Result};

pub struct PostgresCursor {
    client: Client,
    table: String,
    types: Vec<PortableType>,
    finished: bool,
}

impl PostgresCursor {
    /// Declare the cursor on `client`, which must not be shared.
    pub async fn open(client: Client, table: &Table) -> Result<Self> {
        let select = select_sql(table)?;
        client.batch_execute(SESSION_SETUP).await?;
        client
            .batch_execute(&format!(
                "BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY; \
                 DECLARE {} NO SCROLL CURSOR FOR {}",
                CURSOR_NAME, select
            ))
            .await?;
        debug!("Opened cursor on {}", table.full_name());

        Ok(Self {
            client,
            table: table.name.clone(),
            types: table
                .columns
                .iter()
                .map(|c| translate(&c.source_type))
                .collect(),
            finished: false,
        })
    }

    fn decode_row(&self, row: &tokio_postgres::SimpleQueryRow) -> Row {
        if self.types.is_empty() {
            return Vec::new();
        }
        self.types
            .iter()
            .enumerate()
            .map(|(i, portable)| match row.get(i) {
                None => SqlValue::Null,
                Some(raw) => decode_value(raw, *portable),
            })
            .collect()
    }
}

/// Decode one text-format value. `bytea` arrives as `\x` hex.
fn decode_value(raw: &str, portable: PortableType) -> SqlValue<'static> {
    if portable == PortableType::LargeBinary {
        if let Some(bytes) = raw.strip_prefix("\\x").and_then(|h| hex::decode(h).ok()) {
            return SqlValue::Bytes(bytes.into());
        }
    }
    decode_text(raw, portable)
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let messages = self
            .client
            .simple_query(&format!("FETCH FORWARD {} FROM {}", max_rows.max(1), CURSOR_NAME))
            .await
            .map_err(|e| CopyError::stream_read(&self.table, e))?;

        let rows: Vec<Row> = messages
            .iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(self.decode_row(row)),
                _ => None,
            })
            .collect();

        if rows.is_empty() {
            self.finished = true;
            self.client
                .batch_execute(&format!("CLOSE {}; COMMIT", CURSOR_NAME))
                .await
                .map_err(|e| CopyError::stream_read(&self.table, e))?;
        }
        Ok(rows)
    }
}
