//! PostgreSQL driver.
//!
//! - [`PostgresCatalog`]: reflection, DDL and `COPY` writes over a
//!   deadpool-postgres pool
//! - [`PostgresCursor`]: streaming reads on a dedicated connection

mod cursor;
pub mod dialect;

pub use cursor::PostgresCursor;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::Pool;
use futures::SinkExt;
use tokio::sync::OnceCell;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use crate::config::redact_uri;
use crate::core::order::dependency_order;
use crate::core::schema::{Column, ForeignKey, Table, TargetColumn, TargetTable};
use crate::core::traits::{Catalog, RowCursor};
use crate::core::value::Row;
use crate::dialect::{translate_native, DialectKind, NativeType};
use crate::drivers::common::{split_ssl_mode, Connector};
use crate::error::{CopyError, Result};

/// Default schema when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

const POOL_SIZE: usize = 4;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A PostgreSQL database, scoped to one schema.
pub struct PostgresCatalog {
    pool: Pool,
    config: PgConfig,
    connector: Connector,
    schema: String,
    tables: OnceCell<Vec<Table>>,
}

/// Rewrite accepted scheme spellings to one tokio-postgres parses.
fn normalize_scheme(uri: &str) -> Result<String> {
    let (_, rest) = uri
        .split_once("://")
        .ok_or_else(|| CopyError::Config(format!("Invalid URI '{}'", redact_uri(uri))))?;
    Ok(format!("postgresql://{}", rest))
}

impl PostgresCatalog {
    /// Connect to the database named by `uri`.
    ///
    /// `schema` defaults to `public`.
    pub async fn connect(uri: &str, schema: Option<&str>) -> Result<Self> {
        let (normalized, ssl_mode) = split_ssl_mode(&normalize_scheme(uri)?)?;
        let mut config = PgConfig::from_str(&normalized).map_err(|e| {
            CopyError::Config(format!(
                "Invalid PostgreSQL URI '{}': {}",
                redact_uri(uri),
                e
            ))
        })?;
        config.keepalives(true);
        config.keepalives_idle(Duration::from_secs(30));
        config.connect_timeout(CONNECT_TIMEOUT);
        config.application_name("dbcopy");

        let connector = Connector::new(ssl_mode)?;
        let pool = connector.pool(config.clone(), POOL_SIZE)?;

        let catalog = Self {
            pool,
            config,
            connector,
            schema: schema.unwrap_or(DEFAULT_SCHEMA).to_string(),
            tables: OnceCell::new(),
        };
        catalog
            .ping()
            .await
            .map_err(|e| CopyError::pool(e, format!("connecting to {}", redact_uri(uri))))?;

        info!(
            "Connected to PostgreSQL: {} (schema {})",
            redact_uri(uri),
            catalog.schema
        );
        Ok(catalog)
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, "getting PostgreSQL connection"))
    }

    async fn load_tables(&self) -> Result<Vec<Table>> {
        let client = self.client().await?;
        let extraction = |what: &str, e: tokio_postgres::Error| {
            CopyError::SchemaExtraction(format!("{} in schema {}: {}", what, self.schema, e))
        };

        let table_rows = client
            .query(dialect::TABLES_QUERY, &[&self.schema])
            .await
            .map_err(|e| extraction("listing tables", e))?;

        let mut columns: HashMap<String, Vec<Column>> = HashMap::new();
        for row in client
            .query(dialect::COLUMNS_QUERY, &[&self.schema])
            .await
            .map_err(|e| extraction("reading columns", e))?
        {
            let table: String = row.get(0);
            let declared: String = row.get(2);
            columns.entry(table).or_default().push(Column {
                name: row.get(1),
                source_type: NativeType::parse(DialectKind::Postgres, &declared),
                nullable: row.get(3),
                ordinal_pos: row.get(4),
            });
        }

        let mut foreign_keys: HashMap<String, Vec<ForeignKey>> = HashMap::new();
        for row in client
            .query(dialect::FOREIGN_KEYS_QUERY, &[&self.schema])
            .await
            .map_err(|e| extraction("reading foreign keys", e))?
        {
            let ref_schema: String = row.get(2);
            if ref_schema != self.schema {
                continue;
            }
            let table: String = row.get(0);
            foreign_keys.entry(table).or_default().push(ForeignKey {
                name: row.get(1),
                ref_schema,
                ref_table: row.get(3),
            });
        }

        let tables: Vec<Table> = table_rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                Table {
                    schema: self.schema.clone(),
                    columns: columns.remove(&name).unwrap_or_default(),
                    foreign_keys: foreign_keys.remove(&name).unwrap_or_default(),
                    name,
                }
            })
            .collect();

        debug!("Reflected {} tables from {}", tables.len(), self.schema);
        Ok(dependency_order(tables))
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    async fn reflect(&self) -> Result<Vec<Table>> {
        self.tables
            .get_or_try_init(|| self.load_tables())
            .await
            .cloned()
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let client = self.client().await?;
        let row = client
            .query_one(dialect::count_sql(&self.schema, table)?.as_str(), &[])
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn describe_table(&self, name: &str) -> Result<Option<Vec<TargetColumn>>> {
        let client = self.client().await?;
        let rows = client
            .query(dialect::TABLE_COLUMNS_QUERY, &[&self.schema, &name])
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            rows.iter()
                .map(|row| {
                    let declared: String = row.get(1);
                    let native = NativeType::parse(DialectKind::Postgres, &declared);
                    TargetColumn {
                        name: row.get(0),
                        portable: translate_native(&native).portable,
                        nullable: row.get(2),
                    }
                })
                .collect(),
        ))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(&dialect::drop_table_sql(&self.schema, name)?)
            .await?;
        Ok(())
    }

    async fn create_table(&self, name: &str, columns: &[TargetColumn]) -> Result<()> {
        let sql = dialect::create_table_sql(&self.schema, name, columns)?;
        debug!("{}", sql);
        let client = self.client().await?;
        client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn open_cursor(&self, table: &Table) -> Result<Box<dyn RowCursor>> {
        let client = self
            .connector
            .connect(&self.config)
            .await
            .map_err(|e| CopyError::pool(e, format!("opening cursor on {}", table.name)))?;
        Ok(Box::new(PostgresCursor::open(client, table).await?))
    }

    async fn insert_chunk(&self, table: &TargetTable, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let copy_sql = dialect::copy_in_sql(&self.schema, table)?;
        let mut buf = BytesMut::with_capacity(rows.len() * 128);
        dialect::encode_copy_rows(&mut buf, table, rows);

        let client = self.client().await?;
        let sink = client
            .copy_in(copy_sql.as_str())
            .await
            .map_err(|e| CopyError::stream_write(&table.name, format!("starting COPY: {}", e)))?;
        tokio::pin!(sink);
        sink.send(buf.freeze())
            .await
            .map_err(|e| CopyError::stream_write(&table.name, format!("sending COPY data: {}", e)))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| CopyError::stream_write(&table.name, format!("finishing COPY: {}", e)))?;
        Ok(written)
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
