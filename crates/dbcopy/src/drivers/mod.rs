//! Database drivers.
//!
//! - [`postgres`]: PostgreSQL ([`PostgresCatalog`])
//! - [`mysql`]: MySQL and MariaDB ([`MysqlCatalog`])
//! - [`common`]: TLS and connection helpers
//!
//! Each driver implements [`Catalog`] and [`RowCursor`](crate::core::RowCursor).
//! [`connect`] picks the driver from the URI scheme.

pub mod common;
pub mod mysql;
pub mod postgres;

pub use mysql::MysqlCatalog;
pub use postgres::PostgresCatalog;

use std::sync::Arc;

use crate::core::traits::Catalog;
use crate::dialect::DialectKind;
use crate::error::Result;

/// Connect to the database named by `uri`.
///
/// `schema` overrides the PostgreSQL schema (default `public`) or the MySQL
/// database (default: the one in the URI).
///
/// # Errors
///
/// `UnsupportedDialect` for unknown schemes, `Config` for malformed URIs and
/// `Pool` when the server cannot be reached.
pub async fn connect(uri: &str, schema: Option<&str>) -> Result<Arc<dyn Catalog>> {
    match DialectKind::from_uri(uri)? {
        DialectKind::Postgres => Ok(Arc::new(PostgresCatalog::connect(uri, schema).await?)),
        DialectKind::Mysql => Ok(Arc::new(MysqlCatalog::connect(uri, schema).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyError;

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = connect("sqlite:///tmp/db.sqlite", None).await.err().unwrap();
        assert!(matches!(err, CopyError::UnsupportedDialect(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_scheme() {
        let err = connect("localhost/db", None).await.err().unwrap();
        assert!(matches!(err, CopyError::Config(_)));
    }
}
