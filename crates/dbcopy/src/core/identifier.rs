//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! name that ends up in generated SQL goes through this module: it is
//! validated (non-empty, no NUL byte, bounded length) and then quoted for the
//! dialect that will execute it.

use crate::dialect::DialectKind;
use crate::error::{CopyError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is used as a target name or quoted.
///
/// # Errors
///
/// Returns `CopyError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote an identifier for the given dialect.
pub fn quote(dialect: DialectKind, name: &str) -> Result<String> {
    match dialect {
        DialectKind::Postgres => quote_pg(name),
        DialectKind::Mysql => quote_mysql(name),
    }
}

/// Qualify a table name with its schema (PostgreSQL) or database (MySQL).
pub fn qualify(dialect: DialectKind, schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "{}.{}",
        quote(dialect, schema)?,
        quote(dialect, table)?
    ))
}

/// Quote and comma-join a column list.
pub fn quote_list<S: AsRef<str>>(dialect: DialectKind, names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote(dialect, n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
