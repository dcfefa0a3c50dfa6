//! Error types for the copy library.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing URI, bad identifiers, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection URI scheme that no driver understands
    #[error("Unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    /// PostgreSQL connection or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL connection or query error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema reflection failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Name normalization mapped two source columns onto one target column
    #[error("Column name collision in table {table}: {sources:?} all map to '{column}'")]
    ColumnCollision {
        table: String,
        column: String,
        sources: Vec<String>,
    },

    /// Target DDL failed (unsupported type, permissions, ...)
    #[error("Failed to create target table {table}: {message}")]
    TableCreation { table: String, message: String },

    /// An existing target table cannot receive the mapped columns
    #[error("Existing target table {table} is incompatible: {message}")]
    SchemaMismatch { table: String, message: String },

    /// Fetching a chunk from the source cursor failed
    #[error("Reading from table {table} failed: {message}")]
    StreamRead { table: String, message: String },

    /// Bulk inserting a chunk into the target failed
    #[error("Writing to table {table} failed: {message}")]
    StreamWrite { table: String, message: String },

    /// The run finished but some tables were not copied
    #[error("{} table(s) failed: {}", .0.len(), .0.join(", "))]
    TablesFailed(Vec<String>),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Copy was cancelled (SIGINT, etc.)
    #[error("Copy cancelled")]
    Cancelled,
}

impl CopyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a TableCreation error
    pub fn table_creation(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::TableCreation {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a SchemaMismatch error
    pub fn schema_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::SchemaMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a StreamRead error
    pub fn stream_read(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::StreamRead {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a StreamWrite error
    pub fn stream_write(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::StreamWrite {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error only affects the table being copied.
    ///
    /// Table-scoped errors are recorded in the report and the run moves on
    /// to the next table.
    pub fn is_table_scoped(&self) -> bool {
        matches!(
            self,
            CopyError::ColumnCollision { .. }
                | CopyError::SchemaMismatch { .. }
                | CopyError::StreamRead { .. }
                | CopyError::StreamWrite { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::UnsupportedDialect(_) | CopyError::Yaml(_) => 1,
            CopyError::Postgres(_)
            | CopyError::Mysql(_)
            | CopyError::Pool { .. }
            | CopyError::SchemaExtraction(_) => 2,
            CopyError::ColumnCollision { .. }
            | CopyError::SchemaMismatch { .. }
            | CopyError::TablesFailed(_) => 3,
            CopyError::TableCreation { .. } => 4,
            CopyError::StreamRead { .. } | CopyError::StreamWrite { .. } => 5,
            CopyError::Cancelled => 6,
            CopyError::Io(_) => 7,
            CopyError::Json(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CopyError::Config("x".into()).exit_code(), 1);
        assert_eq!(CopyError::UnsupportedDialect("oracle".into()).exit_code(), 1);
        assert_eq!(CopyError::pool("refused", "connecting").exit_code(), 2);
        assert_eq!(CopyError::table_creation("t", "denied").exit_code(), 4);
        assert_eq!(CopyError::stream_write("t", "boom").exit_code(), 5);
        assert_eq!(CopyError::Cancelled.exit_code(), 6);
        assert_eq!(CopyError::TablesFailed(vec!["a".into()]).exit_code(), 3);
    }

    #[test]
    fn test_table_scoped() {
        assert!(CopyError::stream_read("t", "eof").is_table_scoped());
        assert!(CopyError::schema_mismatch("t", "missing column").is_table_scoped());
        assert!(!CopyError::table_creation("t", "denied").is_table_scoped());
        assert!(!CopyError::Cancelled.is_table_scoped());
    }

    #[test]
    fn test_collision_message_names_sources() {
        let err = CopyError::ColumnCollision {
            table: "Users".into(),
            column: "name".into(),
            sources: vec!["Name".into(), "name".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Users"));
        assert!(msg.contains("\"Name\""));
        assert!(msg.contains("'name'"));
    }

    #[test]
    fn test_tables_failed_message() {
        let err = CopyError::TablesFailed(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "2 table(s) failed: a, b");
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = CopyError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.format_detailed().starts_with("Error: IO error: gone"));
    }
}
