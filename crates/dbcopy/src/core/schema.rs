//! Schema metadata for source tables and materialized target tables.
//!
//! Source metadata ([`Table`], [`Column`], [`ForeignKey`]) is produced once by
//! a catalog's reflection and treated as read-only afterwards. Target metadata
//! ([`TargetTable`], [`TargetColumn`]) is built per table right before rows are
//! streamed and discarded after that table's copy.

use serde::{Deserialize, Serialize};

use crate::dialect::{NativeType, PortableType};

/// Source table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Schema (PostgreSQL) or database (MySQL) name.
    pub schema: String,

    /// Table name as declared in the source.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Foreign keys. Only used to order tables; never recreated.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Names of the tables this table references, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.ref_table.as_str())
            .filter(move |t| *t != self.name)
    }

    /// Find a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Source column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type, parsed.
    pub source_type: NativeType,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

/// Foreign key metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced schema name.
    pub ref_schema: String,
}

/// A column of a materialized target table.
///
/// Target columns are always created nullable; constraints are not carried
/// over from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    pub portable: PortableType,
    pub nullable: bool,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, portable: PortableType) -> Self {
        Self {
            name: name.into(),
            portable,
            nullable: true,
        }
    }
}

/// Target table as created (or found) by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTable {
    /// Target table name (after prefixing and normalization).
    pub name: String,

    /// Columns in source column order.
    pub columns: Vec<TargetColumn>,

    /// True when the table existed and was reused without DDL.
    pub already_existed: bool,
}

impl TargetTable {
    /// Portable type of a target column, if present.
    pub fn portable_of(&self, column: &str) -> Option<PortableType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.portable)
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
