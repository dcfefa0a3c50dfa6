//! Target name derivation.
//!
//! [`normalize`] turns an arbitrary source identifier into a portable
//! snake_case ASCII identifier. [`NameMapping`] applies it (optionally) to a
//! table and its columns and refuses mappings in which two source columns
//! would land on the same target column.

use std::collections::HashMap;

use deunicode::deunicode;
use inflector::Inflector;
use serde::Serialize;

use crate::core::identifier::validate_identifier;
use crate::core::schema::Table;
use crate::error::{CopyError, Result};

/// Normalize an identifier to lower snake_case ASCII.
///
/// ```rust
/// use dbcopy::naming::normalize;
///
/// assert_eq!(normalize("Full Name"), "full_name");
/// assert_eq!(normalize("CUSTOMER ID"), "customer_id");
/// assert_eq!(normalize("createdAt"), "created_at");
/// assert_eq!(normalize("Prénom"), "prenom");
/// ```
pub fn normalize(name: &str) -> String {
    let ascii = deunicode(name);

    let safe: String = ascii
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    // Only mixed case carries word boundaries worth splitting on. Single-case
    // names keep their boundaries as-is, which makes every output a fixpoint.
    let mixed_case =
        safe.chars().any(|c| c.is_ascii_lowercase()) && safe.chars().any(|c| c.is_ascii_uppercase());
    let cased = if mixed_case {
        safe.to_snake_case()
    } else {
        safe.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase()
    };

    let mut out = String::with_capacity(cased.len());
    for c in cased.chars() {
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Source → target names for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMapping {
    /// Source table name.
    pub source_table: String,

    /// Target table name.
    pub name: String,

    /// `(source column, target column)` pairs in source column order.
    pub columns: Vec<(String, String)>,
}

impl NameMapping {
    /// Derive the target names for `table`.
    ///
    /// The prefix is concatenated as-is after optional normalization of the
    /// table name.
    ///
    /// # Errors
    ///
    /// - `CopyError::ColumnCollision` when two source columns map to the
    ///   same target column.
    /// - `CopyError::Config` when a derived name is not a usable identifier
    ///   (e.g. a name that normalizes to nothing).
    pub fn build(
        table: &Table,
        prefix: Option<&str>,
        normalize_tables: bool,
        normalize_columns: bool,
    ) -> Result<Self> {
        let mut name = if normalize_tables {
            normalize(&table.name)
        } else {
            table.name.clone()
        };
        if let Some(prefix) = prefix {
            name = format!("{}{}", prefix, name);
        }
        validate_identifier(&name).map_err(|e| {
            CopyError::Config(format!("table '{}' maps to an invalid name: {}", table.name, e))
        })?;

        let columns: Vec<(String, String)> = table
            .columns
            .iter()
            .map(|c| {
                let target = if normalize_columns {
                    normalize(&c.name)
                } else {
                    c.name.clone()
                };
                (c.name.clone(), target)
            })
            .collect();

        let mut seen: HashMap<&str, Vec<&str>> = HashMap::with_capacity(columns.len());
        for (source, target) in &columns {
            validate_identifier(target).map_err(|e| {
                CopyError::Config(format!(
                    "column '{}.{}' maps to an invalid name: {}",
                    table.name, source, e
                ))
            })?;
            seen.entry(target.as_str()).or_default().push(source.as_str());
        }

        // Report the first collision in column order.
        if let Some((_, target)) = columns.iter().find(|(_, t)| seen[t.as_str()].len() > 1) {
            return Err(CopyError::ColumnCollision {
                table: table.name.clone(),
                column: target.clone(),
                sources: seen[target.as_str()].iter().map(|s| s.to_string()).collect(),
            });
        }

        Ok(Self {
            source_table: table.name.clone(),
            name,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
