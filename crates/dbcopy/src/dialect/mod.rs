//! Dialects and native type tags.
//!
//! A [`DialectKind`] is selected from the scheme of a connection URI and
//! decides which substitution rules apply when a native column type is
//! translated into a [`PortableType`].
//!
//! ```rust
//! use dbcopy::dialect::{translate, DialectKind, NativeType, PortableType};
//!
//! let native = NativeType::parse(DialectKind::Mysql, "tinyint(1)");
//! assert_eq!(translate(&native), PortableType::Boolean);
//! ```

mod typemap;

pub use typemap::{translate, translate_column, translate_native, PortableType, Translation};

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// SQL dialects with a driver in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Mysql,
}

impl DialectKind {
    /// Dialect identifier used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
        }
    }

    /// Select a dialect from the scheme of a connection URI.
    ///
    /// # Errors
    ///
    /// Returns `CopyError::UnsupportedDialect` for unknown schemes and
    /// `CopyError::Config` when the URI has no scheme at all.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let (scheme, _) = uri.split_once("://").ok_or_else(|| {
            CopyError::Config(format!(
                "Connection URI must start with a scheme such as postgres:// or mysql://, got '{}'",
                crate::config::redact_uri(uri)
            ))
        })?;

        // Driver suffixes such as `postgresql+psycopg2` are accepted for
        // compatibility with SQLAlchemy-style URIs.
        let scheme = scheme.split('+').next().unwrap_or(scheme);
        match scheme.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(CopyError::UnsupportedDialect(format!(
                "'{}'. Supported schemes: postgres, postgresql, mysql, mariadb",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dialect-specific column type as reported by the introspection layer.
///
/// The declared text is split into a lower-case base name, its parameter
/// list and the modifiers that matter for translation:
///
/// - `int(11) unsigned` → name `int`, params `11`, unsigned
/// - `timestamp(3) with time zone` → name `timestamp with time zone`, params `3`
/// - `integer[]` → name `integer`, array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeType {
    /// Dialect the type was reflected from.
    pub dialect: DialectKind,
    /// Lower-case base name without parameters.
    pub name: String,
    /// Parameter list without parentheses, e.g. `10,2`.
    pub params: Option<String>,
    /// MySQL `UNSIGNED` modifier.
    pub unsigned: bool,
    /// Array of the base type (PostgreSQL).
    pub array: bool,
}

impl NativeType {
    /// Parse a declared column type.
    pub fn parse(dialect: DialectKind, declared: &str) -> Self {
        let mut text = declared.trim().to_lowercase();

        let mut array = false;
        while let Some(stripped) = text.strip_suffix("[]") {
            array = true;
            text = stripped.trim_end().to_string();
        }

        let mut params = None;
        if let (Some(open), Some(close)) = (text.find('('), text.rfind(')')) {
            if open < close {
                params = Some(text[open + 1..close].trim().to_string());
                text = format!("{} {}", &text[..open], &text[close + 1..]);
            }
        }

        let mut unsigned = false;
        let words: Vec<&str> = text
            .split_whitespace()
            .filter(|w| match *w {
                "unsigned" => {
                    unsigned = true;
                    false
                }
                "zerofill" | "signed" => false,
                _ => true,
            })
            .collect();

        Self {
            dialect,
            name: words.join(" "),
            params,
            unsigned,
            array,
        }
    }
}

impl std::fmt::Display for NativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(ref params) = self.params {
            write!(f, "({})", params)?;
        }
        if self.unsigned {
            write!(f, " unsigned")?;
        }
        if self.array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}
