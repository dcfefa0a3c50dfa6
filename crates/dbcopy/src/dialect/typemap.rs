//! Native type → portable type translation.
//!
//! Translation is table driven and evaluated top to bottom:
//!
//! 1. [`SUBSTITUTIONS`]: exact `(dialect, name, modifier)` matches for alias
//!    and legacy types that would otherwise land in the wrong category.
//! 2. [`BASE_CATEGORIES`]: ordered families; the first family that claims the
//!    type wins, so overlapping families resolve by priority.
//! 3. Collapse: `SmallInteger` → `Integer`, `Enum` → `Unicode`.
//! 4. Fallback: anything still unresolved is stored as `Unicode` and the
//!    translation carries a warning.

use serde::{Deserialize, Serialize};

use super::{DialectKind, NativeType};
use crate::core::schema::Column;

/// Engine-agnostic column type used to define target tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortableType {
    Boolean,
    /// Resolves to `Integer` during translation.
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Numeric,
    DateTime,
    Date,
    Unicode,
    LargeBinary,
    Json,
    Array,
    /// Resolves to `Unicode` during translation.
    Enum,
}

impl PortableType {
    /// Whether values of this type travel as text.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            PortableType::Unicode | PortableType::Enum | PortableType::Json
        )
    }

    /// Whether this type holds calendar values.
    pub fn is_temporal(&self) -> bool {
        matches!(self, PortableType::Date | PortableType::DateTime)
    }
}

impl std::fmt::Display for PortableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Result of translating one column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub portable: PortableType,
    /// Set when the native type was not recognized and was widened to text.
    pub warning: Option<String>,
}

impl Translation {
    fn lossless(portable: PortableType) -> Self {
        Self {
            portable,
            warning: None,
        }
    }

    fn lossy(portable: PortableType, warning: impl Into<String>) -> Self {
        Self {
            portable,
            warning: Some(warning.into()),
        }
    }

    pub fn is_lossy(&self) -> bool {
        self.warning.is_some()
    }
}

/// Extra condition on a substitution entry.
#[derive(Debug, Clone, Copy)]
enum Modifier {
    Any,
    Params(&'static str),
    Unsigned,
}

impl Modifier {
    fn matches(&self, native: &NativeType) -> bool {
        match self {
            Modifier::Any => true,
            Modifier::Params(p) => native.params.as_deref() == Some(*p),
            Modifier::Unsigned => native.unsigned,
        }
    }
}

/// Exact-match substitutions. A `None` dialect applies to every dialect.
/// More specific entries for a name must precede its `Any` entry.
const SUBSTITUTIONS: &[(Option<DialectKind>, &str, Modifier, PortableType)] = &[
    // dialect booleans
    (Some(DialectKind::Mysql), "tinyint", Modifier::Params("1"), PortableType::Boolean),
    (Some(DialectKind::Mysql), "bit", Modifier::Params("1"), PortableType::Boolean),
    (Some(DialectKind::Mysql), "bit", Modifier::Any, PortableType::LargeBinary),
    (None, "bit", Modifier::Params("1"), PortableType::Boolean),
    // unsigned integers widen one step
    (Some(DialectKind::Mysql), "tinyint", Modifier::Unsigned, PortableType::Integer),
    (Some(DialectKind::Mysql), "smallint", Modifier::Unsigned, PortableType::Integer),
    (Some(DialectKind::Mysql), "mediumint", Modifier::Unsigned, PortableType::Integer),
    (Some(DialectKind::Mysql), "int", Modifier::Unsigned, PortableType::BigInteger),
    (Some(DialectKind::Mysql), "integer", Modifier::Unsigned, PortableType::BigInteger),
    (Some(DialectKind::Mysql), "bigint", Modifier::Unsigned, PortableType::Numeric),
    (Some(DialectKind::Mysql), "year", Modifier::Any, PortableType::Integer),
    (Some(DialectKind::Mysql), "set", Modifier::Any, PortableType::Unicode),
    // GUIDs travel as their canonical text form
    (None, "uniqueidentifier", Modifier::Any, PortableType::Unicode),
    (None, "uuid", Modifier::Any, PortableType::Unicode),
    (None, "money", Modifier::Any, PortableType::Numeric),
    (None, "smallmoney", Modifier::Any, PortableType::Numeric),
    // oversized text/blob aliases
    (None, "longtext", Modifier::Any, PortableType::Unicode),
    (None, "mediumtext", Modifier::Any, PortableType::Unicode),
    (None, "ntext", Modifier::Any, PortableType::Unicode),
    (None, "xml", Modifier::Any, PortableType::Unicode),
    (None, "longblob", Modifier::Any, PortableType::LargeBinary),
    (None, "mediumblob", Modifier::Any, PortableType::LargeBinary),
    (None, "image", Modifier::Any, PortableType::LargeBinary),
];

/// How a base category claims a native type.
#[derive(Debug, Clone, Copy)]
enum Category {
    ArrayOf,
    Names(&'static [&'static str]),
}

impl Category {
    fn claims(&self, native: &NativeType) -> bool {
        match self {
            Category::ArrayOf => native.array,
            Category::Names(names) => names.contains(&native.name.as_str()),
        }
    }
}

/// Base categories in priority order. Arrays come first so `int8[]` is an
/// array and not a big integer.
const BASE_CATEGORIES: &[(Category, PortableType)] = &[
    (Category::ArrayOf, PortableType::Array),
    (Category::Names(&["json", "jsonb"]), PortableType::Json),
    (
        Category::Names(&[
            "timestamp",
            "timestamp without time zone",
            "timestamp with time zone",
            "timestamptz",
            "datetime",
            "datetime2",
            "smalldatetime",
            "datetimeoffset",
        ]),
        PortableType::DateTime,
    ),
    (Category::Names(&["date"]), PortableType::Date),
    (
        Category::Names(&["real", "float", "float4", "float8", "double", "double precision"]),
        PortableType::Float,
    ),
    (
        Category::Names(&["numeric", "decimal", "dec", "fixed"]),
        PortableType::Numeric,
    ),
    (
        Category::Names(&["bigint", "int8", "bigserial", "serial8"]),
        PortableType::BigInteger,
    ),
    (
        Category::Names(&["integer", "int", "int4", "mediumint", "serial", "serial4"]),
        PortableType::Integer,
    ),
    (
        Category::Names(&["smallint", "int2", "tinyint", "smallserial", "serial2"]),
        PortableType::SmallInteger,
    ),
    (Category::Names(&["boolean", "bool"]), PortableType::Boolean),
    (
        Category::Names(&["bytea", "blob", "tinyblob", "binary", "varbinary"]),
        PortableType::LargeBinary,
    ),
    (
        Category::Names(&[
            "text",
            "tinytext",
            "varchar",
            "character varying",
            "char",
            "character",
            "nchar",
            "nvarchar",
            "bpchar",
            "citext",
            "name",
            "time",
            "time without time zone",
            "time with time zone",
            "timetz",
            "interval",
            "inet",
            "cidr",
            "macaddr",
            "bit",
            "bit varying",
            "varbit",
        ]),
        PortableType::Unicode,
    ),
    (Category::Names(&["enum"]), PortableType::Enum),
];

fn resolve(native: &NativeType) -> Option<PortableType> {
    let substituted = SUBSTITUTIONS
        .iter()
        .find(|(dialect, name, modifier, _)| {
            dialect.map_or(true, |d| d == native.dialect)
                && *name == native.name
                && !native.array
                && modifier.matches(native)
        })
        .map(|(_, _, _, portable)| *portable);

    substituted.or_else(|| {
        BASE_CATEGORIES
            .iter()
            .find(|(category, _)| category.claims(native))
            .map(|(_, portable)| *portable)
    })
}

fn collapse(portable: PortableType) -> PortableType {
    match portable {
        PortableType::SmallInteger => PortableType::Integer,
        PortableType::Enum => PortableType::Unicode,
        other => other,
    }
}

/// Translate a native type, reporting unrecognized types.
pub fn translate_native(native: &NativeType) -> Translation {
    match resolve(native) {
        Some(portable) => Translation::lossless(collapse(portable)),
        None => Translation::lossy(
            PortableType::Unicode,
            format!(
                "unrecognized {} type '{}' will be stored as text",
                native.dialect, native
            ),
        ),
    }
}

/// Translate a native type into a portable type.
///
/// Total and deterministic: unrecognized types resolve to `Unicode`.
pub fn translate(native: &NativeType) -> PortableType {
    translate_native(native).portable
}

/// Translate a reflected column, naming the column in any warning.
pub fn translate_column(column: &Column) -> Translation {
    let mut translation = translate_native(&column.source_type);
    if let Some(warning) = translation.warning.take() {
        translation.warning = Some(format!("column '{}': {}", column.name, warning));
    }
    translation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(declared: &str) -> PortableType {
        translate(&NativeType::parse(DialectKind::Postgres, declared))
    }

    fn my(declared: &str) -> PortableType {
        translate(&NativeType::parse(DialectKind::Mysql, declared))
    }

    // ===== Substitutions =====

    #[test]
    fn test_mysql_booleans() {
        assert_eq!(my("tinyint(1)"), PortableType::Boolean);
        assert_eq!(my("bit(1)"), PortableType::Boolean);
        assert_eq!(my("tinyint(4)"), PortableType::Integer);
        assert_eq!(my("bit(8)"), PortableType::LargeBinary);
    }

    #[test]
    fn test_unsigned_widening() {
        assert_eq!(my("int(10) unsigned"), PortableType::BigInteger);
        assert_eq!(my("bigint(20) unsigned"), PortableType::Numeric);
        assert_eq!(my("smallint unsigned"), PortableType::Integer);
        assert_eq!(my("int(11)"), PortableType::Integer);
    }

    #[test]
    fn test_alias_types() {
        assert_eq!(my("longtext"), PortableType::Unicode);
        assert_eq!(my("mediumblob"), PortableType::LargeBinary);
        assert_eq!(my("year(4)"), PortableType::Integer);
        assert_eq!(my("set('a','b')"), PortableType::Unicode);
        assert_eq!(pg("uuid"), PortableType::Unicode);
        assert_eq!(pg("money"), PortableType::Numeric);
        assert_eq!(pg("xml"), PortableType::Unicode);
    }

    // ===== Base categories =====

    #[test]
    fn test_base_categories() {
        assert_eq!(pg("jsonb"), PortableType::Json);
        assert_eq!(pg("timestamp(6) with time zone"), PortableType::DateTime);
        assert_eq!(my("datetime(3)"), PortableType::DateTime);
        assert_eq!(pg("date"), PortableType::Date);
        assert_eq!(pg("double precision"), PortableType::Float);
        assert_eq!(pg("numeric(12,4)"), PortableType::Numeric);
        assert_eq!(pg("bigint"), PortableType::BigInteger);
        assert_eq!(pg("boolean"), PortableType::Boolean);
        assert_eq!(pg("bytea"), PortableType::LargeBinary);
        assert_eq!(pg("character varying(255)"), PortableType::Unicode);
    }

    #[test]
    fn test_priority_array_before_element_type() {
        assert_eq!(pg("int8[]"), PortableType::Array);
        assert_eq!(pg("uuid[]"), PortableType::Array);
        assert_eq!(pg("jsonb[]"), PortableType::Array);
    }

    // ===== Collapse =====

    #[test]
    fn test_small_integer_collapses() {
        assert_eq!(pg("smallint"), PortableType::Integer);
        assert_eq!(my("tinyint(4)"), PortableType::Integer);
    }

    #[test]
    fn test_enum_collapses_to_unicode() {
        assert_eq!(my("enum('red','green')"), PortableType::Unicode);
        assert_eq!(pg("enum"), PortableType::Unicode);
    }

    // ===== Fallback =====

    #[test]
    fn test_unknown_type_is_lossy_unicode() {
        let native = NativeType::parse(DialectKind::Postgres, "tsvector");
        let translation = translate_native(&native);
        assert_eq!(translation.portable, PortableType::Unicode);
        assert!(translation.is_lossy());
        assert!(translation.warning.unwrap().contains("tsvector"));
    }

    #[test]
    fn test_translate_column_names_column() {
        let column = Column {
            name: "doc".into(),
            source_type: NativeType::parse(DialectKind::Postgres, "geometry"),
            nullable: true,
            ordinal_pos: 1,
        };
        let translation = translate_column(&column);
        assert!(translation.warning.unwrap().starts_with("column 'doc'"));
    }

    #[test]
    fn test_translation_is_deterministic() {
        for declared in ["int8[]", "enum('a')", "tinyint(1)", "polygon", "text"] {
            let native = NativeType::parse(DialectKind::Mysql, declared);
            assert_eq!(translate(&native), translate(&native));
        }
    }

    #[test]
    fn test_translated_types_never_collapsible() {
        for declared in ["smallint", "enum", "int2", "tinyint"] {
            let t = pg(declared);
            assert_ne!(t, PortableType::SmallInteger);
            assert_ne!(t, PortableType::Enum);
        }
    }
}
