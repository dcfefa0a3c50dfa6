//! MySQL SQL text: DDL types, reflection queries, multi-row INSERT and value
//! binding.

use chrono::{Datelike, Timelike};
use mysql_async::Value;

use crate::core::identifier::{qualify, quote, quote_list};
use crate::core::schema::{Table, TargetColumn, TargetTable};
use crate::core::value::SqlValue;
use crate::dialect::{DialectKind, PortableType};
use crate::error::{CopyError, Result};

const MY: DialectKind = DialectKind::Mysql;

/// Placeholders allowed in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

// Names are cast to CHAR because information_schema collations differ
// between MySQL and MariaDB versions.

pub(super) const TABLES_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255))
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

pub(super) const COLUMNS_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)),
           CAST(COLUMN_NAME AS CHAR(255)),
           CAST(COLUMN_TYPE AS CHAR(4096)),
           CAST(IS_NULLABLE AS CHAR(3)),
           CAST(ORDINAL_POSITION AS SIGNED)
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

pub(super) const TABLE_COLUMNS_QUERY: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR(255)),
           CAST(COLUMN_TYPE AS CHAR(4096)),
           CAST(IS_NULLABLE AS CHAR(3))
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// One row per foreign key column; callers dedupe by constraint name.
pub(super) const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)),
           CAST(CONSTRAINT_NAME AS CHAR(255)),
           CAST(REFERENCED_TABLE_SCHEMA AS CHAR(255)),
           CAST(REFERENCED_TABLE_NAME AS CHAR(255))
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ? AND REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
"#;

/// DDL type for a portable type. Arrays have no MySQL counterpart.
pub fn ddl_type(portable: PortableType) -> Option<&'static str> {
    Some(match portable {
        PortableType::Boolean => "BOOLEAN",
        PortableType::SmallInteger => "SMALLINT",
        PortableType::Integer => "INT",
        PortableType::BigInteger => "BIGINT",
        PortableType::Float => "DOUBLE",
        PortableType::Numeric => "DECIMAL(65,30)",
        PortableType::DateTime => "DATETIME(6)",
        PortableType::Date => "DATE",
        PortableType::Unicode | PortableType::Enum => "LONGTEXT",
        PortableType::LargeBinary => "LONGBLOB",
        PortableType::Json => "JSON",
        PortableType::Array => return None,
    })
}

pub fn create_table_sql(database: &str, name: &str, columns: &[TargetColumn]) -> Result<String> {
    let defs = columns
        .iter()
        .map(|c| {
            let ty = ddl_type(c.portable).ok_or_else(|| {
                CopyError::table_creation(
                    name,
                    format!("column {}: {} values cannot be stored in MySQL", c.name, c.portable),
                )
            })?;
            Ok(format!("{} {} NULL", quote(MY, &c.name)?, ty))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE {} (\n    {}\n) DEFAULT CHARSET = utf8mb4",
        qualify(MY, database, name)?,
        defs.join(",\n    ")
    ))
}

pub fn drop_table_sql(database: &str, name: &str) -> Result<String> {
    Ok(format!("DROP TABLE {}", qualify(MY, database, name)?))
}

pub fn count_sql(database: &str, table: &str) -> Result<String> {
    Ok(format!("SELECT COUNT(*) FROM {}", qualify(MY, database, table)?))
}

/// Full-table select for a cursor. `BIT(1)` columns are read as numbers so
/// they decode as booleans; wider bit fields stay raw bytes.
pub fn select_sql(table: &Table) -> Result<String> {
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let quoted = quote(MY, &c.name)?;
            let single_bit = c.source_type.name == "bit"
                && c.source_type.params.as_deref().map_or(true, |p| p == "1");
            Ok(if single_bit {
                format!("CAST({} AS UNSIGNED)", quoted)
            } else {
                quoted
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        qualify(MY, &table.schema, &table.name)?
    ))
}

/// Rows per INSERT so that one statement stays under the placeholder limit.
pub fn rows_per_statement(columns: usize) -> usize {
    if columns == 0 {
        return MAX_PLACEHOLDERS;
    }
    (MAX_PLACEHOLDERS / columns).max(1)
}

/// `INSERT` for `rows` rows of `table`.
pub fn insert_sql(database: &str, table: &TargetTable, rows: usize) -> Result<String> {
    let width = table.columns.len();
    let tuple = format!("({})", vec!["?"; width].join(", "));
    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify(MY, database, &table.name)?,
        quote_list(MY, &table.column_names())?,
        vec![tuple; rows].join(", ")
    ))
}

/// Bind a value for a MySQL statement.
///
/// `DATETIME` and `DATE` only hold years 0 to 9999. Temporal values outside
/// that range are bound as their text form so the server rejects them instead
/// of storing a different date.
pub fn to_mysql(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::Text(s) => Value::from(s.as_ref()),
        SqlValue::Bytes(b) => Value::from(b.as_ref()),
        SqlValue::DateTime(dt) => match mysql_year(dt.year()) {
            Some(year) => Value::Date(
                year,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond().min(999_999_999) / 1_000,
            ),
            None => Value::from(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        },
        SqlValue::Date(d) => match mysql_year(d.year()) {
            Some(year) => Value::Date(year, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
            None => Value::from(d.format("%Y-%m-%d").to_string()),
        },
    }
}

fn mysql_year(year: i32) -> Option<u16> {
    u16::try_from(year).ok().filter(|y| *y <= 9999)
}

/// Decode one text-protocol cell.
pub fn from_mysql(value: Option<Value>, portable: PortableType) -> SqlValue<'static> {
    use crate::core::value::{decode_bytes, decode_text};

    match value {
        None | Some(Value::NULL) => SqlValue::Null,
        Some(Value::Bytes(bytes)) => decode_bytes(&bytes, portable),
        Some(Value::Int(i)) => decode_text(&i.to_string(), portable),
        Some(Value::UInt(u)) => decode_text(&u.to_string(), portable),
        Some(Value::Float(f)) => decode_text(&f.to_string(), portable),
        Some(Value::Double(f)) => decode_text(&f.to_string(), portable),
        Some(Value::Date(y, mo, d, h, mi, s, us)) => decode_text(
            &format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                y, mo, d, h, mi, s, us
            ),
            portable,
        ),
        Some(Value::Time(neg, days, h, mi, s, us)) => SqlValue::text_owned(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if neg { "-" } else { "" },
            u32::from(h) + days * 24,
            mi,
            s,
            us
        )),
    }
}
