//! PostgreSQL SQL text: DDL types, reflection queries and the COPY text
//! format.

use bytes::{BufMut, BytesMut};

use crate::core::identifier::{qualify, quote, quote_list};
use crate::core::schema::{Table, TargetColumn, TargetTable};
use crate::core::value::SqlValue;
use crate::dialect::{DialectKind, PortableType};
use crate::error::Result;

const PG: DialectKind = DialectKind::Postgres;

/// Base tables of a schema. Partitions are skipped; their parent is copied.
pub(super) const TABLES_QUERY: &str = r#"
    SELECT c.relname
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      AND NOT c.relispartition
    ORDER BY c.relname
"#;

/// Columns of every table in a schema. Domains resolve to their base type,
/// enum types report as `enum`.
pub(super) const COLUMNS_QUERY: &str = r#"
    SELECT c.relname,
           a.attname,
           CASE
               WHEN t.typtype = 'e' THEN 'enum'
               WHEN t.typtype = 'd' THEN pg_catalog.format_type(t.typbasetype, t.typtypmod)
               ELSE pg_catalog.format_type(a.atttypid, a.atttypmod)
           END,
           NOT a.attnotnull,
           a.attnum::int4
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY c.relname, a.attnum
"#;

/// Columns of one table, for existing-target checks.
pub(super) const TABLE_COLUMNS_QUERY: &str = r#"
    SELECT a.attname,
           CASE
               WHEN t.typtype = 'e' THEN 'enum'
               WHEN t.typtype = 'd' THEN pg_catalog.format_type(t.typbasetype, t.typtypmod)
               ELSE pg_catalog.format_type(a.atttypid, a.atttypmod)
           END,
           NOT a.attnotnull
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    WHERE n.nspname = $1
      AND c.relname = $2
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// Foreign keys of every table in a schema: `(table, constraint, referenced
/// schema, referenced table)`.
pub(super) const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT c.relname, con.conname, rn.nspname, r.relname
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_class r ON r.oid = con.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = r.relnamespace
    WHERE con.contype = 'f'
      AND n.nspname = $1
    ORDER BY c.relname, con.conname
"#;

/// Session settings for cursor connections, so the text form of every value
/// is stable.
pub(super) const SESSION_SETUP: &str = "SET bytea_output = 'hex'; \
     SET TIME ZONE 'UTC'; \
     SET DateStyle = 'ISO, YMD'; \
     SET IntervalStyle = 'iso_8601'; \
     SET extra_float_digits = 3";

pub(super) const CURSOR_NAME: &str = "dbcopy_cursor";

/// DDL type for a portable type.
pub fn ddl_type(portable: PortableType) -> &'static str {
    match portable {
        PortableType::Boolean => "BOOLEAN",
        PortableType::SmallInteger => "SMALLINT",
        PortableType::Integer => "INTEGER",
        PortableType::BigInteger => "BIGINT",
        PortableType::Float => "DOUBLE PRECISION",
        PortableType::Numeric => "NUMERIC",
        PortableType::DateTime => "TIMESTAMP WITHOUT TIME ZONE",
        PortableType::Date => "DATE",
        PortableType::Unicode | PortableType::Enum => "TEXT",
        PortableType::LargeBinary => "BYTEA",
        PortableType::Json => "JSONB",
        PortableType::Array => "TEXT[]",
    }
}

pub fn create_table_sql(schema: &str, name: &str, columns: &[TargetColumn]) -> Result<String> {
    let defs = columns
        .iter()
        .map(|c| Ok(format!("{} {} NULL", quote(PG, &c.name)?, ddl_type(c.portable))))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify(PG, schema, name)?,
        defs.join(",\n    ")
    ))
}

pub fn drop_table_sql(schema: &str, name: &str) -> Result<String> {
    Ok(format!("DROP TABLE {}", qualify(PG, schema, name)?))
}

pub fn count_sql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("SELECT COUNT(*) FROM {}", qualify(PG, schema, table)?))
}

/// Full-table select for a cursor. `money` is cast to numeric so its text
/// form carries no currency symbol.
pub fn select_sql(table: &Table) -> Result<String> {
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let quoted = quote(PG, &c.name)?;
            Ok(if c.source_type.name == "money" && !c.source_type.array {
                format!("{}::numeric", quoted)
            } else {
                quoted
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let columns = if columns.is_empty() {
        // A table without columns still has rows.
        "NULL".to_string()
    } else {
        columns.join(", ")
    };
    Ok(format!(
        "SELECT {} FROM {}",
        columns,
        qualify(PG, &table.schema, &table.name)?
    ))
}

pub fn copy_in_sql(schema: &str, table: &TargetTable) -> Result<String> {
    Ok(format!(
        "COPY {} ({}) FROM STDIN",
        qualify(PG, schema, &table.name)?,
        quote_list(PG, &table.column_names())?
    ))
}

/// Append rows to a COPY text-format buffer.
pub fn encode_copy_rows(buf: &mut BytesMut, table: &TargetTable, rows: &[Vec<SqlValue<'_>>]) {
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.put_u8(b'\t');
            }
            let portable = table
                .columns
                .get(i)
                .map_or(PortableType::Unicode, |c| c.portable);
            encode_copy_value(buf, value, portable);
        }
        buf.put_u8(b'\n');
    }
}

fn encode_copy_value(buf: &mut BytesMut, value: &SqlValue<'_>, portable: PortableType) {
    match value {
        SqlValue::Null => buf.put_slice(b"\\N"),
        SqlValue::Bool(b) => buf.put_slice(if *b { b"t" } else { b"f" }),
        SqlValue::I32(i) => buf.put_slice(i.to_string().as_bytes()),
        SqlValue::I64(i) => buf.put_slice(i.to_string().as_bytes()),
        SqlValue::F64(f) => put_float(buf, *f),
        SqlValue::Decimal(d) => buf.put_slice(d.to_string().as_bytes()),
        SqlValue::Text(s) => put_escaped(buf, s),
        SqlValue::Bytes(b) if portable == PortableType::LargeBinary => {
            buf.put_slice(b"\\\\x");
            buf.put_slice(hex::encode(b.as_ref()).as_bytes());
        }
        SqlValue::Bytes(b) => put_escaped(buf, &String::from_utf8_lossy(b)),
        SqlValue::DateTime(dt) => {
            buf.put_slice(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().as_bytes())
        }
        SqlValue::Date(d) => buf.put_slice(d.format("%Y-%m-%d").to_string().as_bytes()),
    }
}

fn put_float(buf: &mut BytesMut, f: f64) {
    if f.is_nan() {
        buf.put_slice(b"NaN");
    } else if f.is_infinite() {
        buf.put_slice(if f > 0.0 { b"Infinity" } else { b"-Infinity" });
    } else {
        buf.put_slice(f.to_string().as_bytes());
    }
}

fn put_escaped(buf: &mut BytesMut, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => buf.put_slice(b"\\\\"),
            '\t' => buf.put_slice(b"\\t"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            _ => {
                let mut tmp = [0u8; 4];
                buf.put_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}
