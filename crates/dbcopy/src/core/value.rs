//! SQL value types carried between source and target drivers.
//!
//! Drivers decode their wire values into [`SqlValue`] and encode them back
//! out on the target side, so neither side needs to know the other's type
//! system.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::dialect::PortableType;

/// SQL value enum for type-safe row handling.
///
/// Uses `Cow` for string and byte data so the sanitizer can hand back clean
/// values without reallocating them.
///
/// ```rust
/// use std::borrow::Cow;
/// use dbcopy::core::SqlValue;
///
/// let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
/// let owned: SqlValue<'static> = borrowed.into_owned();
/// assert_eq!(owned.as_text(), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Decimal(Decimal),

    /// Text/string data. Also the carrier for values no typed variant can
    /// represent (oversized numerics, zero dates, enum labels, arrays).
    Text(Cow<'a, str>),

    Bytes(Cow<'a, [u8]>),

    /// Timestamp without timezone. Zoned source timestamps are normalized to UTC.
    DateTime(NaiveDateTime),

    Date(NaiveDate),
}

/// One row, in column order.
pub type Row = Vec<SqlValue<'static>>;

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null => SqlValue::Null,
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::Date(v) => SqlValue::Date(v),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }
}

impl From<bool> for SqlValue<'static> {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue<'static> {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue<'static> {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

impl From<Decimal> for SqlValue<'static> {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue<'static> {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue<'static> {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T> From<Option<T>> for SqlValue<'static>
where
    T: Into<SqlValue<'static>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const ZONED_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Decode a text-protocol value according to the column's portable type.
///
/// Decoding is total: anything that does not parse as the expected type is
/// forwarded as text and left for the target to accept or reject. Zero dates
/// arrive here as text and are nulled by the sanitizer later.
pub fn decode_text(raw: &str, portable: PortableType) -> SqlValue<'static> {
    let decoded = match portable {
        PortableType::Boolean => decode_bool(raw),
        PortableType::SmallInteger | PortableType::Integer => raw
            .parse::<i32>()
            .map(SqlValue::I32)
            .or_else(|_| raw.parse::<i64>().map(SqlValue::I64))
            .ok(),
        PortableType::BigInteger => raw.parse::<i64>().map(SqlValue::I64).ok(),
        PortableType::Float => raw.parse::<f64>().map(SqlValue::F64).ok(),
        PortableType::Numeric => decode_decimal(raw),
        PortableType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(SqlValue::Date)
            .ok(),
        PortableType::DateTime => decode_datetime(raw),
        PortableType::LargeBinary => Some(SqlValue::Bytes(Cow::Owned(raw.as_bytes().to_vec()))),
        PortableType::Unicode | PortableType::Enum | PortableType::Json | PortableType::Array => {
            None
        }
    };

    decoded.unwrap_or_else(|| SqlValue::text_owned(raw.to_string()))
}

/// Decode raw bytes from a text protocol.
///
/// Binary columns keep their bytes untouched; everything else must be UTF-8
/// to be decoded and is otherwise forwarded as bytes.
pub fn decode_bytes(raw: &[u8], portable: PortableType) -> SqlValue<'static> {
    if portable == PortableType::LargeBinary {
        return SqlValue::Bytes(Cow::Owned(raw.to_vec()));
    }
    match std::str::from_utf8(raw) {
        Ok(s) => decode_text(s, portable),
        Err(_) => SqlValue::Bytes(Cow::Owned(raw.to_vec())),
    }
}

/// Only exact decimals become `Decimal`. `rust_decimal` rounds anything past
/// 28 fractional digits, so values whose text does not survive a round trip
/// stay text and reach the target unchanged.
fn decode_decimal(raw: &str) -> Option<SqlValue<'static>> {
    let d = Decimal::from_str(raw).ok()?;
    (d.to_string() == raw).then_some(SqlValue::Decimal(d))
}

fn decode_bool(raw: &str) -> Option<SqlValue<'static>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Some(SqlValue::Bool(true)),
        "f" | "false" | "0" | "n" | "no" | "off" => Some(SqlValue::Bool(false)),
        _ => None,
    }
}

fn decode_datetime(raw: &str) -> Option<SqlValue<'static>> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(SqlValue::DateTime(dt));
        }
    }
    for fmt in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(SqlValue::DateTime(dt.naive_utc()));
        }
    }
    // Date-only text in a timestamp column.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(SqlValue::DateTime)
}
