//! Per-value sanitization applied while streaming.
//!
//! Rules depend only on the target column's portable type:
//!
//! - Date/DateTime targets: zero-date sentinels become NULL.
//! - Text targets: control characters (except tab, LF, CR) are removed;
//!   Unicode columns are additionally transliterated to ASCII unless the
//!   policy preserves Unicode.
//! - Everything else passes through unchanged.

use std::borrow::Cow;

use deunicode::deunicode;

use crate::core::value::SqlValue;
use crate::dialect::PortableType;

/// Sanitization policy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    /// Transliterate text bound for Unicode columns to ASCII.
    pub transliterate: bool,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            transliterate: true,
        }
    }
}

impl Sanitizer {
    /// Policy that leaves non-ASCII text untouched.
    pub fn preserving_unicode() -> Self {
        Self {
            transliterate: false,
        }
    }

    /// Sanitize one value bound for a column of type `target`.
    pub fn apply<'a>(&self, value: SqlValue<'a>, target: PortableType) -> SqlValue<'a> {
        match value {
            SqlValue::Text(text) if target.is_temporal() && is_zero_date(&text) => SqlValue::Null,
            SqlValue::Text(text) if target.is_text() => {
                let text = strip_control(text);
                if self.transliterate && target != PortableType::Json && !text.is_ascii() {
                    SqlValue::Text(Cow::Owned(deunicode(&text)))
                } else {
                    SqlValue::Text(text)
                }
            }
            other => other,
        }
    }
}

/// Sanitize a value with the default policy.
///
/// ```rust
/// use dbcopy::core::SqlValue;
/// use dbcopy::dialect::PortableType;
/// use dbcopy::sanitize::sanitize;
///
/// assert!(sanitize(SqlValue::from("0000-00-00"), PortableType::Date).is_null());
/// assert_eq!(
///     sanitize(SqlValue::from("a\u{7}b"), PortableType::Unicode).as_text(),
///     Some("ab")
/// );
/// ```
pub fn sanitize(value: SqlValue<'_>, target: PortableType) -> SqlValue<'_> {
    Sanitizer::default().apply(value, target)
}

/// `0000-00-00`, `0000-00-00 00:00:00` and the same with fractional seconds
/// or a `T` separator.
fn is_zero_date(text: &str) -> bool {
    let text = text.trim();
    let Some(time) = text.strip_prefix("0000-00-00") else {
        return false;
    };
    if time.is_empty() {
        return true;
    }
    let Some(time) = time.strip_prefix([' ', 'T']) else {
        return false;
    };
    let (hms, frac) = time.split_once('.').unwrap_or((time, "0"));
    hms == "00:00:00" && !frac.is_empty() && frac.bytes().all(|b| b == b'0')
}

fn is_unsafe(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

fn strip_control(text: Cow<'_, str>) -> Cow<'_, str> {
    if text.chars().any(is_unsafe) {
        Cow::Owned(text.chars().filter(|c| !is_unsafe(*c)).collect())
    } else {
        text
    }
}
