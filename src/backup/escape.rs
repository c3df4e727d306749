// ABOUTME: Converts typed column values into MySQL literal text
// ABOUTME: Used by the dump writer for every value of every INSERT row

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::fmt::Write;

/// A single column value read from the source database.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// Exact numeric kept as its canonical decimal text
    Decimal(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Render a value as a MySQL literal.
///
/// - NULL -> `NULL`
/// - booleans -> `0` / `1`
/// - numerics -> unquoted decimal text (non-finite floats become `NULL`)
/// - datetimes -> `'YYYY-MM-DD HH:MM:SS'`, with `.ffffff` only when sub-second digits exist
/// - bytes -> hex literal
/// - everything else -> single-quoted, escaped string
///
/// # Examples
///
/// ```
/// # use mysql_snapshot::backup::{to_sql_literal, SqlValue};
/// assert_eq!(to_sql_literal(&SqlValue::Null), "NULL");
/// assert_eq!(to_sql_literal(&SqlValue::Bool(true)), "1");
/// assert_eq!(to_sql_literal(&SqlValue::from("O'Brien")), "'O''Brien'");
/// ```
pub fn to_sql_literal(value: &SqlValue) -> String {
    let mut out = String::new();
    write_sql_literal(&mut out, value);
    out
}

/// Append the literal for `value` to `out` without an intermediate allocation.
pub fn write_sql_literal(out: &mut String, value: &SqlValue) {
    match value {
        SqlValue::Null => out.push_str("NULL"),
        SqlValue::Bool(b) => out.push(if *b { '1' } else { '0' }),
        SqlValue::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        SqlValue::UInt(u) => {
            let _ = write!(out, "{}", u);
        }
        SqlValue::Float(f) if f.is_finite() => {
            let _ = write!(out, "{}", f);
        }
        SqlValue::Double(d) if d.is_finite() => {
            let _ = write!(out, "{}", d);
        }
        SqlValue::Float(_) | SqlValue::Double(_) => out.push_str("NULL"),
        SqlValue::Decimal(d) => out.push_str(d),
        SqlValue::Date(d) => {
            let _ = write!(out, "'{}'", d.format("%Y-%m-%d"));
        }
        SqlValue::DateTime(dt) => {
            if dt.nanosecond() == 0 {
                let _ = write!(out, "'{}'", dt.format("%Y-%m-%d %H:%M:%S"));
            } else {
                let _ = write!(out, "'{}'", dt.format("%Y-%m-%d %H:%M:%S%.6f"));
            }
        }
        SqlValue::Text(s) => write_quoted(out, s),
        SqlValue::Bytes(bytes) => write_hex(out, bytes),
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.reserve(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn write_hex(out: &mut String, bytes: &[u8]) {
    if bytes.is_empty() {
        out.push_str("''");
        return;
    }
    out.reserve(bytes.len() * 2 + 2);
    out.push_str("0x");
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
}
