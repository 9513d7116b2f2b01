//! Typed field values and their canonical string forms.
//!
//! Result sources report a declared [`ColumnKind`] per column and a
//! [`FieldValue`] per cell. [`render`] turns the pair into the string stored
//! in a [`crate::ResultTable`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConversionError;

/// Declared type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Bit,
    /// TINYINT, SMALLINT and INTEGER
    Integer,
    BigInt,
    Float,
    /// REAL and DOUBLE
    Double,
    /// Exact numerics (DECIMAL / NUMERIC)
    Decimal,
    /// CHAR, VARCHAR, TEXT and anything without a native mapping
    Text,
    Date,
    Time,
    Timestamp,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Bit => "bit",
            ColumnKind::Integer => "integer",
            ColumnKind::BigInt => "bigint",
            ColumnKind::Float => "float",
            ColumnKind::Double => "double",
            ColumnKind::Decimal => "decimal",
            ColumnKind::Text => "text",
            ColumnKind::Date => "date",
            ColumnKind::Time => "time",
            ColumnKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A native value read from a result source.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bit(u8),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    fn variant_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bit(_) => "bit",
            FieldValue::Int(_) => "integer",
            FieldValue::BigInt(_) => "bigint",
            FieldValue::Float(_) => "float",
            FieldValue::Double(_) => "double",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }
}

/// Metadata for one source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Render `value` as the canonical string for a column declared as `kind`.
///
/// `NULL` renders as the empty string for every kind. Integral values may
/// widen (an `Int` in a `BigInt` column) but any other mismatch between the
/// declared kind and the value is a conversion failure.
pub fn render(column: &str, kind: ColumnKind, value: &FieldValue) -> Result<String, ConversionError> {
    let rendered = match (kind, value) {
        (_, FieldValue::Null) => String::new(),
        (ColumnKind::Bit, FieldValue::Bit(b)) => b.to_string(),
        (ColumnKind::Integer, FieldValue::Int(i)) => i.to_string(),
        (ColumnKind::BigInt, FieldValue::Int(i)) => i.to_string(),
        (ColumnKind::BigInt, FieldValue::BigInt(i)) => i.to_string(),
        // Debug keeps the fractional part ("1.0"), Display would drop it.
        (ColumnKind::Float, FieldValue::Float(f)) => format!("{:?}", f),
        (ColumnKind::Double, FieldValue::Float(f)) => format!("{:?}", f64::from(*f)),
        (ColumnKind::Double, FieldValue::Double(d)) => format!("{:?}", d),
        (ColumnKind::Decimal, FieldValue::Decimal(d)) => d.to_string(),
        (ColumnKind::Text, FieldValue::Text(s)) => s.clone(),
        (ColumnKind::Date, FieldValue::Date(d)) => d.format("%Y-%m-%d").to_string(),
        (ColumnKind::Time, FieldValue::Time(t)) => t.format("%H:%M:%S").to_string(),
        (ColumnKind::Timestamp, FieldValue::Timestamp(ts)) => ts.to_string(),
        (kind, other) => {
            return Err(ConversionError::KindMismatch {
                column: column.to_string(),
                expected: kind.to_string(),
                found: other.variant_name().to_string(),
            })
        }
    };
    Ok(rendered)
}
