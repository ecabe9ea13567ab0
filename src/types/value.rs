//! Typed cell values and rows

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::ops::Index;

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    /// IEEE double; `NaN` is a value here, not a null
    Float(f64),
    /// Arbitrary precision; carries the scale it was read with
    Decimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    String(String),
    Binary(Vec<u8>),
    /// Textual literal of an array, map or row
    Structured(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for a float not-a-number
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Structured(s) => Some(s),
            _ => None,
        }
    }
}

/// Renders values in the service's textual form, so a rendered value casts
/// back to an equal value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_nan() => write!(f, "NaN"),
            Value::Float(v) if v.is_infinite() => {
                write!(f, "{}", if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d.to_plain_string()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => {
                let pattern = format!("%H:%M:%S{}", fraction_format(t.nanosecond()));
                write!(f, "{}", t.format(&pattern))
            }
            Value::Timestamp(ts) => {
                let pattern = format!("%Y-%m-%d %H:%M:%S{}", fraction_format(ts.nanosecond()));
                write!(f, "{}", ts.format(&pattern))
            }
            Value::TimestampTz(ts) => {
                let pattern = format!("%Y-%m-%d %H:%M:%S{} %:z", fraction_format(ts.nanosecond()));
                write!(f, "{}", ts.format(&pattern))
            }
            Value::String(s) | Value::Structured(s) => write!(f, "{}", s),
            Value::Binary(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Milliseconds unless the value carries finer digits
fn fraction_format(nanos: u32) -> &'static str {
    if nanos % 1_000_000 == 0 {
        "%.3f"
    } else if nanos % 1_000 == 0 {
        "%.6f"
    } else {
        "%.9f"
    }
}

/// One result row, always as wide as the result's column list
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow(Vec<Value>);

impl TypedRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl Index<usize> for TypedRow {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.0[idx]
    }
}

impl From<Vec<Value>> for TypedRow {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}
