//! Cell conversion from wire text to typed values

use crate::error::{AthenaError, Result};
use crate::types::column::{ColumnDescriptor, TypeFamily};
use crate::types::value::{TypedRow, Value};
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const TIMESTAMP_TZ_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Raw tokens read as null before any type-specific cast
#[derive(Debug, Clone, Default)]
pub struct NullSentinels {
    global: HashSet<String>,
    per_column: HashMap<String, HashSet<String>>,
}

impl NullSentinels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `token` as null in every column
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.global.insert(token.into());
        self
    }

    /// Treat `token` as null in the named column only
    pub fn with_column_token(mut self, column: impl Into<String>, token: impl Into<String>) -> Self {
        self.per_column
            .entry(column.into())
            .or_default()
            .insert(token.into());
        self
    }

    pub fn is_null(&self, column: &str, raw: &str) -> bool {
        if raw.is_empty() || self.global.contains(raw) {
            return true;
        }
        self.per_column
            .get(column)
            .map(|tokens| tokens.contains(raw))
            .unwrap_or(false)
    }
}

impl<S: Into<String>> FromIterator<S> for NullSentinels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            global: iter.into_iter().map(Into::into).collect(),
            per_column: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeCaster {
    sentinels: NullSentinels,
}

impl TypeCaster {
    pub fn new(sentinels: NullSentinels) -> Self {
        Self { sentinels }
    }

    pub fn sentinels(&self) -> &NullSentinels {
        &self.sentinels
    }

    /// Cast one raw cell according to its column's wire type
    pub fn cast(&self, column: &ColumnDescriptor, raw: Option<&str>) -> Result<Value> {
        let raw = match raw {
            Some(raw) if !self.sentinels.is_null(&column.name, raw) => raw,
            _ => return Ok(Value::Null),
        };

        let fail = |reason: &str| AthenaError::conversion(column.ordinal, &column.wire_type, raw, reason);

        match column.family() {
            TypeFamily::Boolean => match raw {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail("expected 'true' or 'false'")),
            },
            TypeFamily::Integer => raw
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| fail(&e.to_string())),
            TypeFamily::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| fail(&e.to_string())),
            TypeFamily::Decimal { scale, .. } => {
                let value = BigDecimal::from_str(raw).map_err(|e| fail(&e.to_string()))?;
                // Pad to the declared scale; never round away digits.
                let (_, current) = value.as_bigint_and_exponent();
                match scale {
                    Some(scale) if current < i64::from(scale) => {
                        Ok(Value::Decimal(value.with_scale(i64::from(scale))))
                    }
                    _ => Ok(Value::Decimal(value)),
                }
            }
            TypeFamily::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| fail(&e.to_string())),
            TypeFamily::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|e| fail(&e.to_string())),
            TypeFamily::Timestamp => {
                if let Some(ts) = parse_naive_timestamp(raw) {
                    Ok(Value::Timestamp(ts))
                } else if let Some(ts) = parse_offset_timestamp(raw) {
                    Ok(Value::TimestampTz(ts))
                } else {
                    Err(fail("not a timestamp"))
                }
            }
            TypeFamily::TimestampTz => parse_offset_timestamp(raw)
                .map(Value::TimestampTz)
                .ok_or_else(|| fail("not a timestamp with a numeric offset or UTC")),
            TypeFamily::String => Ok(Value::String(raw.to_string())),
            TypeFamily::Binary => Ok(Value::Binary(raw.as_bytes().to_vec())),
            TypeFamily::Array | TypeFamily::Map | TypeFamily::Row => {
                Ok(Value::Structured(raw.to_string()))
            }
        }
    }

    /// Cast a raw row; missing trailing cells become null
    pub fn cast_row(&self, columns: &[ColumnDescriptor], raw: &[Option<String>]) -> Result<TypedRow> {
        if raw.len() > columns.len() {
            let extra = raw[columns.len()].as_deref().unwrap_or("");
            return Err(AthenaError::conversion(
                columns.len() + 1,
                "<none>",
                extra,
                format!("row has {} cells but the result has {} columns", raw.len(), columns.len()),
            ));
        }

        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let cell = raw.get(idx).and_then(|c| c.as_deref());
                self.cast(column, cell)
            })
            .collect::<Result<Vec<Value>>>()?;

        Ok(TypedRow::new(values))
    }
}

fn parse_naive_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn parse_offset_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    if let Some(ts) = TIMESTAMP_TZ_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(ts);
    }

    let (body, zone) = raw.rsplit_once(' ')?;
    if zone == "UTC" || zone == "Z" {
        let naive = parse_naive_timestamp(body)?;
        let utc = FixedOffset::east_opt(0)?;
        return Some(utc.from_utc_datetime(&naive));
    }
    None
}
