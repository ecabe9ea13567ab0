//! Column metadata and wire type families

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Value semantics selected by a wire type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeFamily {
    Boolean,
    Integer,
    Float,
    Decimal { precision: Option<u32>, scale: Option<u32> },
    Date,
    Time,
    Timestamp,
    TimestampTz,
    String,
    Binary,
    Array,
    Map,
    Row,
}

impl TypeFamily {
    /// Classify a wire type such as `decimal(10,1)`, `array(integer)` or the
    /// Hive spellings returned by table metadata (`int`, `struct<a:int>`).
    ///
    /// Unknown names fall back to `String` so the raw text passes through.
    pub fn parse(wire_type: &str) -> Self {
        let normalized = wire_type.trim().to_ascii_lowercase();
        let base = type_family_name(&normalized);

        match base {
            "boolean" => TypeFamily::Boolean,
            "tinyint" | "smallint" | "integer" | "int" | "bigint" => TypeFamily::Integer,
            "float" | "double" | "real" => TypeFamily::Float,
            "decimal" => {
                let (precision, scale) = decimal_parameters(&normalized);
                TypeFamily::Decimal { precision, scale }
            }
            "date" => TypeFamily::Date,
            "time" => TypeFamily::Time,
            "timestamp" => {
                if normalized.contains("with time zone") {
                    TypeFamily::TimestampTz
                } else {
                    TypeFamily::Timestamp
                }
            }
            "varbinary" | "binary" => TypeFamily::Binary,
            "array" => TypeFamily::Array,
            "map" => TypeFamily::Map,
            "row" | "struct" => TypeFamily::Row,
            _ => TypeFamily::String,
        }
    }

    /// Structured literals are passed through as text
    pub fn is_structured(&self) -> bool {
        matches!(self, TypeFamily::Array | TypeFamily::Map | TypeFamily::Row)
    }
}

/// Bare family token of a wire type: `array(integer)` -> `array`,
/// `decimal(10,1)` -> `decimal`, `timestamp with time zone` -> `timestamp`.
pub fn type_family_name(wire_type: &str) -> &str {
    let trimmed = wire_type.trim();
    let end = trimmed
        .find(|c: char| c == '(' || c == '<' || c.is_whitespace())
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

fn decimal_parameters(wire_type: &str) -> (Option<u32>, Option<u32>) {
    let open = match wire_type.find('(') {
        Some(i) => i,
        None => return (None, None),
    };
    let close = wire_type.rfind(')').unwrap_or(wire_type.len());
    if close <= open {
        return (None, None);
    }
    let mut parts = wire_type[open + 1..close].split(',').map(|p| p.trim().parse::<u32>().ok());
    let precision = parts.next().flatten();
    let scale = parts.next().flatten();
    (precision, scale)
}

/// Metadata for one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    /// Wire type name as reported by the service
    #[serde(rename = "type")]
    pub wire_type: String,

    /// 1-based position in the result set
    #[serde(default)]
    pub ordinal: usize,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub precision: Option<u32>,

    #[serde(default)]
    pub scale: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, wire_type: impl Into<String>) -> Self {
        let wire_type = wire_type.into();
        let (precision, scale) = match TypeFamily::parse(&wire_type) {
            TypeFamily::Decimal { precision, scale } => (precision, scale),
            _ => (None, None),
        };
        Self {
            name: name.into(),
            wire_type,
            ordinal: 0,
            nullable: true,
            precision,
            scale,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match TypeFamily::parse(&self.wire_type) {
            TypeFamily::Decimal { precision, scale } => TypeFamily::Decimal {
                precision: precision.or(self.precision),
                scale: scale.or(self.scale),
            },
            family => family,
        }
    }

    /// Reassign ordinals 1..=n and suffix duplicate names deterministically.
    ///
    /// The second `a` becomes `a_1`, the third `a_2`, skipping any suffix
    /// already taken by another column.
    pub fn normalize(columns: Vec<ColumnDescriptor>) -> Vec<ColumnDescriptor> {
        let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut seen: HashSet<String> = HashSet::new();

        columns
            .into_iter()
            .enumerate()
            .map(|(idx, mut column)| {
                column.ordinal = idx + 1;
                if !seen.insert(column.name.clone()) {
                    let mut suffix = 1;
                    let mut candidate = format!("{}_{}", column.name, suffix);
                    while taken.contains(&candidate) {
                        suffix += 1;
                        candidate = format!("{}_{}", column.name, suffix);
                    }
                    taken.insert(candidate.clone());
                    seen.insert(candidate.clone());
                    column.name = candidate;
                }
                if column.precision.is_none() && column.scale.is_none() {
                    if let TypeFamily::Decimal { precision, scale } = TypeFamily::parse(&column.wire_type) {
                        column.precision = precision;
                        column.scale = scale;
                    }
                }
                column
            })
            .collect()
    }
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.wire_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_family_name() {
        assert_eq!(type_family_name("boolean"), "boolean");
        assert_eq!(type_family_name("varchar"), "varchar");
        assert_eq!(type_family_name("array(integer)"), "array");
        assert_eq!(type_family_name("map(integer, integer)"), "map");
        assert_eq!(type_family_name("row(a integer, b integer)"), "row");
        assert_eq!(type_family_name("decimal(10,1)"), "decimal");
        assert_eq!(type_family_name("timestamp with time zone"), "timestamp");
        assert_eq!(type_family_name("struct<a:int>"), "struct");
    }

    #[test]
    fn test_parse_families() {
        assert_eq!(TypeFamily::parse("tinyint"), TypeFamily::Integer);
        assert_eq!(TypeFamily::parse("int"), TypeFamily::Integer);
        assert_eq!(TypeFamily::parse("real"), TypeFamily::Float);
        assert_eq!(TypeFamily::parse("varchar(10)"), TypeFamily::String);
        assert_eq!(TypeFamily::parse("string"), TypeFamily::String);
        assert_eq!(TypeFamily::parse("json"), TypeFamily::String);
        assert_eq!(TypeFamily::parse("binary"), TypeFamily::Binary);
        assert_eq!(TypeFamily::parse("struct<a:int,b:string>"), TypeFamily::Row);
        assert_eq!(TypeFamily::parse("timestamp with time zone"), TypeFamily::TimestampTz);
        assert_eq!(
            TypeFamily::parse("decimal(10,1)"),
            TypeFamily::Decimal { precision: Some(10), scale: Some(1) }
        );
        assert_eq!(
            TypeFamily::parse("decimal"),
            TypeFamily::Decimal { precision: None, scale: None }
        );
    }

    #[test]
    fn test_normalize_suffixes_duplicates() {
        let columns = ColumnDescriptor::normalize(vec![
            ColumnDescriptor::new("a", "integer"),
            ColumnDescriptor::new("a", "integer"),
            ColumnDescriptor::new("a_1", "varchar"),
            ColumnDescriptor::new("a", "integer"),
        ]);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a_2", "a_1", "a_3"]);
        let ordinals: Vec<usize> = columns.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decimal_precision_from_wire_type() {
        let column = ColumnDescriptor::new("amount", "decimal(12,4)");
        assert_eq!(column.precision, Some(12));
        assert_eq!(column.scale, Some(4));
    }
}
