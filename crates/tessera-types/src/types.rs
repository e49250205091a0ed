//! Type definitions for Tessera.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SchemaError, TypeParseError};

/// Unit of an interval type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntervalUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl IntervalUnit {
    /// Short code used in the canonical type text, e.g. `interval('D')`.
    pub fn code(&self) -> &'static str {
        match self {
            IntervalUnit::Year => "Y",
            IntervalUnit::Quarter => "Q",
            IntervalUnit::Month => "M",
            IntervalUnit::Week => "W",
            IntervalUnit::Day => "D",
            IntervalUnit::Hour => "h",
            IntervalUnit::Minute => "m",
            IntervalUnit::Second => "s",
            IntervalUnit::Millisecond => "ms",
            IntervalUnit::Microsecond => "us",
            IntervalUnit::Nanosecond => "ns",
        }
    }

    /// Parse a short unit code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "Y" => IntervalUnit::Year,
            "Q" => IntervalUnit::Quarter,
            "M" => IntervalUnit::Month,
            "W" => IntervalUnit::Week,
            "D" => IntervalUnit::Day,
            "h" => IntervalUnit::Hour,
            "m" => IntervalUnit::Minute,
            "s" => IntervalUnit::Second,
            "ms" => IntervalUnit::Millisecond,
            "us" => IntervalUnit::Microsecond,
            "ns" => IntervalUnit::Nanosecond,
            _ => return None,
        })
    }

    /// SQL keyword for this unit.
    pub fn sql_name(&self) -> &'static str {
        match self {
            IntervalUnit::Year => "YEAR",
            IntervalUnit::Quarter => "QUARTER",
            IntervalUnit::Month => "MONTH",
            IntervalUnit::Week => "WEEK",
            IntervalUnit::Day => "DAY",
            IntervalUnit::Hour => "HOUR",
            IntervalUnit::Minute => "MINUTE",
            IntervalUnit::Second => "SECOND",
            IntervalUnit::Millisecond => "MILLISECOND",
            IntervalUnit::Microsecond => "MICROSECOND",
            IntervalUnit::Nanosecond => "NANOSECOND",
        }
    }
}

/// The shape-independent part of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Null,
    Boolean,
    // Integers
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    // Floating point
    Float32,
    Float64,
    Decimal {
        precision: Option<u8>,
        scale: Option<u8>,
    },
    String,
    Binary,
    // Temporal
    Date,
    Time,
    Timestamp { timezone: Option<String> },
    Interval { unit: IntervalUnit },
    // Nested
    Array(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Struct(Vec<(String, DataType)>),
    // Bucketed values produced by binning
    Category { cardinality: Option<u64> },
}

/// A value type. Nullability is part of the type's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataType {
    kind: TypeKind,
    nullable: bool,
}

impl DataType {
    /// Create a nullable type of the given kind.
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    pub fn null() -> Self {
        Self::new(TypeKind::Null)
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub fn int8() -> Self {
        Self::new(TypeKind::Int8)
    }

    pub fn int16() -> Self {
        Self::new(TypeKind::Int16)
    }

    pub fn int32() -> Self {
        Self::new(TypeKind::Int32)
    }

    pub fn int64() -> Self {
        Self::new(TypeKind::Int64)
    }

    pub fn uint64() -> Self {
        Self::new(TypeKind::UInt64)
    }

    pub fn float32() -> Self {
        Self::new(TypeKind::Float32)
    }

    pub fn float64() -> Self {
        Self::new(TypeKind::Float64)
    }

    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self::new(TypeKind::Decimal {
            precision: Some(precision),
            scale: Some(scale),
        })
    }

    pub fn string() -> Self {
        Self::new(TypeKind::String)
    }

    pub fn binary() -> Self {
        Self::new(TypeKind::Binary)
    }

    pub fn date() -> Self {
        Self::new(TypeKind::Date)
    }

    pub fn time() -> Self {
        Self::new(TypeKind::Time)
    }

    pub fn timestamp() -> Self {
        Self::new(TypeKind::Timestamp { timezone: None })
    }

    pub fn timestamp_tz(timezone: impl Into<String>) -> Self {
        Self::new(TypeKind::Timestamp {
            timezone: Some(timezone.into()),
        })
    }

    pub fn interval(unit: IntervalUnit) -> Self {
        Self::new(TypeKind::Interval { unit })
    }

    pub fn array(value_type: DataType) -> Self {
        Self::new(TypeKind::Array(Box::new(value_type)))
    }

    pub fn map(key_type: DataType, value_type: DataType) -> Self {
        Self::new(TypeKind::Map(Box::new(key_type), Box::new(value_type)))
    }

    /// Build a struct type. Field order is kept as given and is part of the
    /// type's identity; field names must be unique.
    pub fn struct_of<I, S>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut out: Vec<(String, DataType)> = Vec::new();
        for (name, ty) in fields {
            let name = name.into();
            if out.iter().any(|(existing, _)| *existing == name) {
                return Err(SchemaError::DuplicateName(name));
            }
            out.push((name, ty));
        }
        Ok(Self::new(TypeKind::Struct(out)))
    }

    pub fn category(cardinality: Option<u64>) -> Self {
        Self::new(TypeKind::Category { cardinality })
    }

    /// Parse the canonical textual form of a type.
    pub fn parse(text: &str) -> Result<Self, TypeParseError> {
        crate::parser::parse_type(text)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Return a copy of this type with the given nullability.
    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            kind: self.kind.clone(),
            nullable,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, TypeKind::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Boolean)
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Int8 | TypeKind::Int16 | TypeKind::Int32 | TypeKind::Int64
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::UInt8 | TypeKind::UInt16 | TypeKind::UInt32 | TypeKind::UInt64
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.kind, TypeKind::Float32 | TypeKind::Float64)
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self.kind, TypeKind::Decimal { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating() || self.is_decimal()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, TypeKind::String)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Date | TypeKind::Time | TypeKind::Timestamp { .. }
        )
    }

    pub fn is_interval(&self) -> bool {
        matches!(self.kind, TypeKind::Interval { .. })
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Array(_) | TypeKind::Map(_, _) | TypeKind::Struct(_)
        )
    }

    /// Whether values of this type have a total order usable for sorting
    /// and range window frames.
    pub fn is_orderable(&self) -> bool {
        self.is_numeric() || self.is_temporal() || self.is_string() || self.is_boolean()
    }

    /// Bit width of fixed-width numeric types.
    pub fn bit_width(&self) -> Option<u32> {
        Some(match self.kind {
            TypeKind::Int8 | TypeKind::UInt8 => 8,
            TypeKind::Int16 | TypeKind::UInt16 => 16,
            TypeKind::Int32 | TypeKind::UInt32 | TypeKind::Float32 => 32,
            TypeKind::Int64 | TypeKind::UInt64 | TypeKind::Float64 => 64,
            _ => return None,
        })
    }
}

impl From<TypeKind> for DataType {
    fn from(kind: TypeKind) -> Self {
        DataType::new(kind)
    }
}

impl FromStr for DataType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::parse(s)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.nullable {
            write!(f, "!")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Null => write!(f, "null"),
            TypeKind::Boolean => write!(f, "boolean"),
            TypeKind::Int8 => write!(f, "int8"),
            TypeKind::Int16 => write!(f, "int16"),
            TypeKind::Int32 => write!(f, "int32"),
            TypeKind::Int64 => write!(f, "int64"),
            TypeKind::UInt8 => write!(f, "uint8"),
            TypeKind::UInt16 => write!(f, "uint16"),
            TypeKind::UInt32 => write!(f, "uint32"),
            TypeKind::UInt64 => write!(f, "uint64"),
            TypeKind::Float32 => write!(f, "float32"),
            TypeKind::Float64 => write!(f, "float64"),
            TypeKind::Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "decimal({}, {})", p, s),
            TypeKind::Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "decimal({})", p),
            TypeKind::Decimal {
                precision: None,
                scale: Some(s),
            } => write!(f, "decimal(scale: {})", s),
            TypeKind::Decimal { .. } => write!(f, "decimal"),
            TypeKind::String => write!(f, "string"),
            TypeKind::Binary => write!(f, "binary"),
            TypeKind::Date => write!(f, "date"),
            TypeKind::Time => write!(f, "time"),
            TypeKind::Timestamp { timezone: None } => write!(f, "timestamp"),
            TypeKind::Timestamp { timezone: Some(tz) } => {
                write!(f, "timestamp({})", quote_text(tz))
            }
            TypeKind::Interval { unit } => write!(f, "interval('{}')", unit.code()),
            TypeKind::Array(inner) => write!(f, "array<{}>", inner),
            TypeKind::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            TypeKind::Struct(fields) => {
                write!(f, "struct<")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field_name(name), ty)?;
                }
                write!(f, ">")
            }
            TypeKind::Category { cardinality: None } => write!(f, "category"),
            TypeKind::Category {
                cardinality: Some(n),
            } => write!(f, "category({})", n),
        }
    }
}

/// Field names that are not plain identifiers are written quoted.
fn field_name(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if plain {
        name.to_string()
    } else {
        quote_text(name)
    }
}

fn quote_text(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        DataType::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_primitives() {
        assert_eq!(DataType::int64().to_string(), "int64");
        assert_eq!(DataType::int64().with_nullable(false).to_string(), "!int64");
        assert_eq!(DataType::decimal(15, 3).to_string(), "decimal(15, 3)");
        assert_eq!(DataType::timestamp_tz("UTC").to_string(), "timestamp('UTC')");
        assert_eq!(DataType::interval(IntervalUnit::Day).to_string(), "interval('D')");
    }

    #[test]
    fn test_display_nested() {
        let ty = DataType::array(
            DataType::struct_of([
                ("a", DataType::array(DataType::string())),
                (
                    "b",
                    DataType::map(DataType::string(), DataType::array(DataType::int64())),
                ),
            ])
            .unwrap(),
        );
        assert_eq!(
            ty.to_string(),
            "array<struct<a: array<string>, b: map<string, array<int64>>>>"
        );
    }

    #[test]
    fn test_quoted_field_names() {
        let ty = DataType::struct_of([("my field", DataType::int8())]).unwrap();
        assert_eq!(ty.to_string(), "struct<'my field': int8>");
    }

    #[test]
    fn test_struct_rejects_duplicate_fields() {
        let err = DataType::struct_of([("a", DataType::int8()), ("a", DataType::string())]);
        assert!(matches!(err, Err(SchemaError::DuplicateName(name)) if name == "a"));
    }

    #[test]
    fn test_struct_field_order_is_identity() {
        let ab = DataType::struct_of([("a", DataType::int8()), ("b", DataType::string())]).unwrap();
        let ba = DataType::struct_of([("b", DataType::string()), ("a", DataType::int8())]).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_nullability_is_identity() {
        assert_ne!(DataType::int32(), DataType::int32().with_nullable(false));
    }

    #[test]
    fn test_serde_uses_canonical_text() {
        let ty = DataType::map(DataType::string(), DataType::float64());
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, "\"map<string, float64>\"");
        let back: DataType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
