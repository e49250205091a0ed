//! Literal scalar values.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime};

use crate::types::{DataType, IntervalUnit};

/// A literal scalar value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Interval { value: i64, unit: IntervalUnit },
}

impl Value {
    pub fn interval(value: i64, unit: IntervalUnit) -> Self {
        Value::Interval { value, unit }
    }

    /// Infer the narrowest type that holds this value.
    pub fn infer_type(&self) -> DataType {
        match self {
            Value::Null => DataType::null(),
            Value::Boolean(_) => DataType::boolean(),
            Value::Int(v) => {
                if i8::try_from(*v).is_ok() {
                    DataType::int8()
                } else if i16::try_from(*v).is_ok() {
                    DataType::int16()
                } else if i32::try_from(*v).is_ok() {
                    DataType::int32()
                } else {
                    DataType::int64()
                }
            }
            Value::Float(_) => DataType::float64(),
            Value::String(_) => DataType::string(),
            Value::Date(_) => DataType::date(),
            Value::Timestamp(_) => DataType::timestamp(),
            Value::Interval { unit, .. } => DataType::interval(*unit),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (
                Value::Interval { value: a, unit: u },
                Value::Interval { value: b, unit: v },
            ) => a == b && u == v,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Interval { value, unit } => {
                value.hash(state);
                unit.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Interval { value, unit } => write!(f, "{}{}", value, unit.code()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_integer_inference_picks_smallest_width() {
        assert_eq!(Value::Int(1).infer_type(), DataType::int8());
        assert_eq!(Value::Int(-200).infer_type(), DataType::int16());
        assert_eq!(Value::Int(70_000).infer_type(), DataType::int32());
        assert_eq!(Value::Int(i64::MAX).infer_type(), DataType::int64());
    }

    #[test]
    fn test_other_inference() {
        assert_eq!(Value::Float(1.5).infer_type(), DataType::float64());
        assert_eq!(Value::from("x").infer_type(), DataType::string());
        assert_eq!(Value::Null.infer_type(), DataType::null());
        assert_eq!(
            Value::interval(3, IntervalUnit::Day).infer_type(),
            DataType::interval(IntervalUnit::Day)
        );
    }

    #[test]
    fn test_float_equality_is_total() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        let set: HashSet<Value> = [Value::Float(0.5), Value::Float(0.5), Value::Int(1)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_int_and_float_are_distinct() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::from("it's").to_string(), r"'it\'s'");
        assert_eq!(Value::from(r"a\'b").to_string(), r"'a\\\'b'");
        assert_eq!(Value::from(r"a\").to_string(), r"'a\\'");
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(Value::from(date).to_string(), "2020-01-31");
        assert_eq!(Value::interval(2, IntervalUnit::Hour).to_string(), "2h");
    }
}
