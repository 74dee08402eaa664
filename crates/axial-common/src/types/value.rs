//! Scalar values.

use super::Dtype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar value of any element type.
///
/// Integers are carried widened to 64 bits; the precise width of a stored
/// property lives in its [`super::ArrayData`] variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A float.
    Float(f64),
    /// A string.
    Str(String),
}

impl Value {
    /// The dtype this value naturally carries.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            Value::Bool(_) => Dtype::Bool,
            Value::Int(_) => Dtype::I64,
            Value::UInt(_) => Dtype::U64,
            Value::Float(_) => Dtype::F64,
            Value::Str(_) => Dtype::Str,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a signed integer, if it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it fits.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Returns the value widened to a float, for any non-string.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// False, zero and the empty string are false-ish; everything else is
    /// truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::UInt(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Parses a raw query token into a value of the requested dtype.
    ///
    /// Booleans accept `true`/`false`; numeric types use the standard Rust
    /// parse for the widened representation and then range-check.
    #[must_use]
    pub fn parse_as(text: &str, dtype: Dtype) -> Option<Value> {
        match dtype {
            Dtype::Bool => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Dtype::I8 => text.parse::<i8>().ok().map(|v| Value::Int(i64::from(v))),
            Dtype::I16 => text.parse::<i16>().ok().map(|v| Value::Int(i64::from(v))),
            Dtype::I32 => text.parse::<i32>().ok().map(|v| Value::Int(i64::from(v))),
            Dtype::I64 => text.parse::<i64>().ok().map(Value::Int),
            Dtype::U8 => text.parse::<u8>().ok().map(|v| Value::UInt(u64::from(v))),
            Dtype::U16 => text.parse::<u16>().ok().map(|v| Value::UInt(u64::from(v))),
            Dtype::U32 => text.parse::<u32>().ok().map(|v| Value::UInt(u64::from(v))),
            Dtype::U64 => text.parse::<u64>().ok().map(Value::UInt),
            Dtype::F32 => text.parse::<f32>().ok().map(|v| Value::Float(f64::from(v))),
            Dtype::F64 => text.parse::<f64>().ok().map(Value::Float),
            Dtype::Str => Some(Value::Str(text.to_string())),
        }
    }

    /// Parses a raw token into the most specific value it can be read as:
    /// boolean, then signed integer, then float, then string.
    ///
    /// Used for defaults given without an explicit dtype.
    #[must_use]
    pub fn from_literal(text: &str) -> Value {
        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(v) = text.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return Value::Float(v);
        }
        Value::Str(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("T".into()).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
    }

    #[test]
    fn test_parse_as_range_checks() {
        assert_eq!(Value::parse_as("200", Dtype::I8), None);
        assert_eq!(Value::parse_as("100", Dtype::I8), Some(Value::Int(100)));
        assert_eq!(Value::parse_as("3.5", Dtype::F64), Some(Value::Float(3.5)));
        assert_eq!(Value::parse_as("yes", Dtype::Bool), None);
    }

    #[test]
    fn test_from_literal_prefers_specific_types() {
        assert_eq!(Value::from_literal("true"), Value::Bool(true));
        assert_eq!(Value::from_literal("42"), Value::Int(42));
        assert_eq!(Value::from_literal("4.5"), Value::Float(4.5));
        assert_eq!(Value::from_literal("red"), Value::Str("red".into()));
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::UInt(3).as_i64(), Some(3));
        assert_eq!(Value::Str("x".into()).as_f64(), None);
    }
}
