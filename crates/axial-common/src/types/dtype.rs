//! Element types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of element types a property array may hold.
///
/// Matches the types the store may surface: booleans, signed and unsigned
/// integers up to 64 bits, 32/64-bit floats, and strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    /// Boolean.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// UTF-8 string.
    Str,
}

impl Dtype {
    /// Parses a dtype name as written in queries (`Int32`, `Float64`, ...).
    ///
    /// The lowercase Rust spellings (`i32`, `f64`, `bool`, `str`) are
    /// accepted as well.
    #[must_use]
    pub fn parse(text: &str) -> Option<Dtype> {
        let dtype = match text {
            "Bool" | "bool" => Dtype::Bool,
            "Int8" | "i8" => Dtype::I8,
            "Int16" | "i16" => Dtype::I16,
            "Int32" | "i32" => Dtype::I32,
            "Int64" | "i64" => Dtype::I64,
            "UInt8" | "u8" => Dtype::U8,
            "UInt16" | "u16" => Dtype::U16,
            "UInt32" | "u32" => Dtype::U32,
            "UInt64" | "u64" => Dtype::U64,
            "Float32" | "f32" => Dtype::F32,
            "Float64" | "f64" => Dtype::F64,
            "String" | "str" => Dtype::Str,
            _ => return None,
        };
        Some(dtype)
    }

    /// Returns true for any integer or float type.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Dtype::Bool | Dtype::Str)
    }

    /// Returns true for any integer type.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Dtype::I8
                | Dtype::I16
                | Dtype::I32
                | Dtype::I64
                | Dtype::U8
                | Dtype::U16
                | Dtype::U32
                | Dtype::U64
        )
    }

    /// Returns true for the float types.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Dtype::F32 | Dtype::F64)
    }

    /// The smallest unsigned integer type that can hold `count`.
    ///
    /// Used to size counting matrices: no count can exceed the number of
    /// counted elements.
    #[must_use]
    pub fn smallest_unsigned_for(count: usize) -> Dtype {
        if count <= usize::from(u8::MAX) {
            Dtype::U8
        } else if count <= usize::from(u16::MAX) {
            Dtype::U16
        } else if count as u64 <= u64::from(u32::MAX) {
            Dtype::U32
        } else {
            Dtype::U64
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::Bool => "Bool",
            Dtype::I8 => "Int8",
            Dtype::I16 => "Int16",
            Dtype::I32 => "Int32",
            Dtype::I64 => "Int64",
            Dtype::U8 => "UInt8",
            Dtype::U16 => "UInt16",
            Dtype::U32 => "UInt32",
            Dtype::U64 => "UInt64",
            Dtype::F32 => "Float32",
            Dtype::F64 => "Float64",
            Dtype::Str => "String",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for dtype in [
            Dtype::Bool,
            Dtype::I8,
            Dtype::I16,
            Dtype::I32,
            Dtype::I64,
            Dtype::U8,
            Dtype::U16,
            Dtype::U32,
            Dtype::U64,
            Dtype::F32,
            Dtype::F64,
            Dtype::Str,
        ] {
            assert_eq!(Dtype::parse(&dtype.to_string()), Some(dtype));
        }
        assert_eq!(Dtype::parse("Complex128"), None);
    }

    #[test]
    fn test_smallest_unsigned() {
        assert_eq!(Dtype::smallest_unsigned_for(0), Dtype::U8);
        assert_eq!(Dtype::smallest_unsigned_for(255), Dtype::U8);
        assert_eq!(Dtype::smallest_unsigned_for(256), Dtype::U16);
        assert_eq!(Dtype::smallest_unsigned_for(70_000), Dtype::U32);
        assert_eq!(Dtype::smallest_unsigned_for(5_000_000_000), Dtype::U64);
    }

    #[test]
    fn test_classification() {
        assert!(Dtype::I32.is_numeric());
        assert!(Dtype::I32.is_integer());
        assert!(!Dtype::I32.is_float());
        assert!(Dtype::F32.is_float());
        assert!(!Dtype::Str.is_numeric());
        assert!(!Dtype::Bool.is_numeric());
    }
}
