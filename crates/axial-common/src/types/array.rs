//! Dense typed arrays.
//!
//! [`ArrayData`] is the owned, runtime-typed vector the whole engine moves
//! around: one variant per [`Dtype`], with monomorphized inner loops
//! expanded through small dispatch macros. Borrowed store data is cloned
//! into one of these before any mutation.

use super::{Dtype, Value};
use crate::utils::error::{Error, QueryError, QueryErrorKind, Result};
use serde::{Deserialize, Serialize};

/// A dense, owned, typed array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    /// Booleans.
    Bool(Vec<bool>),
    /// Signed 8-bit integers.
    I8(Vec<i8>),
    /// Signed 16-bit integers.
    I16(Vec<i16>),
    /// Signed 32-bit integers.
    I32(Vec<i32>),
    /// Signed 64-bit integers.
    I64(Vec<i64>),
    /// Unsigned 8-bit integers.
    U8(Vec<u8>),
    /// Unsigned 16-bit integers.
    U16(Vec<u16>),
    /// Unsigned 32-bit integers.
    U32(Vec<u32>),
    /// Unsigned 64-bit integers.
    U64(Vec<u64>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
    /// Strings.
    Str(Vec<String>),
}

/// Expands an expression once per variant, binding the inner vector.
macro_rules! dispatch {
    ($array:expr, $values:ident => $expr:expr) => {
        match $array {
            ArrayData::Bool($values) => $expr,
            ArrayData::I8($values) => $expr,
            ArrayData::I16($values) => $expr,
            ArrayData::I32($values) => $expr,
            ArrayData::I64($values) => $expr,
            ArrayData::U8($values) => $expr,
            ArrayData::U16($values) => $expr,
            ArrayData::U32($values) => $expr,
            ArrayData::U64($values) => $expr,
            ArrayData::F32($values) => $expr,
            ArrayData::F64($values) => $expr,
            ArrayData::Str($values) => $expr,
        }
    };
}

/// Like [`dispatch!`] but rewraps the result in the same variant.
macro_rules! dispatch_map {
    ($array:expr, $values:ident => $expr:expr) => {
        match $array {
            ArrayData::Bool($values) => ArrayData::Bool($expr),
            ArrayData::I8($values) => ArrayData::I8($expr),
            ArrayData::I16($values) => ArrayData::I16($expr),
            ArrayData::I32($values) => ArrayData::I32($expr),
            ArrayData::I64($values) => ArrayData::I64($expr),
            ArrayData::U8($values) => ArrayData::U8($expr),
            ArrayData::U16($values) => ArrayData::U16($expr),
            ArrayData::U32($values) => ArrayData::U32($expr),
            ArrayData::U64($values) => ArrayData::U64($expr),
            ArrayData::F32($values) => ArrayData::F32($expr),
            ArrayData::F64($values) => ArrayData::F64($expr),
            ArrayData::Str($values) => ArrayData::Str($expr),
        }
    };
}

impl ArrayData {
    /// The element type.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            ArrayData::Bool(_) => Dtype::Bool,
            ArrayData::I8(_) => Dtype::I8,
            ArrayData::I16(_) => Dtype::I16,
            ArrayData::I32(_) => Dtype::I32,
            ArrayData::I64(_) => Dtype::I64,
            ArrayData::U8(_) => Dtype::U8,
            ArrayData::U16(_) => Dtype::U16,
            ArrayData::U32(_) => Dtype::U32,
            ArrayData::U64(_) => Dtype::U64,
            ArrayData::F32(_) => Dtype::F32,
            ArrayData::F64(_) => Dtype::F64,
            ArrayData::Str(_) => Dtype::Str,
        }
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, values => values.len())
    }

    /// True if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An array of `len` default elements (false, zero, empty string).
    #[must_use]
    pub fn new_default(dtype: Dtype, len: usize) -> ArrayData {
        match dtype {
            Dtype::Bool => ArrayData::Bool(vec![false; len]),
            Dtype::I8 => ArrayData::I8(vec![0; len]),
            Dtype::I16 => ArrayData::I16(vec![0; len]),
            Dtype::I32 => ArrayData::I32(vec![0; len]),
            Dtype::I64 => ArrayData::I64(vec![0; len]),
            Dtype::U8 => ArrayData::U8(vec![0; len]),
            Dtype::U16 => ArrayData::U16(vec![0; len]),
            Dtype::U32 => ArrayData::U32(vec![0; len]),
            Dtype::U64 => ArrayData::U64(vec![0; len]),
            Dtype::F32 => ArrayData::F32(vec![0.0; len]),
            Dtype::F64 => ArrayData::F64(vec![0.0; len]),
            Dtype::Str => ArrayData::Str(vec![String::new(); len]),
        }
    }

    /// An array of `len` copies of `value`, coerced to `dtype`.
    pub fn new_filled(dtype: Dtype, len: usize, value: &Value) -> Result<ArrayData> {
        let mut array = ArrayData::new_default(dtype, len);
        for index in 0..len {
            array.set(index, value)?;
        }
        Ok(array)
    }

    /// Builds an array of `dtype` from widened scalar values.
    pub fn from_values(dtype: Dtype, values: &[Value]) -> Result<ArrayData> {
        let mut array = ArrayData::new_default(dtype, values.len());
        for (index, value) in values.iter().enumerate() {
            array.set(index, value)?;
        }
        Ok(array)
    }

    /// The element at `index`, widened to a [`Value`].
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn value(&self, index: usize) -> Value {
        match self {
            ArrayData::Bool(v) => Value::Bool(v[index]),
            ArrayData::I8(v) => Value::Int(i64::from(v[index])),
            ArrayData::I16(v) => Value::Int(i64::from(v[index])),
            ArrayData::I32(v) => Value::Int(i64::from(v[index])),
            ArrayData::I64(v) => Value::Int(v[index]),
            ArrayData::U8(v) => Value::UInt(u64::from(v[index])),
            ArrayData::U16(v) => Value::UInt(u64::from(v[index])),
            ArrayData::U32(v) => Value::UInt(u64::from(v[index])),
            ArrayData::U64(v) => Value::UInt(v[index]),
            ArrayData::F32(v) => Value::Float(f64::from(v[index])),
            ArrayData::F64(v) => Value::Float(v[index]),
            ArrayData::Str(v) => Value::Str(v[index].clone()),
        }
    }

    /// Stores `value` at `index`, narrowing to the array's dtype.
    ///
    /// Fails with `UnsupportedType` when the value cannot be represented
    /// (wrong family, or out of range for the integer width).
    pub fn set(&mut self, index: usize, value: &Value) -> Result<()> {
        let stored = match self {
            ArrayData::Bool(v) => value.as_bool().map(|b| v[index] = b),
            ArrayData::I8(v) => value
                .as_i64()
                .and_then(|n| i8::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::I16(v) => value
                .as_i64()
                .and_then(|n| i16::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::I32(v) => value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::I64(v) => value.as_i64().map(|n| v[index] = n),
            ArrayData::U8(v) => value
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::U16(v) => value
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::U32(v) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(|n| v[index] = n),
            ArrayData::U64(v) => value.as_u64().map(|n| v[index] = n),
            ArrayData::F32(v) => value.as_f64().map(|n| v[index] = n as f32),
            ArrayData::F64(v) => value.as_f64().map(|n| v[index] = n),
            ArrayData::Str(v) => match value {
                Value::Str(s) => Some(v[index] = s.clone()),
                other => Some(v[index] = other.to_string()),
            },
        };
        stored.ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::UnsupportedType,
                format!("the value {value} cannot be stored as {}", self.dtype()),
            ))
        })
    }

    /// A new array holding the elements at `indices`, in order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    #[must_use]
    pub fn gather(&self, indices: &[usize]) -> ArrayData {
        dispatch_map!(self, values => indices.iter().map(|&i| values[i].clone()).collect())
    }

    /// A new array holding the elements where `keep` is true.
    ///
    /// # Panics
    ///
    /// Panics if `keep` is shorter than the array.
    #[must_use]
    pub fn filter(&self, keep: &[bool]) -> ArrayData {
        dispatch_map!(self, values => values
            .iter()
            .zip(keep.iter())
            .filter_map(|(v, &k)| k.then(|| v.clone()))
            .collect())
    }

    /// Per-element truthiness: false, zero and the empty string are false.
    #[must_use]
    pub fn truthy(&self) -> Vec<bool> {
        match self {
            ArrayData::Bool(v) => v.clone(),
            ArrayData::I8(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::I16(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::I32(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::I64(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::U8(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::U16(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::U32(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::U64(v) => v.iter().map(|&x| x != 0).collect(),
            ArrayData::F32(v) => v.iter().map(|&x| x != 0.0).collect(),
            ArrayData::F64(v) => v.iter().map(|&x| x != 0.0).collect(),
            ArrayData::Str(v) => v.iter().map(|s| !s.is_empty()).collect(),
        }
    }

    /// Borrows the strings, if this is a string array.
    #[must_use]
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ArrayData::Str(v) => Some(v),
            _ => None,
        }
    }

    /// All elements widened to `f64`, or `None` for string arrays.
    #[must_use]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        let widened = match self {
            ArrayData::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            ArrayData::I8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::I16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::U8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::U16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::U32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::U64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::F64(v) => v.clone(),
            ArrayData::Str(_) => return None,
        };
        Some(widened)
    }

    /// A new array with every element coerced to `dtype`.
    ///
    /// Strings parse into numeric targets; any element that cannot be
    /// represented fails the whole conversion.
    pub fn cast(&self, dtype: Dtype) -> Result<ArrayData> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }
        let mut out = ArrayData::new_default(dtype, self.len());
        for index in 0..self.len() {
            let value = self.value(index);
            let coerced = match (&value, dtype) {
                (Value::Str(text), target) if target != Dtype::Str => {
                    Value::parse_as(text, target).ok_or_else(|| {
                        Error::Query(QueryError::new(
                            QueryErrorKind::UnsupportedType,
                            format!("the string {text:?} cannot be converted to {target}"),
                        ))
                    })?
                }
                _ => value,
            };
            out.set(index, &coerced)?;
        }
        Ok(out)
    }

    /// Compares every element against a raw operand, producing a mask.
    ///
    /// Numeric arrays parse the operand as a float and compare widened;
    /// boolean arrays accept `true`/`false`; string arrays compare
    /// lexicographically.
    pub fn compare(&self, kind: CompareKind, operand: &str) -> Result<Vec<bool>> {
        match self {
            ArrayData::Str(v) => Ok(v.iter().map(|s| kind.matches_ord(s.as_str().cmp(operand))).collect()),
            ArrayData::Bool(v) => {
                let rhs = match operand {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(Error::Query(QueryError::new(
                            QueryErrorKind::Parse,
                            format!("the value {operand:?} is not a boolean"),
                        )));
                    }
                };
                Ok(v.iter()
                    .map(|&b| kind.matches_ord(b.cmp(&rhs)))
                    .collect())
            }
            _ => {
                let rhs: f64 = operand.parse().map_err(|_| {
                    Error::Query(QueryError::new(
                        QueryErrorKind::Parse,
                        format!("the value {operand:?} is not a number"),
                    ))
                })?;
                let widened = self
                    .to_f64_vec()
                    .ok_or_else(|| Error::Internal("numeric array without floats".into()))?;
                Ok(widened
                    .iter()
                    .map(|&lhs| kind.matches_f64(lhs, rhs))
                    .collect())
            }
        }
    }
}

/// The six ordering comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
}

impl CompareKind {
    /// Applies the comparison to an [`std::cmp::Ordering`].
    #[must_use]
    pub fn matches_ord(self, ordering: std::cmp::Ordering) -> bool {
        match self {
            CompareKind::Less => ordering.is_lt(),
            CompareKind::LessEqual => ordering.is_le(),
            CompareKind::Equal => ordering.is_eq(),
            CompareKind::NotEqual => ordering.is_ne(),
            CompareKind::Greater => ordering.is_gt(),
            CompareKind::GreaterEqual => ordering.is_ge(),
        }
    }

    /// Applies the comparison to two floats.
    #[must_use]
    pub fn matches_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareKind::Less => lhs < rhs,
            CompareKind::LessEqual => lhs <= rhs,
            CompareKind::Equal => lhs == rhs,
            CompareKind::NotEqual => lhs != rhs,
            CompareKind::Greater => lhs > rhs,
            CompareKind::GreaterEqual => lhs >= rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_and_filter() {
        let array = ArrayData::I32(vec![10, 20, 30, 40]);
        assert_eq!(array.gather(&[3, 0]), ArrayData::I32(vec![40, 10]));
        assert_eq!(
            array.filter(&[true, false, true, false]),
            ArrayData::I32(vec![10, 30])
        );
    }

    #[test]
    fn test_truthy() {
        let array = ArrayData::Str(vec!["T".into(), String::new(), "B".into()]);
        assert_eq!(array.truthy(), vec![true, false, true]);
        let array = ArrayData::F64(vec![0.0, 1.5]);
        assert_eq!(array.truthy(), vec![false, true]);
    }

    #[test]
    fn test_set_range_checked() {
        let mut array = ArrayData::I8(vec![0, 0]);
        array.set(0, &Value::Int(100)).unwrap();
        assert!(array.set(1, &Value::Int(1000)).is_err());
        assert_eq!(array.value(0), Value::Int(100));
    }

    #[test]
    fn test_compare_numeric_with_string_operand() {
        let array = ArrayData::I32(vec![10, 20, 30]);
        assert_eq!(
            array.compare(CompareKind::Greater, "15").unwrap(),
            vec![false, true, true]
        );
        assert!(array.compare(CompareKind::Greater, "abc").is_err());
    }

    #[test]
    fn test_compare_strings() {
        let array = ArrayData::Str(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(
            array.compare(CompareKind::Equal, "b").unwrap(),
            vec![false, true, false]
        );
        assert_eq!(
            array.compare(CompareKind::GreaterEqual, "b").unwrap(),
            vec![false, true, true]
        );
    }

    #[test]
    fn test_cast() {
        let array = ArrayData::I32(vec![1, 2]);
        assert_eq!(
            array.cast(Dtype::F64).unwrap(),
            ArrayData::F64(vec![1.0, 2.0])
        );
        assert_eq!(
            array.cast(Dtype::Str).unwrap(),
            ArrayData::Str(vec!["1".into(), "2".into()])
        );
        let strings = ArrayData::Str(vec!["3".into(), "x".into()]);
        assert!(strings.cast(Dtype::I32).is_err());
    }

    #[test]
    fn test_new_filled() {
        let array = ArrayData::new_filled(Dtype::I16, 3, &Value::Int(7)).unwrap();
        assert_eq!(array, ArrayData::I16(vec![7, 7, 7]));
        assert!(ArrayData::new_filled(Dtype::U8, 1, &Value::Int(-1)).is_err());
    }
}
