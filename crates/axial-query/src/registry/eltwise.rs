//! Built-in element-wise operations.

use super::{EltwiseOperation, Params};
use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::{ArrayData, Dtype};
use std::sync::Arc;

/// Widens to `f64`, applies `transform`, and narrows back to the input
/// dtype (float-to-integer narrowing saturates).
fn map_in_f64(values: &ArrayData, transform: impl Fn(f64) -> f64) -> Result<ArrayData> {
    let mapped = match values {
        ArrayData::Bool(v) => ArrayData::Bool(
            v.iter()
                .map(|&x| transform(if x { 1.0 } else { 0.0 }) != 0.0)
                .collect(),
        ),
        ArrayData::I8(v) => ArrayData::I8(v.iter().map(|&x| transform(f64::from(x)) as i8).collect()),
        ArrayData::I16(v) => {
            ArrayData::I16(v.iter().map(|&x| transform(f64::from(x)) as i16).collect())
        }
        ArrayData::I32(v) => {
            ArrayData::I32(v.iter().map(|&x| transform(f64::from(x)) as i32).collect())
        }
        ArrayData::I64(v) => ArrayData::I64(v.iter().map(|&x| transform(x as f64) as i64).collect()),
        ArrayData::U8(v) => ArrayData::U8(v.iter().map(|&x| transform(f64::from(x)) as u8).collect()),
        ArrayData::U16(v) => {
            ArrayData::U16(v.iter().map(|&x| transform(f64::from(x)) as u16).collect())
        }
        ArrayData::U32(v) => {
            ArrayData::U32(v.iter().map(|&x| transform(f64::from(x)) as u32).collect())
        }
        ArrayData::U64(v) => ArrayData::U64(v.iter().map(|&x| transform(x as f64) as u64).collect()),
        ArrayData::F32(v) => {
            ArrayData::F32(v.iter().map(|&x| transform(f64::from(x)) as f32).collect())
        }
        ArrayData::F64(v) => ArrayData::F64(v.iter().map(|&x| transform(x)).collect()),
        ArrayData::Str(_) => {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::UnsupportedType,
                "a numeric operation cannot be applied to strings",
            )));
        }
    };
    Ok(mapped)
}

/// Widens to `f64` and keeps the result as `Float64`.
fn map_to_f64(values: &ArrayData, transform: impl Fn(f64) -> f64) -> Result<ArrayData> {
    let widened = values.to_f64_vec().ok_or_else(|| {
        Error::Query(QueryError::new(
            QueryErrorKind::UnsupportedType,
            "a numeric operation cannot be applied to strings",
        ))
    })?;
    Ok(ArrayData::F64(widened.into_iter().map(transform).collect()))
}

/// Absolute value, preserving the element type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Abs;

pub(super) fn abs_factory(_params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    Ok(Arc::new(Abs))
}

impl EltwiseOperation for Abs {
    fn result_dtype(&self, input: Dtype) -> Dtype {
        input
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        map_in_f64(values, f64::abs)
    }
}

/// Clamps values into `[min, max]`, preserving the element type.
#[derive(Debug, Clone, Copy)]
pub struct Clamp {
    /// The lower bound, if any.
    pub min: Option<f64>,
    /// The upper bound, if any.
    pub max: Option<f64>,
}

pub(super) fn clamp_factory(params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    Ok(Arc::new(Clamp {
        min: params.f64("min")?,
        max: params.f64("max")?,
    }))
}

impl EltwiseOperation for Clamp {
    fn result_dtype(&self, input: Dtype) -> Dtype {
        input
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        let (min, max) = (self.min, self.max);
        map_in_f64(values, move |x| {
            let low = min.map_or(x, |m| x.max(m));
            max.map_or(low, |m| low.min(m))
        })
    }
}

/// Converts every element to another element type.
///
/// Strings parse into numeric targets and anything formats into a string
/// target, so this is the one built-in eltwise operation accepting string
/// inputs.
#[derive(Debug, Clone, Copy)]
pub struct Convert {
    /// The target element type.
    pub dtype: Dtype,
}

pub(super) fn convert_factory(params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    let dtype = params.dtype("type")?.ok_or_else(|| {
        Error::Query(QueryError::new(
            QueryErrorKind::Parse,
            "Convert requires a type parameter",
        ))
    })?;
    Ok(Arc::new(Convert { dtype }))
}

impl EltwiseOperation for Convert {
    fn supports_strings(&self) -> bool {
        true
    }

    fn result_dtype(&self, _input: Dtype) -> Dtype {
        self.dtype
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        values.cast(self.dtype)
    }
}

/// Each value divided by the total of all values.
///
/// A zero total maps everything to zero rather than dividing by it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fraction;

pub(super) fn fraction_factory(_params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    Ok(Arc::new(Fraction))
}

impl EltwiseOperation for Fraction {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        let widened = values.to_f64_vec().ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::UnsupportedType,
                "Fraction cannot be applied to strings",
            ))
        })?;
        let total: f64 = widened.iter().sum();
        if total == 0.0 {
            return Ok(ArrayData::F64(vec![0.0; widened.len()]));
        }
        Ok(ArrayData::F64(
            widened.into_iter().map(|x| x / total).collect(),
        ))
    }
}

/// Logarithm in an arbitrary base, with an additive epsilon for zeros.
#[derive(Debug, Clone, Copy)]
pub struct Log {
    /// The logarithm base.
    pub base: f64,
    /// Added to every value before taking the logarithm.
    pub eps: f64,
}

pub(super) fn log_factory(params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    let base = match params.get("base") {
        Some("e") | None => std::f64::consts::E,
        Some(raw) => raw.parse().map_err(|_| {
            Error::Query(QueryError::new(
                QueryErrorKind::Parse,
                format!("invalid number {raw} for the parameter base"),
            ))
        })?,
    };
    Ok(Arc::new(Log {
        base,
        eps: params.f64("eps")?.unwrap_or(0.0),
    }))
}

impl EltwiseOperation for Log {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        let (base, eps) = (self.base, self.eps);
        map_to_f64(values, move |x| (x + eps).log(base))
    }
}

/// Rounds floats to the nearest integer; integers pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Round;

pub(super) fn round_factory(_params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    Ok(Arc::new(Round))
}

impl EltwiseOperation for Round {
    fn result_dtype(&self, input: Dtype) -> Dtype {
        if input.is_float() { Dtype::I64 } else { input }
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        if values.dtype().is_float() {
            let widened = values.to_f64_vec().expect("floats widen");
            return Ok(ArrayData::I64(
                widened.into_iter().map(|x| x.round() as i64).collect(),
            ));
        }
        if values.dtype() == Dtype::Str {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::UnsupportedType,
                "a numeric operation cannot be applied to strings",
            )));
        }
        // Integers and booleans are kept as-is; widening 64-bit values
        // through f64 would corrupt anything past 2^53.
        Ok(values.clone())
    }
}

/// Square root, widening to `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqrt;

pub(super) fn sqrt_factory(_params: &mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>> {
    Ok(Arc::new(Sqrt))
}

impl EltwiseOperation for Sqrt {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn apply(&self, values: &ArrayData) -> Result<ArrayData> {
        map_to_f64(values, f64::sqrt)
    }
}
