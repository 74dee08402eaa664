//! Built-in reduction operations.

use super::{Params, ReductionOperation};
use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::{ArrayData, Dtype, Value};
use std::sync::Arc;

fn widened(values: &ArrayData, operation: &str) -> Result<Vec<f64>> {
    values.to_f64_vec().ok_or_else(|| {
        Error::Query(QueryError::new(
            QueryErrorKind::UnsupportedType,
            format!("{operation} cannot be applied to strings"),
        ))
    })
}

/// The result type a numeric reduction naturally sums into: signed
/// integers widen to `Int64`, unsigned (and booleans) to `UInt64`, floats
/// to `Float64`.
fn accumulator_dtype(input: Dtype) -> Dtype {
    match input {
        Dtype::F32 | Dtype::F64 => Dtype::F64,
        Dtype::I8 | Dtype::I16 | Dtype::I32 | Dtype::I64 => Dtype::I64,
        _ => Dtype::U64,
    }
}

fn zero_of(dtype: Dtype) -> Value {
    match dtype {
        Dtype::F32 | Dtype::F64 => Value::Float(0.0),
        Dtype::I8 | Dtype::I16 | Dtype::I32 | Dtype::I64 => Value::Int(0),
        Dtype::Bool => Value::Bool(false),
        Dtype::Str => Value::Str(String::new()),
        _ => Value::UInt(0),
    }
}

/// Sums all values; `type` overrides the result element type.
#[derive(Debug, Clone, Copy)]
pub struct Sum {
    /// Overrides the result element type.
    pub dtype: Option<Dtype>,
}

pub(super) fn sum_factory(params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Sum {
        dtype: params.dtype("type")?,
    }))
}

impl ReductionOperation for Sum {
    fn result_dtype(&self, input: Dtype) -> Dtype {
        self.dtype.unwrap_or_else(|| accumulator_dtype(input))
    }

    fn empty_value(&self, result: Dtype) -> Option<Value> {
        Some(zero_of(result))
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        let value = match values {
            ArrayData::F32(_) | ArrayData::F64(_) => {
                Value::Float(widened(values, "Sum")?.iter().sum())
            }
            ArrayData::Bool(v) => Value::UInt(v.iter().filter(|&&b| b).count() as u64),
            ArrayData::I8(_) | ArrayData::I16(_) | ArrayData::I32(_) | ArrayData::I64(_) => {
                let mut total: i64 = 0;
                for index in 0..values.len() {
                    let element = values.value(index).as_i64().unwrap_or(0);
                    total = total.saturating_add(element);
                }
                Value::Int(total)
            }
            ArrayData::U8(_) | ArrayData::U16(_) | ArrayData::U32(_) | ArrayData::U64(_) => {
                let mut total: u64 = 0;
                for index in 0..values.len() {
                    let element = values.value(index).as_u64().unwrap_or(0);
                    total = total.saturating_add(element);
                }
                Value::UInt(total)
            }
            ArrayData::Str(_) => {
                return Err(Error::Query(QueryError::new(
                    QueryErrorKind::UnsupportedType,
                    "Sum cannot be applied to strings",
                )));
            }
        };
        Ok(value)
    }
}

/// The arithmetic mean, as `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

pub(super) fn mean_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Mean))
}

impl ReductionOperation for Mean {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        let widened = widened(values, "Mean")?;
        Ok(Value::Float(
            widened.iter().sum::<f64>() / widened.len() as f64,
        ))
    }
}

/// The smallest value; strings compare lexicographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

pub(super) fn min_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Min))
}

/// The largest value; strings compare lexicographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

pub(super) fn max_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Max))
}

fn extremum(values: &ArrayData, want_max: bool, operation: &str) -> Result<Value> {
    if let Some(strings) = values.as_strings() {
        let found = if want_max {
            strings.iter().max()
        } else {
            strings.iter().min()
        };
        return Ok(Value::Str(found.cloned().unwrap_or_default()));
    }
    let widened = widened(values, operation)?;
    let mut best_index = 0;
    for (index, &candidate) in widened.iter().enumerate() {
        let better = if want_max {
            candidate > widened[best_index]
        } else {
            candidate < widened[best_index]
        };
        if better {
            best_index = index;
        }
    }
    // Return the original element so the input dtype is preserved exactly.
    Ok(values.value(best_index))
}

impl ReductionOperation for Min {
    fn supports_strings(&self) -> bool {
        true
    }

    fn result_dtype(&self, input: Dtype) -> Dtype {
        input
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        extremum(values, false, "Min")
    }
}

impl ReductionOperation for Max {
    fn supports_strings(&self) -> bool {
        true
    }

    fn result_dtype(&self, input: Dtype) -> Dtype {
        input
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        extremum(values, true, "Max")
    }
}

fn sorted(values: &ArrayData, operation: &str) -> Result<Vec<f64>> {
    let mut widened = widened(values, operation)?;
    widened.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(widened)
}

/// The interpolated quantile at a given point in `[0, 1]`.
fn quantile_of(sorted_values: &[f64], point: f64) -> f64 {
    let last = sorted_values.len() - 1;
    let position = point * last as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;
    sorted_values[below] * (1.0 - fraction) + sorted_values[above.min(last)] * fraction
}

/// The median, as `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

pub(super) fn median_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Median))
}

impl ReductionOperation for Median {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        Ok(Value::Float(quantile_of(&sorted(values, "Median")?, 0.5)))
    }
}

/// An arbitrary interpolated quantile; requires the parameter `p`.
#[derive(Debug, Clone, Copy)]
pub struct Quantile {
    /// The quantile point, in `[0, 1]`.
    pub p: f64,
}

pub(super) fn quantile_factory(params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    let p = params.f64("p")?.ok_or_else(|| {
        Error::Query(QueryError::new(
            QueryErrorKind::Parse,
            "Quantile requires a p parameter",
        ))
    })?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Query(QueryError::new(
            QueryErrorKind::Parse,
            format!("the quantile point {p} is outside [0, 1]"),
        )));
    }
    Ok(Arc::new(Quantile { p }))
}

impl ReductionOperation for Quantile {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        Ok(Value::Float(quantile_of(
            &sorted(values, "Quantile")?,
            self.p,
        )))
    }
}

fn variance_of(values: &ArrayData, operation: &str) -> Result<f64> {
    let widened = widened(values, operation)?;
    let mean = widened.iter().sum::<f64>() / widened.len() as f64;
    Ok(widened.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / widened.len() as f64)
}

/// The population standard deviation, as `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Std;

pub(super) fn std_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Std))
}

impl ReductionOperation for Std {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        Ok(Value::Float(variance_of(values, "Std")?.sqrt()))
    }
}

/// The population variance, as `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Var;

pub(super) fn var_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Var))
}

impl ReductionOperation for Var {
    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::F64
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        Ok(Value::Float(variance_of(values, "Var")?))
    }
}

/// The most frequent value; ties break towards the smaller value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mode;

pub(super) fn mode_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Mode))
}

impl ReductionOperation for Mode {
    fn supports_strings(&self) -> bool {
        true
    }

    fn result_dtype(&self, input: Dtype) -> Dtype {
        input
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        if values.is_empty() {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::MissingDefault,
                "Mode of an empty input requires a default",
            )));
        }
        let mut order: Vec<usize> = (0..values.len()).collect();
        if let Some(strings) = values.as_strings() {
            order.sort_by(|&a, &b| strings[a].cmp(&strings[b]));
        } else {
            let widened = widened(values, "Mode")?;
            order.sort_by(|&a, &b| {
                widened[a]
                    .partial_cmp(&widened[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        // One pass over the sorted positions, tracking the longest run.
        let mut best = order[0];
        let mut best_run = 0usize;
        let mut run_start = 0usize;
        for scan in 0..=order.len() {
            let run_ended = scan == order.len()
                || values.value(order[scan]) != values.value(order[run_start]);
            if run_ended {
                let run = scan - run_start;
                if run > best_run {
                    best_run = run;
                    best = order[run_start];
                }
                run_start = scan;
            }
        }
        Ok(values.value(best))
    }
}

/// The number of elements, of any type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

pub(super) fn count_factory(_params: &mut Params<'_>) -> Result<Arc<dyn ReductionOperation>> {
    Ok(Arc::new(Count))
}

impl ReductionOperation for Count {
    fn supports_strings(&self) -> bool {
        true
    }

    fn result_dtype(&self, _input: Dtype) -> Dtype {
        Dtype::U64
    }

    fn empty_value(&self, _result: Dtype) -> Option<Value> {
        Some(Value::UInt(0))
    }

    fn reduce(&self, values: &ArrayData) -> Result<Value> {
        Ok(Value::UInt(values.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_widens_and_overrides() {
        let sum = Sum { dtype: None };
        assert_eq!(
            sum.reduce(&ArrayData::I32(vec![10, 20, 30, 40])).unwrap(),
            Value::Int(100)
        );
        assert_eq!(sum.result_dtype(Dtype::I32), Dtype::I64);
        let typed = Sum {
            dtype: Some(Dtype::F64),
        };
        assert_eq!(typed.result_dtype(Dtype::I32), Dtype::F64);
    }

    #[test]
    fn test_singleton_identity() {
        // Min, Max, Mean and Sum are all identity on singletons.
        let single = ArrayData::I32(vec![7]);
        assert_eq!(Min.reduce(&single).unwrap(), Value::Int(7));
        assert_eq!(Max.reduce(&single).unwrap(), Value::Int(7));
        assert_eq!(Mean.reduce(&single).unwrap(), Value::Float(7.0));
        assert_eq!(
            Sum { dtype: None }.reduce(&single).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn test_extrema_on_strings() {
        let strings = ArrayData::Str(vec!["pear".into(), "apple".into()]);
        assert_eq!(Min.reduce(&strings).unwrap(), Value::Str("apple".into()));
        assert_eq!(Max.reduce(&strings).unwrap(), Value::Str("pear".into()));
        assert!(Mean.reduce(&strings).is_err());
    }

    #[test]
    fn test_median_and_quantile() {
        let values = ArrayData::I32(vec![4, 1, 3, 2]);
        assert_eq!(Median.reduce(&values).unwrap(), Value::Float(2.5));
        assert_eq!(
            Quantile { p: 0.0 }.reduce(&values).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            Quantile { p: 1.0 }.reduce(&values).unwrap(),
            Value::Float(4.0)
        );
    }

    #[test]
    fn test_std_and_var() {
        let values = ArrayData::F64(vec![2.0, 4.0]);
        assert_eq!(Var.reduce(&values).unwrap(), Value::Float(1.0));
        assert_eq!(Std.reduce(&values).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn test_mode() {
        let values = ArrayData::I32(vec![3, 1, 3, 2, 1, 3]);
        assert_eq!(Mode.reduce(&values).unwrap(), Value::Int(3));
        // Ties break towards the smaller value.
        let tied = ArrayData::I32(vec![2, 1, 2, 1]);
        assert_eq!(Mode.reduce(&tied).unwrap(), Value::Int(1));
        let strings = ArrayData::Str(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(Mode.reduce(&strings).unwrap(), Value::Str("b".into()));
        assert!(Mode.reduce(&ArrayData::I32(vec![])).is_err());
    }

    #[test]
    fn test_count_and_empties() {
        assert_eq!(
            Count.reduce(&ArrayData::Str(vec!["a".into()])).unwrap(),
            Value::UInt(1)
        );
        assert_eq!(Count.empty_value(Dtype::U64), Some(Value::UInt(0)));
        assert_eq!(
            Sum { dtype: None }.empty_value(Dtype::I64),
            Some(Value::Int(0))
        );
        assert_eq!(Mean.empty_value(Dtype::F64), None);
    }
}
