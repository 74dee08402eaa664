//! Comparisons, element-wise application, and reductions to scalars and
//! vectors.

use super::chain::parse_step_mods;
use super::Executor;
use crate::ops::{IfMissingOp, QueryOperation, ReductionCall, Span};
use crate::state::{ScalarState, StackElement, VectorState};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::{ArrayData, Dtype, Value};

/// Applies a comparison or regex operation to an array, yielding a mask.
pub(super) fn comparison_mask(
    exec: &Executor<'_>,
    values: &ArrayData,
    op: &QueryOperation,
    span: Span,
) -> Result<Vec<bool>> {
    match op {
        QueryOperation::Compare(compare) => values
            .compare(compare.kind, &compare.operand)
            .map_err(|err| exec.locate(err, span)),
        QueryOperation::Match(matcher) => {
            let Some(strings) = values.as_strings() else {
                return Err(exec.err(
                    QueryErrorKind::UnsupportedType,
                    "a regex comparison requires string values".to_string(),
                    span,
                ));
            };
            Ok(strings
                .iter()
                .map(|candidate| matcher.regex.is_match(candidate) != matcher.negated)
                .collect())
        }
        _ => unreachable!("only comparison operations reach here"),
    }
}

/// A comparison over the vector on top of the stack.
pub(super) fn run_comparison(exec: &mut Executor<'_>) -> Result<()> {
    let mut state = exec.pop_vector();
    state.finalize()?;
    let spanned = exec.advance();
    let mask = comparison_mask(exec, &state.values, &spanned.op, spanned.span)?;
    state.values = ArrayData::Bool(mask);
    state.clear_property();
    exec.push(StackElement::Vector(state));
    Ok(())
}

fn check_strings(
    exec: &Executor<'_>,
    dtype: Dtype,
    supports_strings: bool,
    name: &str,
    span: Span,
) -> Result<()> {
    if dtype == Dtype::Str && !supports_strings {
        return Err(exec.err(
            QueryErrorKind::UnsupportedType,
            format!("{name} does not support string values"),
            span,
        ));
    }
    Ok(())
}

/// An element-wise operation over the vector on top of the stack.
pub(super) fn run_eltwise_vector(exec: &mut Executor<'_>) -> Result<()> {
    let mut state = exec.pop_vector();
    state.finalize()?;
    let spanned = exec.advance();
    let QueryOperation::Eltwise(call) = spanned.op else {
        unreachable!("the phrase pattern guarantees an eltwise operation");
    };
    check_strings(
        exec,
        state.values.dtype(),
        call.op.supports_strings(),
        &call.name,
        spanned.span,
    )?;
    let mapped = call
        .op
        .apply(&state.values)
        .map_err(|err| exec.locate(err, spanned.span))?;
    debug_assert_eq!(mapped.len(), state.values.len());
    state.values = mapped;
    state.property_axis_name = None;
    state.is_complete_property_axis = false;
    exec.push(StackElement::Vector(state));
    Ok(())
}

/// An element-wise operation over the matrix on top of the stack.
pub(super) fn run_eltwise_matrix(exec: &mut Executor<'_>) -> Result<()> {
    let StackElement::Matrix(mut state) = exec.pop() else {
        unreachable!("the phrase pattern guarantees a matrix state");
    };
    let spanned = exec.advance();
    let QueryOperation::Eltwise(call) = spanned.op else {
        unreachable!("the phrase pattern guarantees an eltwise operation");
    };
    check_strings(
        exec,
        state.values.dtype(),
        call.op.supports_strings(),
        &call.name,
        spanned.span,
    )?;
    let mapped = call
        .op
        .apply(state.values.flat())
        .map_err(|err| exec.locate(err, spanned.span))?;
    state.values = axial_common::MatrixData::new(
        mapped,
        state.values.rows(),
        state.values.columns(),
    )?;
    exec.push(StackElement::Matrix(state));
    Ok(())
}

/// Reduces one slice, falling back to the default or the reduction's
/// empty-input identity when the slice is empty.
pub(super) fn reduce_slice(
    exec: &Executor<'_>,
    call: &ReductionCall,
    if_missing: Option<&IfMissingOp>,
    result_dtype: Dtype,
    values: &ArrayData,
    span: Span,
) -> Result<Value> {
    if values.is_empty() {
        if let Some(if_missing) = if_missing {
            return Value::parse_as(&if_missing.value, result_dtype).ok_or_else(|| {
                exec.err(
                    QueryErrorKind::Parse,
                    format!(
                        "the default {} is not a valid {result_dtype}",
                        if_missing.value
                    ),
                    span,
                )
            });
        }
        if let Some(identity) = call.op.empty_value(result_dtype) {
            return Ok(identity);
        }
        return Err(exec.err(
            QueryErrorKind::MissingDefault,
            format!("reducing an empty input with {} requires a default", call.name),
            span,
        ));
    }
    check_strings(
        exec,
        values.dtype(),
        call.op.supports_strings(),
        &call.name,
        span,
    )?;
    call.op.reduce(values).map_err(|err| exec.locate(err, span))
}

fn reduction_call(exec: &mut Executor<'_>) -> (ReductionCall, Span, Option<IfMissingOp>) {
    let spanned = exec.advance();
    let call = match spanned.op {
        QueryOperation::ReduceToScalar(call)
        | QueryOperation::ReduceToRow(call)
        | QueryOperation::ReduceToColumn(call) => call,
        _ => unreachable!("the phrase pattern guarantees a reduction"),
    };
    let mods = parse_step_mods(exec, false, false);
    (call, spanned.span, mods.if_missing)
}

/// `>> Op` over a vector: a scalar.
pub(super) fn run_reduce_vector(exec: &mut Executor<'_>) -> Result<()> {
    let mut state = exec.pop_vector();
    state.finalize()?;
    let (call, span, if_missing) = reduction_call(exec);
    let result_dtype = call.op.result_dtype(state.values.dtype());
    let value = reduce_slice(
        exec,
        &call,
        if_missing.as_ref(),
        result_dtype,
        &state.values,
        span,
    )?;
    exec.push(StackElement::Scalar(ScalarState { value }));
    Ok(())
}

/// `>> Op` over a matrix: the scalar reduction of all elements.
pub(super) fn run_reduce_matrix(exec: &mut Executor<'_>) -> Result<()> {
    let StackElement::Matrix(state) = exec.pop() else {
        unreachable!("the phrase pattern guarantees a matrix state");
    };
    let (call, span, if_missing) = reduction_call(exec);
    let result_dtype = call.op.result_dtype(state.values.dtype());
    let value = reduce_slice(
        exec,
        &call,
        if_missing.as_ref(),
        result_dtype,
        state.values.flat(),
        span,
    )?;
    exec.push(StackElement::Scalar(ScalarState { value }));
    Ok(())
}

fn reduce_along(
    exec: &mut Executor<'_>,
    per_row: bool,
) -> Result<()> {
    let StackElement::Matrix(state) = exec.pop() else {
        unreachable!("the phrase pattern guarantees a matrix state");
    };
    let (call, span, if_missing) = reduction_call(exec);
    let result_dtype = call.op.result_dtype(state.values.dtype());
    let kept = if per_row { &state.rows } else { &state.columns };
    let count = kept.len();
    let mut reduced = Vec::with_capacity(count);
    for index in 0..count {
        let slice = if per_row {
            state.values.row(index)
        } else {
            state.values.column(index)
        };
        reduced.push(reduce_slice(
            exec,
            &call,
            if_missing.as_ref(),
            result_dtype,
            &slice,
            span,
        )?);
    }
    let values = ArrayData::from_values(result_dtype, &reduced)?;
    exec.push(StackElement::Vector(VectorState {
        entries_axis_name: kept.entries_axis_name.clone(),
        entries: kept.entries.clone(),
        property_name: state.property_name.clone(),
        property_axis_name: None,
        is_complete_property_axis: false,
        values,
        pending_final_values: None,
    }));
    Ok(())
}

/// `>- Op`: each row reduced to one value, indexed by the rows axis.
pub(super) fn run_reduce_rows(exec: &mut Executor<'_>) -> Result<()> {
    reduce_along(exec, true)
}

/// `>| Op`: each column reduced to one value, indexed by the columns axis.
pub(super) fn run_reduce_columns(exec: &mut Executor<'_>) -> Result<()> {
    reduce_along(exec, false)
}
