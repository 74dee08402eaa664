//! Scalar lookups starting from an empty stack.

use super::chain::{default_of, parse_step_mods};
use super::Executor;
use crate::ops::{QueryOperation, Span};
use crate::state::{ScalarState, StackElement};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::Value;
use axial_store::DependencyKey;

/// `. name [|| default]`: a scalar property.
pub(super) fn run_scalar_lookup(exec: &mut Executor<'_>) -> Result<()> {
    let spanned = exec.advance();
    let QueryOperation::LookupScalar(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a scalar lookup");
    };
    let mods = parse_step_mods(exec, false, false);
    exec.record(DependencyKey::Scalar(op.name.clone()));
    let value = if exec.store().has_scalar(&op.name) {
        exec.store()
            .get_scalar(&op.name)
            .map_err(|err| exec.locate(err, spanned.span))?
    } else if let Some(if_missing) = &mods.if_missing {
        default_of(exec, if_missing, spanned.span)?.0
    } else {
        return Err(exec.err(
            QueryErrorKind::UnknownProperty,
            format!("the store has no scalar named {}", op.name),
            spanned.span,
        ));
    };
    exec.push(StackElement::Scalar(ScalarState { value }));
    Ok(())
}

/// Consumes `@ axis = entry`, returning the axis, the entry and its span.
fn axis_entry_selector(
    exec: &mut Executor<'_>,
    context: &str,
) -> Result<(String, String, Span)> {
    let span = exec.span_here();
    if !matches!(exec.peek(), Some(QueryOperation::Axis(axis)) if axis.name.is_some()) {
        return Err(exec.err(
            QueryErrorKind::InvalidPhrase,
            format!("{context} requires an axis and an entry selection"),
            span,
        ));
    }
    let axis_spanned = exec.advance();
    let QueryOperation::Axis(axis_op) = axis_spanned.op else {
        unreachable!("checked above");
    };
    if !matches!(
        exec.peek(),
        Some(QueryOperation::Compare(compare))
            if compare.kind == axial_common::types::CompareKind::Equal
    ) {
        return Err(exec.err(
            QueryErrorKind::InvalidPhrase,
            format!("{context} requires an = entry selection after the axis"),
            axis_spanned.span,
        ));
    }
    let select_spanned = exec.advance();
    let QueryOperation::Compare(select_op) = select_spanned.op else {
        unreachable!("checked above");
    };
    Ok((
        axis_op.name.expect("checked above"),
        select_op.operand,
        select_spanned.span,
    ))
}

fn entry_index(
    exec: &mut Executor<'_>,
    axis: &str,
    entry: &str,
    span: Span,
) -> Result<usize> {
    exec.axis_entries(axis, span)?;
    let index = exec
        .store()
        .axis_index_of(axis, entry)
        .map_err(|err| exec.locate(err, span))?;
    index.ok_or_else(|| {
        exec.err(
            QueryErrorKind::UnknownEntry,
            format!("the axis {axis} has no entry named {entry}"),
            span,
        )
    })
}

/// `: name [|| default] @ axis = entry`: one element of a vector.
pub(super) fn run_vector_entry_scalar(exec: &mut Executor<'_>) -> Result<()> {
    let spanned = exec.advance();
    let QueryOperation::Lookup(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a vector lookup");
    };
    let mods = parse_step_mods(exec, false, false);
    let (axis, entry, select_span) = axis_entry_selector(exec, "a vector element lookup")?;
    let index = entry_index(exec, &axis, &entry, select_span)?;
    exec.record(DependencyKey::Vector(axis.clone(), op.name.clone()));
    let value = if exec.store().has_vector(&axis, &op.name) {
        let named = exec
            .store()
            .get_vector(&axis, &op.name)
            .map_err(|err| exec.locate(err, spanned.span))?;
        named.values.value(index)
    } else if let Some(if_missing) = &mods.if_missing {
        default_of(exec, if_missing, spanned.span)?.0
    } else {
        return Err(exec.err(
            QueryErrorKind::UnknownProperty,
            format!("the axis {axis} has no vector named {}", op.name),
            spanned.span,
        ));
    };
    exec.push(StackElement::Scalar(ScalarState { value }));
    Ok(())
}

/// `:: name [|| default] @ a = x @ b = y`: one element of a matrix.
pub(super) fn run_matrix_entry_scalar(exec: &mut Executor<'_>) -> Result<()> {
    let spanned = exec.advance();
    let QueryOperation::LookupMatrix(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a matrix lookup");
    };
    let mods = parse_step_mods(exec, false, false);
    let (rows_axis, row_entry, row_span) = axis_entry_selector(exec, "a matrix element lookup")?;
    let (columns_axis, column_entry, column_span) =
        axis_entry_selector(exec, "a matrix element lookup")?;
    let row = entry_index(exec, &rows_axis, &row_entry, row_span)?;
    let column = entry_index(exec, &columns_axis, &column_entry, column_span)?;
    exec.record(DependencyKey::Matrix(
        rows_axis.clone(),
        columns_axis.clone(),
        op.name.clone(),
    ));
    let value: Value = if exec
        .store()
        .has_matrix(&rows_axis, &columns_axis, &op.name, true)
    {
        let named = exec
            .store()
            .get_matrix(&rows_axis, &columns_axis, &op.name, true)
            .map_err(|err| exec.locate(err, spanned.span))?;
        named.values.get(row, column)
    } else if let Some(if_missing) = &mods.if_missing {
        default_of(exec, if_missing, spanned.span)?.0
    } else {
        return Err(exec.err(
            QueryErrorKind::UnknownProperty,
            format!(
                "the axes {rows_axis} x {columns_axis} have no matrix named {}",
                op.name
            ),
            spanned.span,
        ));
    };
    exec.push(StackElement::Scalar(ScalarState { value }));
    Ok(())
}
