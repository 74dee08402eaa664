//! Full matrix lookup over two axis states.

use super::chain::{default_of, parse_step_mods};
use super::Executor;
use crate::ops::{QueryOperation, Span};
use crate::state::{MatrixState, StackElement, VectorState};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::MatrixData;
use axial_store::DependencyKey;

/// Maps retained entries back to their positions in the full axis.
fn entry_indices(
    exec: &mut Executor<'_>,
    state: &VectorState,
    span: Span,
) -> Result<Vec<usize>> {
    let axis = state
        .entries_axis_name
        .clone()
        .expect("axis-like states carry their axis");
    let dict = exec.axis_dict(&axis, span)?;
    state
        .entries
        .iter()
        .map(|entry| {
            dict.get(entry).copied().ok_or_else(|| {
                exec.err(
                    QueryErrorKind::UnknownEntry,
                    format!("the axis {axis} has no entry named {entry}"),
                    span,
                )
            })
        })
        .collect()
}

/// Two axes + `:: name [|| default]`: a matrix state, gathered down to
/// the retained entries when either axis was masked.
pub(super) fn run_matrix_lookup(exec: &mut Executor<'_>) -> Result<()> {
    let columns_state = exec.pop_vector();
    let rows_state = exec.pop_vector();
    let spanned = exec.advance();
    let QueryOperation::LookupMatrix(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a matrix lookup");
    };
    let mods = parse_step_mods(exec, false, false);

    let rows_axis = rows_state
        .entries_axis_name
        .clone()
        .expect("axis-like states carry their axis");
    let columns_axis = columns_state
        .entries_axis_name
        .clone()
        .expect("axis-like states carry their axis");
    exec.record(DependencyKey::Matrix(
        rows_axis.clone(),
        columns_axis.clone(),
        op.name.clone(),
    ));

    let values = if exec
        .store()
        .has_matrix(&rows_axis, &columns_axis, &op.name, true)
    {
        let named = exec
            .store()
            .get_matrix(&rows_axis, &columns_axis, &op.name, true)
            .map_err(|err| exec.locate(err, spanned.span))?;
        if rows_state.is_complete_property_axis && columns_state.is_complete_property_axis {
            named.values
        } else {
            let row_indices = entry_indices(exec, &rows_state, spanned.span)?;
            let column_indices = entry_indices(exec, &columns_state, spanned.span)?;
            named.values.gather(&row_indices, &column_indices)
        }
    } else if let Some(if_missing) = &mods.if_missing {
        let (value, dtype) = default_of(exec, if_missing, spanned.span)?;
        MatrixData::new_filled(dtype, rows_state.len(), columns_state.len(), &value)?
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

    exec.push(StackElement::Matrix(MatrixState {
        rows: rows_state,
        columns: columns_state,
        property_name: Some(op.name),
        values,
    }));
    Ok(())
}
