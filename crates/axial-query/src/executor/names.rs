//! Phrases producing name sets.

use super::{reject_names_kind, Executor};
use crate::ops::{NamesKind, QueryOperation};
use crate::state::{NamesState, StackElement};
use axial_common::utils::error::Result;
use axial_store::DependencyKey;

fn names_op(exec: &mut Executor<'_>) -> (Option<NamesKind>, crate::ops::Span) {
    let spanned = exec.advance();
    match spanned.op {
        QueryOperation::Names(op) => (op.kind, spanned.span),
        _ => unreachable!("the phrase pattern guarantees a names operation"),
    }
}

/// Empty stack + `@ ?`: the set of axis names.
pub(super) fn run_names_of_axes(exec: &mut Executor<'_>) -> Result<()> {
    exec.advance(); // the bare axis operator
    let (kind, span) = names_op(exec);
    if kind == Some(NamesKind::Scalars) {
        reject_names_kind(exec, kind, span, "axes")?;
    }
    exec.record(DependencyKey::AxesSet);
    exec.push(StackElement::Names(NamesState {
        names: exec.store().axes_set(),
    }));
    Ok(())
}

/// Empty stack + `?`: scalar names, or axis names with the `axes` kind.
pub(super) fn run_names_at_root(exec: &mut Executor<'_>) -> Result<()> {
    let (kind, _span) = names_op(exec);
    let names = match kind {
        Some(NamesKind::Axes) => {
            exec.record(DependencyKey::AxesSet);
            exec.store().axes_set()
        }
        _ => {
            exec.record(DependencyKey::ScalarsSet);
            exec.store().scalars_set()
        }
    };
    exec.push(StackElement::Names(NamesState { names }));
    Ok(())
}

/// One axis + `?`: the vector names of that axis.
pub(super) fn run_names_of_vectors(exec: &mut Executor<'_>) -> Result<()> {
    let axis_state = exec.pop_vector();
    let (kind, span) = names_op(exec);
    reject_names_kind(exec, kind, span, "the vectors of an axis")?;
    let axis = axis_state
        .entries_axis_name
        .expect("axis-like states carry their axis");
    let names = exec
        .store()
        .vectors_set(&axis)
        .map_err(|err| exec.locate(err, span))?;
    exec.record(DependencyKey::VectorsSet(axis));
    exec.push(StackElement::Names(NamesState { names }));
    Ok(())
}

/// Two axes + `?`: the matrix names of the axis pair, relayout-aware.
pub(super) fn run_names_of_matrices(exec: &mut Executor<'_>) -> Result<()> {
    let columns_state = exec.pop_vector();
    let rows_state = exec.pop_vector();
    let (kind, span) = names_op(exec);
    reject_names_kind(exec, kind, span, "the matrices of an axis pair")?;
    let rows_axis = rows_state
        .entries_axis_name
        .expect("axis-like states carry their axis");
    let columns_axis = columns_state
        .entries_axis_name
        .expect("axis-like states carry their axis");
    let names = exec
        .store()
        .matrices_set(&rows_axis, &columns_axis, true)
        .map_err(|err| exec.locate(err, span))?;
    exec.record(DependencyKey::MatricesSet(rows_axis, columns_axis, true));
    exec.push(StackElement::Names(NamesState { names }));
    Ok(())
}
