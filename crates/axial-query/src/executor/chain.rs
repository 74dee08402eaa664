//! Lookup chains: direct lookups and indirect fetches through axes.
//!
//! A chain is a run of consecutive `Lookup` / `LookupMatrix` operations
//! (each with optional `AsAxis` before it and `IfMissing` / `IfNot` /
//! slice selections after it) executed as one phrase over a shared
//! vector state. The machinery here is also what mask regions, group
//! keys and count-by partners use to fetch their vectors.

use super::Executor;
use crate::ops::{IfMissingOp, IfNotOp, QueryOperation, Span};
use crate::state::{ScalarState, StackElement, VectorState};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::{ArrayData, Dtype, Value};
use axial_store::DependencyKey;

/// The modifiers attached to one lookup step.
#[derive(Debug, Clone, Default)]
pub(super) struct StepMods {
    /// Default for an absent property.
    pub if_missing: Option<IfMissingOp>,
    /// Handling for false-ish values.
    pub if_not: Option<IfNotOp>,
    /// Row/column selection for matrix-backed steps.
    pub slice: Option<SliceSel>,
}

/// Which row or column a matrix-backed step slices out.
#[derive(Debug, Clone)]
pub(super) enum SliceSel {
    /// `@ axis = entry`: the column of `entry` in a rectangular matrix.
    Column {
        /// The columns axis.
        axis: String,
        /// The entry naming the column.
        entry: String,
    },
    /// `@| entry`: a column of a square matrix.
    SquareColumn {
        /// The entry naming the column.
        entry: String,
    },
    /// `@- entry`: a row of a square matrix.
    SquareRow {
        /// The entry naming the row.
        entry: String,
    },
}

/// What a step fetched from the store: a full-axis array, or a default
/// for an absent property.
enum Fetched {
    Values(ArrayData),
    Default(Value, Dtype),
}

/// `@ name`: push a fresh axis state.
pub(super) fn run_axis_push(exec: &mut Executor<'_>) -> Result<()> {
    let spanned = exec.advance();
    let QueryOperation::Axis(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees an axis operation");
    };
    let axis = op.name.expect("the phrase pattern requires a name");
    let entries = exec.axis_entries(&axis, spanned.span)?;
    exec.push(StackElement::Vector(VectorState::axis(
        &axis,
        (*entries).clone(),
    )));
    Ok(())
}

/// A lookup chain over the vector state on top of the stack.
pub(super) fn run_chain(exec: &mut Executor<'_>) -> Result<()> {
    let mut state = exec.pop_vector();
    run_chain_loop(exec, &mut state)?;
    exec.push(StackElement::Vector(state));
    Ok(())
}

/// `@ axis = entry` followed by a chain: a scalar for one entry.
pub(super) fn run_entry_select(exec: &mut Executor<'_>) -> Result<()> {
    let axis_spanned = exec.advance();
    let QueryOperation::Axis(axis_op) = axis_spanned.op else {
        unreachable!("the phrase pattern guarantees an axis operation");
    };
    let axis = axis_op.name.expect("the phrase pattern requires a name");
    let select_spanned = exec.advance();
    let QueryOperation::Compare(select_op) = select_spanned.op else {
        unreachable!("the phrase pattern guarantees a comparison");
    };
    let entry = select_op.operand;

    let entries = exec.axis_entries(&axis, axis_spanned.span)?;
    let Some(index) = entries.iter().position(|candidate| *candidate == entry) else {
        return Err(exec.err(
            QueryErrorKind::UnknownEntry,
            format!("the axis {axis} has no entry named {entry}"),
            select_spanned.span,
        ));
    };
    let mut state = VectorState::axis(&axis, (*entries).clone());
    let keep: Vec<bool> = (0..state.len()).map(|position| position == index).collect();
    state.retain(&keep);

    if !matches!(
        exec.peek(),
        Some(
            QueryOperation::AsAxis(_)
                | QueryOperation::Lookup(_)
                | QueryOperation::LookupMatrix(_)
        )
    ) {
        return Err(exec.err(
            QueryErrorKind::InvalidPhrase,
            "selecting a single entry requires a following lookup".to_string(),
            select_spanned.span,
        ));
    }
    run_chain_loop(exec, &mut state)?;
    if state.len() != 1 {
        return Err(exec.err(
            QueryErrorKind::MissingDefault,
            format!("the selected entry {entry} was dropped by the chain"),
            select_spanned.span,
        ));
    }
    exec.push(StackElement::Scalar(ScalarState {
        value: state.values.value(0),
    }));
    Ok(())
}

/// Runs consecutive lookup steps over `state` until the next operation is
/// not part of the chain, then settles false-ish values and pending
/// replacements.
pub(super) fn run_chain_loop(exec: &mut Executor<'_>, state: &mut VectorState) -> Result<()> {
    let mut carried: Option<IfNotOp> = None;
    loop {
        let as_axis = take_leading_as_axis(exec);
        match exec.peek() {
            Some(QueryOperation::Lookup(_)) => {
                let spanned = exec.advance();
                let QueryOperation::Lookup(op) = spanned.op else {
                    unreachable!("peeked");
                };
                let mods = parse_step_mods(exec, false, true);
                fetch_property_into(
                    exec,
                    state,
                    &op.name,
                    &mods,
                    as_axis,
                    &mut carried,
                    spanned.span,
                )?;
            }
            Some(QueryOperation::LookupMatrix(_)) => {
                let spanned = exec.advance();
                let QueryOperation::LookupMatrix(op) = spanned.op else {
                    unreachable!("peeked");
                };
                let mods = parse_step_mods(exec, true, true);
                if mods.slice.is_none() {
                    return Err(exec.err(
                        QueryErrorKind::InvalidPhrase,
                        "a matrix lookup in a chain requires selecting a row or column"
                            .to_string(),
                        spanned.span,
                    ));
                }
                fetch_property_into(
                    exec,
                    state,
                    &op.name,
                    &mods,
                    as_axis,
                    &mut carried,
                    spanned.span,
                )?;
            }
            _ => break,
        }
    }
    if let Some(if_not) = carried {
        apply_final_if_not(state, &if_not);
    }
    state.finalize()
}

/// Consumes an `AsAxis` only when a lookup follows it; a dangling
/// `AsAxis` belongs to whatever phrase comes next.
fn take_leading_as_axis(exec: &mut Executor<'_>) -> Option<Option<String>> {
    if matches!(exec.peek(), Some(QueryOperation::AsAxis(_)))
        && matches!(
            exec.peek_at(1),
            Some(QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_))
        )
    {
        let spanned = exec.advance();
        let QueryOperation::AsAxis(op) = spanned.op else {
            unreachable!("peeked");
        };
        Some(op.name)
    } else {
        None
    }
}

/// Greedily consumes the modifier operations of one lookup step.
pub(super) fn parse_step_mods(
    exec: &mut Executor<'_>,
    allow_slice: bool,
    allow_if_not: bool,
) -> StepMods {
    let mut mods = StepMods::default();
    loop {
        match exec.peek() {
            Some(QueryOperation::IfMissing(_)) if mods.if_missing.is_none() => {
                let spanned = exec.advance();
                let QueryOperation::IfMissing(op) = spanned.op else {
                    unreachable!("peeked");
                };
                mods.if_missing = Some(op);
            }
            Some(QueryOperation::IfNot(_)) if allow_if_not && mods.if_not.is_none() => {
                let spanned = exec.advance();
                let QueryOperation::IfNot(op) = spanned.op else {
                    unreachable!("peeked");
                };
                mods.if_not = Some(op);
            }
            Some(QueryOperation::Axis(axis_op))
                if allow_slice
                    && mods.slice.is_none()
                    && axis_op.name.is_some()
                    && matches!(
                        exec.peek_at(1),
                        Some(QueryOperation::Compare(compare))
                            if compare.kind == axial_common::types::CompareKind::Equal
                    ) =>
            {
                let axis_spanned = exec.advance();
                let QueryOperation::Axis(axis_op) = axis_spanned.op else {
                    unreachable!("peeked");
                };
                let select_spanned = exec.advance();
                let QueryOperation::Compare(select_op) = select_spanned.op else {
                    unreachable!("peeked");
                };
                mods.slice = Some(SliceSel::Column {
                    axis: axis_op.name.expect("checked above"),
                    entry: select_op.operand,
                });
            }
            Some(QueryOperation::SquareColumnIs(_)) if allow_slice && mods.slice.is_none() => {
                let spanned = exec.advance();
                let QueryOperation::SquareColumnIs(op) = spanned.op else {
                    unreachable!("peeked");
                };
                mods.slice = Some(SliceSel::SquareColumn { entry: op.entry });
            }
            Some(QueryOperation::SquareRowIs(_)) if allow_slice && mods.slice.is_none() => {
                let spanned = exec.advance();
                let QueryOperation::SquareRowIs(op) = spanned.op else {
                    unreachable!("peeked");
                };
                mods.slice = Some(SliceSel::SquareRow { entry: op.entry });
            }
            _ => return mods,
        }
    }
}

/// Declares or infers the axis the current string values name into.
fn ensure_property_axis(
    exec: &mut Executor<'_>,
    state: &mut VectorState,
    as_axis: Option<Option<String>>,
    span: Span,
) -> Result<()> {
    let declared = match as_axis {
        Some(Some(explicit)) => Some(explicit),
        Some(None) => Some(infer_axis(exec, state, span)?),
        None if state.property_axis_name.is_none() => Some(infer_axis(exec, state, span)?),
        None => None,
    };
    if let Some(axis) = declared {
        if !exec.store().has_axis(&axis) {
            return Err(exec.err(
                QueryErrorKind::UnknownAxis,
                format!("the store has no axis named {axis}"),
                span,
            ));
        }
        if state.property_axis_name.as_deref() != Some(axis.as_str()) {
            state.is_complete_property_axis = false;
        }
        state.property_axis_name = Some(axis);
    }
    Ok(())
}

/// The axis a property name implies, via the store's dot-prefix rule.
fn infer_axis(exec: &Executor<'_>, state: &VectorState, span: Span) -> Result<String> {
    let Some(property) = state.property_name.as_deref() else {
        return Err(exec.err(
            QueryErrorKind::UnknownAxis,
            "the values are not named by any axis".to_string(),
            span,
        ));
    };
    exec.store().axis_of_property(property).ok_or_else(|| {
        exec.err(
            QueryErrorKind::UnknownAxis,
            format!("no axis can be inferred for the property {property}"),
            span,
        )
    })
}

/// The default value and dtype an `IfMissing` stands in with.
pub(super) fn default_of(
    exec: &Executor<'_>,
    if_missing: &IfMissingOp,
    span: Span,
) -> Result<(Value, Dtype)> {
    let dtype = if_missing
        .dtype
        .unwrap_or_else(|| Value::from_literal(&if_missing.value).dtype());
    let value = Value::parse_as(&if_missing.value, dtype).ok_or_else(|| {
        exec.err(
            QueryErrorKind::Parse,
            format!("the default {} is not a valid {dtype}", if_missing.value),
            span,
        )
    })?;
    Ok((value, dtype))
}

/// Executes one lookup step: resolves the axis, fetches the property (or
/// its slice, or its default), and aligns the result with the state.
pub(super) fn fetch_property_into(
    exec: &mut Executor<'_>,
    state: &mut VectorState,
    property: &str,
    mods: &StepMods,
    as_axis: Option<Option<String>>,
    carried: &mut Option<IfNotOp>,
    span: Span,
) -> Result<()> {
    ensure_property_axis(exec, state, as_axis, span)?;
    let axis = state
        .property_axis_name
        .clone()
        .expect("ensure_property_axis always sets the axis");

    let fetched = fetch_full(exec, &axis, property, mods, span)?;
    let out_dtype = match &fetched {
        Fetched::Values(values) => values.dtype(),
        Fetched::Default(_, dtype) => *dtype,
    };

    let len = state.len();
    let mut pending = state
        .pending_final_values
        .take()
        .unwrap_or_else(|| vec![None; len]);
    let mut keep = vec![true; len];
    let mut any_drop = false;

    let out = if state.is_complete_property_axis {
        match fetched {
            Fetched::Values(values) => values,
            Fetched::Default(value, dtype) => ArrayData::new_filled(dtype, len, &value)?,
        }
    } else {
        let Some(names) = state.values.as_strings() else {
            return Err(exec.err(
                QueryErrorKind::UnsupportedType,
                "an indirect fetch requires string values".to_string(),
                span,
            ));
        };
        let names = names.to_vec();
        let dict = exec.axis_dict(&axis, span)?;
        let mut out = ArrayData::new_default(out_dtype, len);
        for position in 0..len {
            if pending[position].is_some() {
                continue;
            }
            let name = &names[position];
            if name.is_empty() {
                match mods.if_not.as_ref().or(carried.as_ref()) {
                    Some(if_not) => match &if_not.value {
                        Some(replacement) => pending[position] = Some(replacement.clone()),
                        None => {
                            keep[position] = false;
                            any_drop = true;
                        }
                    },
                    None => {
                        return Err(exec.err(
                            QueryErrorKind::UnknownEntry,
                            format!(
                                "an empty value cannot name an entry of the axis {axis}"
                            ),
                            span,
                        ));
                    }
                }
                continue;
            }
            let Some(&index) = dict.get(name) else {
                return Err(exec.err(
                    QueryErrorKind::UnknownEntry,
                    format!("the axis {axis} has no entry named {name}"),
                    span,
                ));
            };
            match &fetched {
                Fetched::Values(values) => out.set(position, &values.value(index))?,
                Fetched::Default(value, _) => out.set(position, value)?,
            }
        }
        out
    };

    debug_assert_eq!(out.len(), len);
    state.values = out;
    state.property_name = Some(property.to_string());
    state.property_axis_name = None;
    state.is_complete_property_axis = false;
    state.pending_final_values = if pending.iter().any(Option::is_some) {
        Some(pending)
    } else {
        None
    };
    if any_drop {
        state.retain(&keep);
    }
    *carried = mods.if_not.clone();
    Ok(())
}

/// Fetches the property over the full axis: a plain vector, or a row or
/// column sliced out of a matrix.
fn fetch_full(
    exec: &mut Executor<'_>,
    axis: &str,
    property: &str,
    mods: &StepMods,
    span: Span,
) -> Result<Fetched> {
    let store = exec.store();
    match &mods.slice {
        None => {
            if store.has_vector(axis, property) {
                let named = store
                    .get_vector(axis, property)
                    .map_err(|err| exec.locate(err, span))?;
                exec.record(DependencyKey::Vector(axis.to_string(), property.to_string()));
                Ok(Fetched::Values(named.values))
            } else {
                missing(exec, mods, span, || {
                    format!("the axis {axis} has no vector named {property}")
                })
                .map(|(value, dtype)| {
                    exec.record(DependencyKey::Vector(
                        axis.to_string(),
                        property.to_string(),
                    ));
                    Fetched::Default(value, dtype)
                })
            }
        }
        Some(SliceSel::Column {
            axis: columns_axis,
            entry,
        }) => {
            if store.has_matrix(axis, columns_axis, property, true) {
                let named = store
                    .get_matrix(axis, columns_axis, property, true)
                    .map_err(|err| exec.locate(err, span))?;
                exec.record(DependencyKey::Matrix(
                    axis.to_string(),
                    columns_axis.to_string(),
                    property.to_string(),
                ));
                let dict = exec.axis_dict(columns_axis, span)?;
                let Some(&column) = dict.get(entry.as_str()) else {
                    return Err(exec.err(
                        QueryErrorKind::UnknownEntry,
                        format!("the axis {columns_axis} has no entry named {entry}"),
                        span,
                    ));
                };
                Ok(Fetched::Values(named.values.column(column)))
            } else {
                missing(exec, mods, span, || {
                    format!(
                        "the axes {axis} x {columns_axis} have no matrix named {property}"
                    )
                })
                .map(|(value, dtype)| Fetched::Default(value, dtype))
            }
        }
        Some(SliceSel::SquareColumn { entry }) => {
            square_slice(exec, axis, property, entry, mods, span, true)
        }
        Some(SliceSel::SquareRow { entry }) => {
            square_slice(exec, axis, property, entry, mods, span, false)
        }
    }
}

fn square_slice(
    exec: &mut Executor<'_>,
    axis: &str,
    property: &str,
    entry: &str,
    mods: &StepMods,
    span: Span,
    want_column: bool,
) -> Result<Fetched> {
    let store = exec.store();
    if !store.has_matrix(axis, axis, property, false) {
        return missing(exec, mods, span, || {
            format!("the axes {axis} x {axis} have no matrix named {property}")
        })
        .map(|(value, dtype)| Fetched::Default(value, dtype));
    }
    let named = store
        .get_matrix(axis, axis, property, false)
        .map_err(|err| exec.locate(err, span))?;
    exec.record(DependencyKey::Matrix(
        axis.to_string(),
        axis.to_string(),
        property.to_string(),
    ));
    let dict = exec.axis_dict(axis, span)?;
    let Some(&index) = dict.get(entry) else {
        return Err(exec.err(
            QueryErrorKind::UnknownEntry,
            format!("the axis {axis} has no entry named {entry}"),
            span,
        ));
    };
    let sliced = if want_column {
        named.values.column(index)
    } else {
        named.values.row(index)
    };
    Ok(Fetched::Values(sliced))
}

/// The `IfMissing` default, or the unknown-property error.
fn missing(
    exec: &Executor<'_>,
    mods: &StepMods,
    span: Span,
    describe: impl FnOnce() -> String,
) -> Result<(Value, Dtype)> {
    match &mods.if_missing {
        Some(if_missing) => default_of(exec, if_missing, span),
        None => Err(exec.err(QueryErrorKind::UnknownProperty, describe(), span)),
    }
}

/// Settles the last step's `IfNot` against the final values: false-ish
/// values take the replacement, or their entries are dropped.
fn apply_final_if_not(state: &mut VectorState, if_not: &IfNotOp) {
    let truthy = state.values.truthy();
    match &if_not.value {
        Some(replacement) => {
            let len = state.len();
            let mut pending = state
                .pending_final_values
                .take()
                .unwrap_or_else(|| vec![None; len]);
            for position in 0..len {
                if !truthy[position] && pending[position].is_none() {
                    pending[position] = Some(replacement.clone());
                }
            }
            state.pending_final_values = Some(pending);
        }
        None => {
            let mut keep = truthy;
            if let Some(pending) = &state.pending_final_values {
                for (position, slot) in pending.iter().enumerate() {
                    if slot.is_some() {
                        keep[position] = true;
                    }
                }
            }
            state.retain(&keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use axial_store::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_axis("cell", ["c1", "c2", "c3"])
            .unwrap();
        store.create_axis("type", ["T", "B"]).unwrap();
        store
            .set_vector(
                "cell",
                "type",
                ArrayData::Str(vec!["T".into(), "B".into(), String::new()]),
            )
            .unwrap();
        store
            .set_vector("type", "color", ArrayData::Str(vec!["red".into(), "blue".into()]))
            .unwrap();
        store
    }

    fn chain_over_cells(store: &MemoryStore, text: &str) -> Result<VectorState> {
        let query = parse(text).unwrap();
        let mut exec = Executor::new(store, &query);
        let mut state = VectorState::axis(
            "cell",
            vec!["c1".into(), "c2".into(), "c3".into()],
        );
        run_chain_loop(&mut exec, &mut state)?;
        Ok(state)
    }

    #[test]
    fn test_direct_lookup_keeps_entries() {
        let store = store();
        let state = chain_over_cells(&store, ": type").unwrap();
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.property_name.as_deref(), Some("type"));
        assert!(!state.is_complete_property_axis);
        assert_eq!(
            state.values,
            ArrayData::Str(vec!["T".into(), "B".into(), String::new()])
        );
    }

    #[test]
    fn test_indirect_fetch_infers_the_axis() {
        let store = store();
        let state = chain_over_cells(&store, ": type : color ?? black").unwrap();
        assert_eq!(
            state.values,
            ArrayData::Str(vec!["red".into(), "blue".into(), "black".into()])
        );
        assert!(state.pending_final_values.is_none());
    }

    #[test]
    fn test_if_not_on_the_producing_step_guards_the_next_fetch() {
        let store = store();
        let state = chain_over_cells(&store, ": type ?? royal : color").unwrap();
        assert_eq!(
            state.values,
            ArrayData::Str(vec!["red".into(), "blue".into(), "royal".into()])
        );
    }

    #[test]
    fn test_valueless_if_not_drops_entries() {
        let store = store();
        let state = chain_over_cells(&store, ": type ??").unwrap();
        assert_eq!(state.entries, vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(state.values, ArrayData::Str(vec!["T".into(), "B".into()]));
    }

    #[test]
    fn test_empty_value_without_if_not_fails() {
        let store = store();
        let err = chain_over_cells(&store, ": type : color").unwrap_err();
        assert_eq!(
            err.query_kind(),
            Some(axial_common::QueryErrorKind::UnknownEntry)
        );
    }

    #[test]
    fn test_unresolvable_axis_fails() {
        let store = store();
        // There is no axis to fetch "color" through after looking up an
        // arbitrary property with no axis of its own.
        store
            .set_vector("cell", "label", ArrayData::Str(vec!["x".into(); 3]))
            .unwrap();
        let err = chain_over_cells(&store, ": label : color").unwrap_err();
        assert_eq!(
            err.query_kind(),
            Some(axial_common::QueryErrorKind::UnknownAxis)
        );
    }
}
