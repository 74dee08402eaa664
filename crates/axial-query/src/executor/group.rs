//! Grouping and aggregation along a key property.
//!
//! The group key is fetched over the entries of the grouped state using
//! the chain machinery, so defaults, matrix slices and axis declarations
//! all work for keys. With `AsAxis` the groups are the entries of the
//! declared axis in axis order; otherwise they are the sorted unique
//! observed key values.

use super::chain::{fetch_property_into, parse_step_mods, StepMods};
use super::reduce::reduce_slice;
use super::Executor;
use crate::ops::{QueryOperation, Span};
use crate::state::{MatrixState, StackElement, VectorState};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::utils::hash::FxHashMap;
use axial_common::{ArrayData, MatrixData};

/// An axis-aligned carrier over the entries of `state`, ready to fetch a
/// companion vector (a group key or a count-by partner) positioned like
/// the state itself.
pub(super) fn aligned_carrier(
    exec: &mut Executor<'_>,
    state: &VectorState,
    span: Span,
) -> Result<VectorState> {
    let Some(axis) = state.entries_axis_name.clone() else {
        return Err(exec.err(
            QueryErrorKind::UnknownAxis,
            "the values are no longer aligned with any axis".to_string(),
            span,
        ));
    };
    let full_length = exec
        .store()
        .axis_length(&axis)
        .map_err(|err| exec.locate(err, span))?;
    // Entries are an ordered subset of the axis, so equal lengths mean
    // the subset is the whole axis.
    let complete = full_length == state.entries.len();
    Ok(VectorState {
        entries_axis_name: Some(axis.clone()),
        entries: state.entries.clone(),
        property_name: Some("name".to_string()),
        property_axis_name: Some(axis),
        is_complete_property_axis: complete,
        values: ArrayData::Str(state.entries.clone()),
        pending_final_values: None,
    })
}

/// Group key modifiers: the step modifiers plus an optional `AsAxis`.
pub(super) fn parse_key_mods(
    exec: &mut Executor<'_>,
) -> (StepMods, Option<Option<String>>) {
    let mut as_axis = None;
    let mut mods = parse_step_mods(exec, true, false);
    if matches!(exec.peek(), Some(QueryOperation::AsAxis(_))) {
        let spanned = exec.advance();
        let QueryOperation::AsAxis(op) = spanned.op else {
            unreachable!("peeked");
        };
        as_axis = Some(op.name);
        // Modifiers may also follow the axis declaration.
        let late = parse_step_mods(exec, mods.slice.is_none(), false);
        if mods.if_missing.is_none() {
            mods.if_missing = late.if_missing;
        }
        if mods.slice.is_none() {
            mods.slice = late.slice;
        }
    }
    (mods, as_axis)
}

/// Declares the axis the key values index, explicitly or inferred from
/// the key property name.
pub(super) fn declare_values_axis(
    exec: &mut Executor<'_>,
    state: &mut VectorState,
    as_axis: Option<String>,
    span: Span,
) -> Result<()> {
    let axis = match as_axis {
        Some(explicit) => explicit,
        None => {
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
            })?
        }
    };
    if !exec.store().has_axis(&axis) {
        return Err(exec.err(
            QueryErrorKind::UnknownAxis,
            format!("the store has no axis named {axis}"),
            span,
        ));
    }
    state.property_axis_name = Some(axis);
    Ok(())
}

/// The group index: axis entries in axis order when the key declared an
/// axis, sorted unique observed values otherwise.
pub(super) fn group_index(
    exec: &mut Executor<'_>,
    key: &VectorState,
    span: Span,
) -> Result<(Vec<String>, Option<String>)> {
    if let Some(axis) = key.property_axis_name.clone() {
        let entries = exec.axis_entries(&axis, span)?;
        Ok(((*entries).clone(), Some(axis)))
    } else {
        Ok((unique_sorted_names(&key.values), None))
    }
}

/// Sorted unique values, stringified, in ascending value order.
fn unique_sorted_names(values: &ArrayData) -> Vec<String> {
    if let Some(strings) = values.as_strings() {
        let set: std::collections::BTreeSet<&String> = strings.iter().collect();
        return set.into_iter().cloned().collect();
    }
    let mut pairs: Vec<(f64, String)> = (0..values.len())
        .map(|index| {
            let value = values.value(index);
            (value.as_f64().unwrap_or(0.0), value.to_string())
        })
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    pairs.dedup_by(|a, b| a.1 == b.1);
    pairs.into_iter().map(|(_, name)| name).collect()
}

/// The positions of each group, keyed by the group index. Key values
/// outside the index (the empty string under `AsAxis`, say) belong to no
/// group.
pub(super) fn bucket_by(key: &ArrayData, names: &[String]) -> Vec<Vec<usize>> {
    let map: FxHashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    for position in 0..key.len() {
        let name = key.value(position).to_string();
        if let Some(&group) = map.get(name.as_str()) {
            buckets[group].push(position);
        }
    }
    buckets
}

/// An axis-like state carrying a group (or count) index as its entries.
pub(super) fn index_state(names: Vec<String>, axis: Option<String>) -> VectorState {
    let complete = axis.is_some();
    VectorState {
        entries_axis_name: axis.clone(),
        entries: names.clone(),
        property_name: axis.as_ref().map(|_| "name".to_string()),
        property_axis_name: axis,
        is_complete_property_axis: complete,
        values: ArrayData::Str(names),
        pending_final_values: None,
    }
}

/// Fetches the group key aligned with `state` and consumes its modifiers.
fn fetch_key(
    exec: &mut Executor<'_>,
    state: &VectorState,
    property: &str,
    span: Span,
) -> Result<VectorState> {
    let (mods, as_axis) = parse_key_mods(exec);
    let mut key = aligned_carrier(exec, state, span)?;
    let mut carried = None;
    fetch_property_into(exec, &mut key, property, &mods, None, &mut carried, span)?;
    if let Some(declared) = as_axis {
        declare_values_axis(exec, &mut key, declared, span)?;
    }
    Ok(key)
}

/// `/ key ... >> Op [|| default]` over a vector: one reduced value per
/// group.
pub(super) fn run_group_vector(exec: &mut Executor<'_>) -> Result<()> {
    let mut state = exec.pop_vector();
    state.finalize()?;
    let spanned = exec.advance();
    let QueryOperation::GroupBy(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a group-by");
    };
    let key = fetch_key(exec, &state, &op.name, spanned.span)?;
    if key.len() != state.len() {
        return Err(exec.err(
            QueryErrorKind::ShapeMismatch,
            format!(
                "the group key has {} entries but the values have {}",
                key.len(),
                state.len()
            ),
            spanned.span,
        ));
    }

    if !matches!(exec.peek(), Some(QueryOperation::ReduceToScalar(_))) {
        let span = exec.span_here();
        return Err(exec.err(
            QueryErrorKind::InvalidPhrase,
            "grouping a vector requires a following >> reduction".to_string(),
            span,
        ));
    }
    let reduce_spanned = exec.advance();
    let QueryOperation::ReduceToScalar(call) = reduce_spanned.op else {
        unreachable!("checked above");
    };
    let reduce_mods = parse_step_mods(exec, false, false);

    let (group_names, groups_axis) = group_index(exec, &key, reduce_spanned.span)?;
    let buckets = bucket_by(&key.values, &group_names);
    let result_dtype = call.op.result_dtype(state.values.dtype());
    let mut reduced = Vec::with_capacity(group_names.len());
    for (bucket, group_name) in buckets.iter().zip(group_names.iter()) {
        let sub = state.values.gather(bucket);
        let value = reduce_slice(
            exec,
            &call,
            reduce_mods.if_missing.as_ref(),
            result_dtype,
            &sub,
            reduce_spanned.span,
        )
        .map_err(|err| empty_group_context(err, group_name))?;
        reduced.push(value);
    }
    let values = ArrayData::from_values(result_dtype, &reduced)?;
    exec.push(StackElement::Vector(VectorState {
        entries_axis_name: groups_axis,
        entries: group_names,
        property_name: state.property_name.clone(),
        property_axis_name: None,
        is_complete_property_axis: false,
        values,
        pending_final_values: None,
    }));
    Ok(())
}

/// Rewrites a missing-default failure on a group into `EmptyGroup`.
fn empty_group_context(
    err: axial_common::Error,
    group_name: &str,
) -> axial_common::Error {
    match err {
        axial_common::Error::Query(query_err)
            if query_err.kind() == QueryErrorKind::MissingDefault =>
        {
            let mut rebuilt = axial_common::QueryError::new(
                QueryErrorKind::EmptyGroup,
                format!("the group {group_name} has no members and no default was provided"),
            );
            if let Some(location) = query_err.location() {
                rebuilt = rebuilt.with_location(
                    location.query.clone(),
                    location.start,
                    location.end,
                );
            }
            axial_common::Error::Query(rebuilt)
        }
        other => other,
    }
}

/// `-/ key ... >- Op` or `|/ key ... >| Op` over a matrix: reduce the
/// grouped axis, preserving the other one.
fn run_group_matrix(exec: &mut Executor<'_>, group_rows: bool) -> Result<()> {
    let StackElement::Matrix(state) = exec.pop() else {
        unreachable!("the phrase pattern guarantees a matrix state");
    };
    let spanned = exec.advance();
    let key_property = match spanned.op {
        QueryOperation::GroupRowsBy(op) | QueryOperation::GroupColumnsBy(op) => op.name,
        _ => unreachable!("the phrase pattern guarantees a matrix group-by"),
    };
    let grouped_side = if group_rows {
        &state.rows
    } else {
        &state.columns
    };
    let key = fetch_key(exec, grouped_side, &key_property, spanned.span)?;

    let expected = if group_rows {
        matches!(exec.peek(), Some(QueryOperation::ReduceToRow(_)))
    } else {
        matches!(exec.peek(), Some(QueryOperation::ReduceToColumn(_)))
    };
    if !expected {
        let span = exec.span_here();
        let wanted = if group_rows { ">-" } else { ">|" };
        return Err(exec.err(
            QueryErrorKind::InvalidPhrase,
            format!("this grouping requires a following {wanted} reduction"),
            span,
        ));
    }
    let reduce_spanned = exec.advance();
    let call = match reduce_spanned.op {
        QueryOperation::ReduceToRow(call) | QueryOperation::ReduceToColumn(call) => call,
        _ => unreachable!("checked above"),
    };
    let reduce_mods = parse_step_mods(exec, false, false);

    let (group_names, groups_axis) = group_index(exec, &key, reduce_spanned.span)?;
    let buckets = bucket_by(&key.values, &group_names);
    let result_dtype = call.op.result_dtype(state.values.dtype());

    let kept = if group_rows {
        &state.columns
    } else {
        &state.rows
    };
    let kept_count = kept.len();
    // Column-major: for each result column, all its rows in order.
    let (result_rows, result_columns) = if group_rows {
        (group_names.len(), kept_count)
    } else {
        (kept_count, group_names.len())
    };
    let mut flat = Vec::with_capacity(result_rows * result_columns);
    for column in 0..result_columns {
        for row in 0..result_rows {
            let (bucket, group_name, kept_index) = if group_rows {
                (&buckets[row], &group_names[row], column)
            } else {
                (&buckets[column], &group_names[column], row)
            };
            let slice = if group_rows {
                state.values.gather(bucket, &[kept_index])
            } else {
                state.values.gather(&[kept_index], bucket)
            };
            let value = reduce_slice(
                exec,
                &call,
                reduce_mods.if_missing.as_ref(),
                result_dtype,
                slice.flat(),
                reduce_spanned.span,
            )
            .map_err(|err| empty_group_context(err, group_name))?;
            flat.push(value);
        }
    }
    let values = MatrixData::new(
        ArrayData::from_values(result_dtype, &flat)?,
        result_rows,
        result_columns,
    )?;
    let groups_state = index_state(group_names, groups_axis);
    let (rows, columns) = if group_rows {
        (groups_state, state.columns.clone())
    } else {
        (state.rows.clone(), groups_state)
    };
    exec.push(StackElement::Matrix(MatrixState {
        rows,
        columns,
        property_name: state.property_name.clone(),
        values,
    }));
    Ok(())
}

/// `-/ key ... >- Op`: group the rows.
pub(super) fn run_group_rows(exec: &mut Executor<'_>) -> Result<()> {
    run_group_matrix(exec, true)
}

/// `|/ key ... >| Op`: group the columns.
pub(super) fn run_group_columns(exec: &mut Executor<'_>) -> Result<()> {
    run_group_matrix(exec, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_sorted_names_numeric() {
        let values = ArrayData::I32(vec![30, 10, 20, 10]);
        assert_eq!(unique_sorted_names(&values), vec!["10", "20", "30"]);
    }

    #[test]
    fn test_unique_sorted_names_strings() {
        let values = ArrayData::Str(vec!["b".into(), "a".into(), "b".into(), String::new()]);
        assert_eq!(unique_sorted_names(&values), vec!["", "a", "b"]);
    }

    #[test]
    fn test_bucket_by_skips_unknown() {
        let key = ArrayData::Str(vec!["T".into(), "B".into(), String::new(), "T".into()]);
        let buckets = bucket_by(&key, &["T".to_string(), "B".to_string()]);
        assert_eq!(buckets, vec![vec![0, 3], vec![1]]);
    }
}
