//! Cross-tabulation of two vectors into a counts matrix.

use super::chain::{fetch_property_into, parse_step_mods};
use super::group::{bucket_by, declare_values_axis, group_index, index_state, aligned_carrier};
use super::Executor;
use crate::ops::QueryOperation;
use crate::state::{MatrixState, StackElement};
use axial_common::utils::error::{QueryErrorKind, Result};
use axial_common::utils::hash::FxHashMap;
use axial_common::{ArrayData, Dtype, MatrixData, Value};

/// `[=@ axis?] * partner [=@ axis?] [|| default]`: counts of value pairs.
///
/// The row index comes from the vector on the stack, the column index
/// from the partner fetched over the same entries. With `AsAxis` an index
/// is the declared axis in axis order; otherwise it is the sorted unique
/// observed values. Pairs with a value outside either index (the empty
/// string under `AsAxis`, say) contribute to no cell.
pub(super) fn run_count_by(exec: &mut Executor<'_>) -> Result<()> {
    // A leading `=@` declares the axis of the row values.
    let rows_as_axis = if matches!(exec.peek(), Some(QueryOperation::AsAxis(_)))
        && matches!(exec.peek_at(1), Some(QueryOperation::CountBy(_)))
    {
        let spanned = exec.advance();
        let QueryOperation::AsAxis(op) = spanned.op else {
            unreachable!("peeked");
        };
        Some(op.name)
    } else {
        None
    };

    let mut rows_state = exec.pop_vector();
    rows_state.finalize()?;
    let spanned = exec.advance();
    let QueryOperation::CountBy(op) = spanned.op else {
        unreachable!("the phrase pattern guarantees a count-by");
    };
    if let Some(declared) = rows_as_axis {
        declare_values_axis(exec, &mut rows_state, declared, spanned.span)?;
    }

    // The partner vector, fetched over the same entries.
    let mods = parse_step_mods(exec, true, false);
    let mut columns_state = aligned_carrier(exec, &rows_state, spanned.span)?;
    let mut carried = None;
    fetch_property_into(
        exec,
        &mut columns_state,
        &op.name,
        &mods,
        None,
        &mut carried,
        spanned.span,
    )?;
    if matches!(exec.peek(), Some(QueryOperation::AsAxis(_))) {
        let as_axis_spanned = exec.advance();
        let QueryOperation::AsAxis(as_axis_op) = as_axis_spanned.op else {
            unreachable!("peeked");
        };
        declare_values_axis(exec, &mut columns_state, as_axis_op.name, as_axis_spanned.span)?;
    }
    if columns_state.len() != rows_state.len() {
        return Err(exec.err(
            QueryErrorKind::ShapeMismatch,
            format!(
                "counting {} values against {} values",
                rows_state.len(),
                columns_state.len()
            ),
            spanned.span,
        ));
    }

    let (row_names, rows_axis) = group_index(exec, &rows_state, spanned.span)?;
    let (column_names, columns_axis) = group_index(exec, &columns_state, spanned.span)?;
    let row_buckets = bucket_by(&rows_state.values, &row_names);
    let column_of: FxHashMap<&str, usize> = column_names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let rows = row_names.len();
    let columns = column_names.len();
    let mut counts = vec![0u64; rows * columns];
    for (row, bucket) in row_buckets.iter().enumerate() {
        for &position in bucket {
            let value = columns_state.values.value(position).to_string();
            if let Some(&column) = column_of.get(value.as_str()) {
                counts[column * rows + row] += 1;
            }
        }
    }

    // The smallest unsigned type that can hold the largest possible count.
    let dtype = Dtype::smallest_unsigned_for(rows_state.len());
    let flat: Vec<Value> = counts.into_iter().map(Value::UInt).collect();
    let values = MatrixData::new(ArrayData::from_values(dtype, &flat)?, rows, columns)?;

    exec.push(StackElement::Matrix(MatrixState {
        rows: index_state(row_names, rows_axis),
        columns: index_state(column_names, columns_axis),
        property_name: None,
        values,
    }));
    Ok(())
}
