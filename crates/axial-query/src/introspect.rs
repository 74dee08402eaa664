//! Query introspection: result shape prediction without a store, axis
//! query recognition, and relayout detection.

use crate::executor::get_query;
use crate::ops::{Query, QueryOperation};
use axial_common::types::CompareKind;
use axial_common::utils::error::Result;
use axial_common::Value;
use axial_store::{NamedMatrix, NamedVector, Store};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rank {
    Names,
    Scalar,
    Vector,
    Matrix,
}

impl Query {
    /// True when the query is exactly one named axis declaration, so its
    /// result is the entry names of that axis on every store that has it.
    #[must_use]
    pub fn is_axis_query(&self) -> bool {
        matches!(
            self.spanned_ops(),
            [spanned] if matches!(&spanned.op, QueryOperation::Axis(axis) if axis.name.is_some())
        )
    }

    /// The axis of an axis query.
    #[must_use]
    pub fn axis_name(&self) -> Option<&str> {
        if !self.is_axis_query() {
            return None;
        }
        match &self.spanned_ops()[0].op {
            QueryOperation::Axis(axis) => axis.name.as_deref(),
            _ => None,
        }
    }

    /// The rank of the result this query produces: -1 for a name set, 0
    /// for a scalar, 1 for a vector, 2 for a matrix.
    ///
    /// Computed by a symbolic walk over the operations, without a store;
    /// only meaningful for queries that execute successfully.
    #[must_use]
    pub fn result_dimensions(&self) -> i8 {
        let ops: Vec<&QueryOperation> = self.operations().collect();
        let mut stack: Vec<Rank> = Vec::new();
        let mut index = 0;
        while index < ops.len() {
            index = step_symbolically(&ops, index, &mut stack);
        }
        match stack.last() {
            Some(Rank::Names) => -1,
            Some(Rank::Scalar) => 0,
            Some(Rank::Vector) | None => 1,
            Some(Rank::Matrix) => 2,
        }
    }

    /// Whether executing this query against the store would materialize
    /// (or reuse) a relayouted matrix orientation.
    #[must_use]
    pub fn requires_relayout(&self, store: &dyn Store) -> bool {
        let recorder = RelayoutRecorder {
            inner: store,
            relayouted: AtomicBool::new(false),
        };
        let _ = get_query(&recorder, self);
        recorder.relayouted.load(Ordering::Relaxed)
    }
}

/// Consumes one phrase worth of operations symbolically; returns the next
/// operation index. Unrecognized operations are skipped so the walk
/// always terminates.
fn step_symbolically(ops: &[&QueryOperation], index: usize, stack: &mut Vec<Rank>) -> usize {
    match ops[index] {
        QueryOperation::Names(_) => {
            while stack.last() == Some(&Rank::Vector) {
                stack.pop();
            }
            stack.push(Rank::Names);
            index + 1
        }
        QueryOperation::Axis(axis) if axis.name.is_none() => {
            if matches!(ops.get(index + 1), Some(QueryOperation::Names(_))) {
                stack.push(Rank::Names);
                index + 2
            } else {
                index + 1
            }
        }
        QueryOperation::LookupScalar(_) => {
            stack.push(Rank::Scalar);
            skip_modifiers(ops, index + 1, true)
        }
        QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_) if stack.is_empty() => {
            // The scalar element forms: lookups before any axis resolve
            // through `@ axis = entry` selectors to a single value.
            stack.push(Rank::Scalar);
            let mut next = skip_modifiers(ops, index + 1, true);
            while is_entry_selector(ops, next) {
                next += 2;
            }
            next
        }
        QueryOperation::Axis(_) if is_entry_selector(ops, index) => {
            stack.push(Rank::Scalar);
            skip_chain(ops, index + 2)
        }
        QueryOperation::Axis(_) => {
            stack.push(Rank::Vector);
            index + 1
        }
        QueryOperation::BeginMask(_) => {
            let mut next = index + 1;
            while next < ops.len() && !matches!(ops[next], QueryOperation::EndMask) {
                next += 1;
            }
            (next + 1).min(ops.len())
        }
        QueryOperation::LookupMatrix(_)
            if stack.len() >= 2 && stack.ends_with(&[Rank::Vector, Rank::Vector]) =>
        {
            stack.pop();
            stack.pop();
            stack.push(Rank::Matrix);
            skip_modifiers(ops, index + 1, true)
        }
        QueryOperation::AsAxis(_) | QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_)
            if matches!(stack.last(), Some(Rank::Vector)) =>
        {
            if matches!(ops[index], QueryOperation::AsAxis(_))
                && matches!(ops.get(index + 1), Some(QueryOperation::CountBy(_)))
            {
                // An axis declaration for count-by rows, not a chain.
                stack.pop();
                stack.push(Rank::Matrix);
                skip_modifiers(ops, skip_as_axis_tail(ops, index + 2), true)
            } else {
                let next = skip_chain(ops, index);
                // A dangling axis declaration is not a chain; step over it.
                if next == index { index + 1 } else { next }
            }
        }
        QueryOperation::CountBy(_) => {
            stack.pop();
            stack.push(Rank::Matrix);
            skip_modifiers(ops, skip_as_axis_tail(ops, index + 1), true)
        }
        QueryOperation::GroupBy(_) => {
            let mut next = skip_modifiers(ops, skip_as_axis_tail(ops, index + 1), true);
            next = skip_as_axis_tail(ops, next);
            if matches!(ops.get(next), Some(QueryOperation::ReduceToScalar(_))) {
                next = skip_modifiers(ops, next + 1, true);
            }
            next
        }
        QueryOperation::GroupRowsBy(_) | QueryOperation::GroupColumnsBy(_) => {
            let mut next = skip_modifiers(ops, skip_as_axis_tail(ops, index + 1), true);
            next = skip_as_axis_tail(ops, next);
            if matches!(
                ops.get(next),
                Some(QueryOperation::ReduceToRow(_) | QueryOperation::ReduceToColumn(_))
            ) {
                next = skip_modifiers(ops, next + 1, true);
            }
            next
        }
        QueryOperation::Compare(_) | QueryOperation::Match(_) | QueryOperation::Eltwise(_) => {
            index + 1
        }
        QueryOperation::ReduceToScalar(_) => {
            stack.pop();
            stack.push(Rank::Scalar);
            skip_modifiers(ops, index + 1, true)
        }
        QueryOperation::ReduceToRow(_) | QueryOperation::ReduceToColumn(_) => {
            stack.pop();
            stack.push(Rank::Vector);
            skip_modifiers(ops, index + 1, true)
        }
        _ => index + 1,
    }
}

fn is_entry_selector(ops: &[&QueryOperation], index: usize) -> bool {
    matches!(ops.get(index), Some(QueryOperation::Axis(axis)) if axis.name.is_some())
        && matches!(
            ops.get(index + 1),
            Some(QueryOperation::Compare(compare)) if compare.kind == CompareKind::Equal
        )
}

/// Skips `IfMissing` / `IfNot` and slice selections after a lookup.
fn skip_modifiers(ops: &[&QueryOperation], mut index: usize, allow_slice: bool) -> usize {
    loop {
        match ops.get(index) {
            Some(QueryOperation::IfMissing(_) | QueryOperation::IfNot(_)) => index += 1,
            Some(QueryOperation::SquareColumnIs(_) | QueryOperation::SquareRowIs(_))
                if allow_slice =>
            {
                index += 1;
            }
            _ if allow_slice && is_entry_selector(ops, index) => index += 2,
            _ => return index,
        }
    }
}

fn skip_as_axis_tail(ops: &[&QueryOperation], index: usize) -> usize {
    if matches!(ops.get(index), Some(QueryOperation::AsAxis(_))) {
        index + 1
    } else {
        index
    }
}

/// Skips a whole lookup chain (steps with axis declarations and
/// modifiers).
fn skip_chain(ops: &[&QueryOperation], mut index: usize) -> usize {
    loop {
        let after_as_axis = if matches!(ops.get(index), Some(QueryOperation::AsAxis(_)))
            && matches!(
                ops.get(index + 1),
                Some(QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_))
            ) {
            index + 1
        } else {
            index
        };
        match ops.get(after_as_axis) {
            Some(QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_)) => {
                index = skip_modifiers(ops, after_as_axis + 1, true);
            }
            _ => return index,
        }
    }
}

/// A pass-through store that records whether any matrix access was served
/// from the transposed orientation.
struct RelayoutRecorder<'a> {
    inner: &'a dyn Store,
    relayouted: AtomicBool,
}

impl Store for RelayoutRecorder<'_> {
    fn axes_set(&self) -> BTreeSet<String> {
        self.inner.axes_set()
    }

    fn scalars_set(&self) -> BTreeSet<String> {
        self.inner.scalars_set()
    }

    fn vectors_set(&self, axis: &str) -> Result<BTreeSet<String>> {
        self.inner.vectors_set(axis)
    }

    fn matrices_set(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        relayout: bool,
    ) -> Result<BTreeSet<String>> {
        self.inner.matrices_set(rows_axis, columns_axis, relayout)
    }

    fn axis_entries(&self, axis: &str) -> Result<Arc<Vec<String>>> {
        self.inner.axis_entries(axis)
    }

    fn axis_index_of(&self, axis: &str, entry: &str) -> Result<Option<usize>> {
        self.inner.axis_index_of(axis, entry)
    }

    fn has_axis(&self, axis: &str) -> bool {
        self.inner.has_axis(axis)
    }

    fn has_scalar(&self, name: &str) -> bool {
        self.inner.has_scalar(name)
    }

    fn has_vector(&self, axis: &str, name: &str) -> bool {
        self.inner.has_vector(axis, name)
    }

    fn has_matrix(&self, rows_axis: &str, columns_axis: &str, name: &str, relayout: bool) -> bool {
        self.inner.has_matrix(rows_axis, columns_axis, name, relayout)
    }

    fn get_scalar(&self, name: &str) -> Result<Value> {
        self.inner.get_scalar(name)
    }

    fn get_vector(&self, axis: &str, name: &str) -> Result<NamedVector> {
        self.inner.get_vector(axis, name)
    }

    fn get_matrix(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        name: &str,
        relayout: bool,
    ) -> Result<NamedMatrix> {
        if relayout
            && !self.inner.has_matrix(rows_axis, columns_axis, name, false)
            && self.inner.has_matrix(rows_axis, columns_axis, name, true)
        {
            self.relayouted.store(true, Ordering::Relaxed);
        }
        self.inner.get_matrix(rows_axis, columns_axis, name, relayout)
    }

    fn axis_of_property(&self, name: &str) -> Option<String> {
        self.inner.axis_of_property(name)
    }
}
