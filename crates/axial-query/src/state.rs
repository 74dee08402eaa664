//! The typed stack the executor runs on.
//!
//! Each element is one of four variants; an axis is represented as a
//! [`VectorState`] whose values are exactly its own entry names.
//! Invariants are checked with `debug_assert!` after every phrase;
//! violating them is a bug in a phrase implementation, not a user error.

use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::{ArrayData, MatrixData, Value};
use std::collections::BTreeSet;

/// One element of the executor stack.
#[derive(Debug, Clone)]
pub(crate) enum StackElement {
    /// A set of names.
    Names(NamesState),
    /// A single scalar value.
    Scalar(ScalarState),
    /// A vector (or axis) with entry names.
    Vector(VectorState),
    /// A matrix with row and column states.
    Matrix(MatrixState),
}

impl StackElement {
    /// A short tag for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StackElement::Names(_) => "names",
            StackElement::Scalar(_) => "scalar",
            StackElement::Vector(_) => "vector",
            StackElement::Matrix(_) => "matrix",
        }
    }
}

/// A set of names (axes, scalars, vectors or matrices).
#[derive(Debug, Clone)]
pub(crate) struct NamesState {
    /// The names, deterministically ordered.
    pub names: BTreeSet<String>,
}

/// A single scalar value.
#[derive(Debug, Clone)]
pub(crate) struct ScalarState {
    /// The value.
    pub value: Value,
}

/// A vector of typed values over named entries.
///
/// Doubles as the axis state: a fresh axis pushes a `VectorState` whose
/// `values` are its own entry names and whose `property_axis_name` is the
/// axis itself.
#[derive(Debug, Clone)]
pub(crate) struct VectorState {
    /// The axis the entries belong to, when they came from one.
    pub entries_axis_name: Option<String>,
    /// The entry name of each position.
    pub entries: Vec<String>,
    /// The property the values were looked up from, if any.
    pub property_name: Option<String>,
    /// The axis the current (string) values are entry names of, once
    /// declared or inferred; cleared by every lookup until re-inferred.
    pub property_axis_name: Option<String>,
    /// True while the values are exactly the full entry list of
    /// `property_axis_name`, allowing direct axis-aligned copies.
    pub is_complete_property_axis: bool,
    /// The values, one per entry.
    pub values: ArrayData,
    /// Raw replacement values recorded by `IfNot`, applied when the chain
    /// finishes.
    pub pending_final_values: Option<Vec<Option<String>>>,
}

impl VectorState {
    /// The axis state: entries and values are the axis entry names.
    pub fn axis(axis: &str, entries: Vec<String>) -> VectorState {
        VectorState {
            entries_axis_name: Some(axis.to_string()),
            entries: entries.clone(),
            property_name: Some("name".to_string()),
            property_axis_name: Some(axis.to_string()),
            is_complete_property_axis: true,
            values: ArrayData::Str(entries),
            pending_final_values: None,
        }
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when this state still represents an axis: its values name the
    /// entries of the axis the entries themselves came from. Holds for a
    /// fresh axis and for one reduced by a mask region.
    pub fn is_axis_like(&self) -> bool {
        self.entries_axis_name.is_some()
            && self.property_axis_name == self.entries_axis_name
            && matches!(self.values, ArrayData::Str(_))
    }

    /// Drops the property identity, keeping entries and values. Used by
    /// comparisons, which produce plain boolean vectors.
    pub fn clear_property(&mut self) {
        self.property_name = None;
        self.property_axis_name = None;
        self.is_complete_property_axis = false;
    }

    /// Applies the pending replacement values recorded by `IfNot`,
    /// coercing each raw replacement to the value dtype.
    pub fn finalize(&mut self) -> Result<()> {
        let Some(pending) = self.pending_final_values.take() else {
            return Ok(());
        };
        let dtype = self.values.dtype();
        for (index, replacement) in pending.into_iter().enumerate() {
            let Some(raw) = replacement else { continue };
            let value = Value::parse_as(&raw, dtype).ok_or_else(|| {
                Error::Query(QueryError::new(
                    QueryErrorKind::UnsupportedType,
                    format!("the replacement value {raw} cannot be stored as {dtype}"),
                ))
            })?;
            self.values.set(index, &value)?;
        }
        Ok(())
    }

    /// Keeps only the positions where `keep` is true, in entries, values
    /// and pending replacements alike.
    pub fn retain(&mut self, keep: &[bool]) {
        self.entries = self
            .entries
            .iter()
            .zip(keep.iter())
            .filter_map(|(entry, &kept)| kept.then(|| entry.clone()))
            .collect();
        self.values = self.values.filter(keep);
        if let Some(pending) = &self.pending_final_values {
            self.pending_final_values = Some(
                pending
                    .iter()
                    .zip(keep.iter())
                    .filter_map(|(slot, &kept)| kept.then(|| slot.clone()))
                    .collect(),
            );
        }
        if self.is_complete_property_axis && keep.iter().any(|&kept| !kept) {
            self.is_complete_property_axis = false;
        }
    }

    /// Checks the structural invariants that must hold between phrases.
    pub fn assert_invariants(&self) {
        debug_assert_eq!(self.values.len(), self.entries.len());
        if let Some(pending) = &self.pending_final_values {
            debug_assert_eq!(pending.len(), self.values.len());
            debug_assert!(!self.is_complete_property_axis);
        }
    }
}

/// A matrix of typed values with axis-like row and column states.
#[derive(Debug, Clone)]
pub(crate) struct MatrixState {
    /// The row entries.
    pub rows: VectorState,
    /// The column entries.
    pub columns: VectorState,
    /// The property the values were looked up from, if any.
    pub property_name: Option<String>,
    /// The values, column-major, shaped `(rows.len(), columns.len())`.
    pub values: MatrixData,
}

impl MatrixState {
    /// Checks the structural invariants that must hold between phrases.
    pub fn assert_invariants(&self) {
        self.rows.assert_invariants();
        self.columns.assert_invariants();
        debug_assert_eq!(self.values.rows(), self.rows.len());
        debug_assert_eq!(self.values.columns(), self.columns.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> VectorState {
        VectorState::axis(
            "cell",
            vec!["c1".into(), "c2".into(), "c3".into(), "c4".into()],
        )
    }

    #[test]
    fn test_axis_state_is_axis_like() {
        let state = cells();
        assert!(state.is_axis_like());
        assert!(state.is_complete_property_axis);
        assert_eq!(state.values, ArrayData::Str(cells().entries));
    }

    #[test]
    fn test_retain_clears_completeness() {
        let mut state = cells();
        state.retain(&[true, false, true, false]);
        assert_eq!(state.entries, vec!["c1".to_string(), "c3".to_string()]);
        assert!(!state.is_complete_property_axis);
        assert!(state.is_axis_like());
        state.assert_invariants();
    }

    #[test]
    fn test_finalize_applies_pending() {
        let mut state = cells();
        state.property_name = Some("type".into());
        state.property_axis_name = None;
        state.is_complete_property_axis = false;
        state.values = ArrayData::Str(vec!["T".into(), "T".into(), "B".into(), String::new()]);
        state.pending_final_values = Some(vec![None, None, None, Some("black".into())]);
        state.finalize().unwrap();
        assert_eq!(
            state.values,
            ArrayData::Str(vec!["T".into(), "T".into(), "B".into(), "black".into()])
        );
        assert!(state.pending_final_values.is_none());
    }

    #[test]
    fn test_finalize_rejects_bad_coercion() {
        let mut state = cells();
        state.values = ArrayData::I32(vec![1, 2, 3, 4]);
        state.is_complete_property_axis = false;
        state.pending_final_values = Some(vec![Some("red".into()), None, None, None]);
        assert!(state.finalize().is_err());
    }
}
