//! The abstract store interface the query executor depends on.
//!
//! A store organizes data around named axes (ordered sets of unique entry
//! names) and properties: scalars, per-axis vectors, and per-axis-pair
//! matrices. The executor only ever reads; implementations must provide
//! single-writer / multiple-reader discipline so queries can run in
//! parallel from different threads.

use axial_common::{ArrayData, MatrixData, Value};
use axial_common::utils::error::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A vector property together with the entry names of its axis.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVector {
    /// The axis indexing the values, when one exists. Store lookups always
    /// carry an axis; derived results (e.g. grouping by observed values)
    /// may not.
    pub axis: Option<String>,
    /// The entry name of each position.
    pub names: Arc<Vec<String>>,
    /// The values, one per entry.
    pub values: ArrayData,
}

impl NamedVector {
    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the vector has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The value at the entry with the given name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| self.values.value(index))
    }
}

/// A matrix property together with the entry names of both its axes.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMatrix {
    /// The axis indexing the rows, when one exists.
    pub rows_axis: Option<String>,
    /// The axis indexing the columns, when one exists.
    pub columns_axis: Option<String>,
    /// Row entry names.
    pub row_names: Arc<Vec<String>>,
    /// Column entry names.
    pub column_names: Arc<Vec<String>>,
    /// The values, column-major.
    pub values: MatrixData,
}

impl NamedMatrix {
    /// The value at the named row and column, if both exist.
    #[must_use]
    pub fn get(&self, row: &str, column: &str) -> Option<Value> {
        let row_index = self.row_names.iter().position(|name| name == row)?;
        let column_index = self.column_names.iter().position(|name| name == column)?;
        Some(self.values.get(row_index, column_index))
    }
}

/// Read-only access to an axes-and-properties store.
///
/// This is the entire surface the executor is allowed to touch. A matrix
/// may be stored once or in both orientations; passing `relayout = true`
/// allows the store to materialize (and cache) the transposed orientation
/// on demand. Square matrices are stored once only and never relayouted.
pub trait Store: Send + Sync {
    /// The names of all axes.
    fn axes_set(&self) -> BTreeSet<String>;

    /// The names of all scalar properties.
    fn scalars_set(&self) -> BTreeSet<String>;

    /// The names of the vector properties of an axis.
    fn vectors_set(&self, axis: &str) -> Result<BTreeSet<String>>;

    /// The names of the matrix properties of an ordered axis pair.
    ///
    /// With `relayout`, matrices stored only in the transposed orientation
    /// are included as well.
    fn matrices_set(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        relayout: bool,
    ) -> Result<BTreeSet<String>>;

    /// The ordered unique entry names of an axis.
    fn axis_entries(&self, axis: &str) -> Result<Arc<Vec<String>>>;

    /// The number of entries of an axis.
    fn axis_length(&self, axis: &str) -> Result<usize> {
        Ok(self.axis_entries(axis)?.len())
    }

    /// The position of an entry in an axis, or `None` if absent.
    fn axis_index_of(&self, axis: &str, entry: &str) -> Result<Option<usize>>;

    /// Whether an axis exists.
    fn has_axis(&self, axis: &str) -> bool;

    /// Whether a scalar property exists.
    fn has_scalar(&self, name: &str) -> bool;

    /// Whether a vector property exists on an axis.
    fn has_vector(&self, axis: &str, name: &str) -> bool;

    /// Whether a matrix property exists on an ordered axis pair,
    /// considering the transposed orientation when `relayout` is set.
    fn has_matrix(&self, rows_axis: &str, columns_axis: &str, name: &str, relayout: bool) -> bool;

    /// A scalar property value.
    fn get_scalar(&self, name: &str) -> Result<Value>;

    /// A vector property with its axis entry names.
    fn get_vector(&self, axis: &str, name: &str) -> Result<NamedVector>;

    /// A matrix property in the requested orientation.
    ///
    /// When only the transposed orientation is stored and `relayout` is
    /// set, the store materializes (and may cache) the requested
    /// orientation; without `relayout` the lookup fails as unknown.
    fn get_matrix(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        name: &str,
        relayout: bool,
    ) -> Result<NamedMatrix>;

    /// The axis a property name implies, used when no explicit axis was
    /// declared: the prefix before the first `.` when that prefix is an
    /// axis, else the whole name when it is an axis.
    fn axis_of_property(&self, name: &str) -> Option<String> {
        let prefix = name.split('.').next().unwrap_or(name);
        if self.has_axis(prefix) {
            Some(prefix.to_string())
        } else if self.has_axis(name) {
            Some(name.to_string())
        } else {
            None
        }
    }
}
