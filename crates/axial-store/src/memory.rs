//! The in-memory reference store.
//!
//! Holds axes and properties in hash maps behind `parking_lot` RwLocks,
//! which gives the single-writer / multiple-reader discipline the
//! executor relies on. Reads hand out owned copies of the data (the
//! executor treats everything as read-only anyway and copies before
//! mutating).
//!
//! Relayout: a matrix stored as `(b, a)` can be served as `(a, b)` when
//! the caller allows it. The transposed copy is materialized on first
//! request and cached under a lock of its own, so an in-flight read
//! reservation on the primary maps is never violated.

use crate::store::{NamedMatrix, NamedVector, Store};
use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result, StoreError};
use axial_common::utils::hash::FxHashMap;
use axial_common::{ArrayData, MatrixData, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

struct AxisInfo {
    entries: Arc<Vec<String>>,
    dict: FxHashMap<String, usize>,
}

/// A complete in-memory implementation of [`Store`].
///
/// Intended as the reference backend for tests and small data; a
/// persistent backend would implement the same trait.
#[derive(Default)]
pub struct MemoryStore {
    axes: RwLock<IndexMap<String, AxisInfo>>,
    scalars: RwLock<FxHashMap<String, Value>>,
    vectors: RwLock<FxHashMap<(String, String), Arc<ArrayData>>>,
    matrices: RwLock<FxHashMap<(String, String, String), Arc<MatrixData>>>,
    relayouts: RwLock<FxHashMap<(String, String, String), Arc<MatrixData>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an axis with the given ordered entry names.
    ///
    /// The names must be unique and the axis must not exist yet.
    pub fn create_axis(
        &self,
        axis: &str,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        let mut dict = FxHashMap::default();
        for (index, entry) in entries.iter().enumerate() {
            if dict.insert(entry.clone(), index).is_some() {
                return Err(Error::Store(StoreError::DuplicateEntries(axis.to_string())));
            }
        }
        let mut axes = self.axes.write();
        if axes.contains_key(axis) {
            return Err(Error::Store(StoreError::AxisExists(axis.to_string())));
        }
        axes.insert(
            axis.to_string(),
            AxisInfo {
                entries: Arc::new(entries),
                dict,
            },
        );
        Ok(())
    }

    /// Sets (or overwrites) a scalar property.
    pub fn set_scalar(&self, name: &str, value: Value) {
        self.scalars.write().insert(name.to_string(), value);
    }

    /// Sets (or overwrites) a vector property of an axis.
    ///
    /// The array length must equal the axis length.
    pub fn set_vector(&self, axis: &str, name: &str, values: ArrayData) -> Result<()> {
        let expected = {
            let axes = self.axes.read();
            let info = axes
                .get(axis)
                .ok_or_else(|| Error::Store(StoreError::NoSuchAxis(axis.to_string())))?;
            info.entries.len()
        };
        if values.len() != expected {
            return Err(Error::Store(StoreError::ShapeMismatch(format!(
                "the vector {name} has {} entries but the axis {axis} has {expected}",
                values.len()
            ))));
        }
        self.vectors
            .write()
            .insert((axis.to_string(), name.to_string()), Arc::new(values));
        Ok(())
    }

    /// Sets (or overwrites) a matrix property of an ordered axis pair.
    ///
    /// The shape must be `(length of rows_axis, length of columns_axis)`.
    /// Overwriting drops any cached relayout of the same matrix.
    pub fn set_matrix(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        name: &str,
        values: MatrixData,
    ) -> Result<()> {
        let (expected_rows, expected_columns) = {
            let axes = self.axes.read();
            let rows = axes
                .get(rows_axis)
                .ok_or_else(|| Error::Store(StoreError::NoSuchAxis(rows_axis.to_string())))?
                .entries
                .len();
            let columns = axes
                .get(columns_axis)
                .ok_or_else(|| Error::Store(StoreError::NoSuchAxis(columns_axis.to_string())))?
                .entries
                .len();
            (rows, columns)
        };
        if values.rows() != expected_rows || values.columns() != expected_columns {
            return Err(Error::Store(StoreError::ShapeMismatch(format!(
                "the matrix {name} is {} x {} but the axes {rows_axis} x {columns_axis} \
                 are {expected_rows} x {expected_columns}",
                values.rows(),
                values.columns()
            ))));
        }
        let key = (
            rows_axis.to_string(),
            columns_axis.to_string(),
            name.to_string(),
        );
        self.relayouts.write().remove(&(
            columns_axis.to_string(),
            rows_axis.to_string(),
            name.to_string(),
        ));
        self.matrices.write().insert(key, Arc::new(values));
        Ok(())
    }

    fn unknown_axis(axis: &str) -> Error {
        Error::Query(QueryError::new(
            QueryErrorKind::UnknownAxis,
            format!("the store has no axis named {axis}"),
        ))
    }

    fn require_axis_entries(&self, axis: &str) -> Result<Arc<Vec<String>>> {
        let axes = self.axes.read();
        axes.get(axis)
            .map(|info| Arc::clone(&info.entries))
            .ok_or_else(|| Self::unknown_axis(axis))
    }

    /// The number of cached relayouts, exposed for tests.
    #[cfg(test)]
    fn cached_relayouts(&self) -> usize {
        self.relayouts.read().len()
    }
}

impl Store for MemoryStore {
    fn axes_set(&self) -> BTreeSet<String> {
        self.axes.read().keys().cloned().collect()
    }

    fn scalars_set(&self) -> BTreeSet<String> {
        self.scalars.read().keys().cloned().collect()
    }

    fn vectors_set(&self, axis: &str) -> Result<BTreeSet<String>> {
        self.require_axis_entries(axis)?;
        Ok(self
            .vectors
            .read()
            .keys()
            .filter(|(vector_axis, _)| vector_axis == axis)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn matrices_set(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        relayout: bool,
    ) -> Result<BTreeSet<String>> {
        self.require_axis_entries(rows_axis)?;
        self.require_axis_entries(columns_axis)?;
        let matrices = self.matrices.read();
        let mut names: BTreeSet<String> = matrices
            .keys()
            .filter(|(rows, columns, _)| rows == rows_axis && columns == columns_axis)
            .map(|(_, _, name)| name.clone())
            .collect();
        if relayout && rows_axis != columns_axis {
            names.extend(
                matrices
                    .keys()
                    .filter(|(rows, columns, _)| rows == columns_axis && columns == rows_axis)
                    .map(|(_, _, name)| name.clone()),
            );
        }
        Ok(names)
    }

    fn axis_entries(&self, axis: &str) -> Result<Arc<Vec<String>>> {
        self.require_axis_entries(axis)
    }

    fn axis_index_of(&self, axis: &str, entry: &str) -> Result<Option<usize>> {
        let axes = self.axes.read();
        let info = axes.get(axis).ok_or_else(|| Self::unknown_axis(axis))?;
        Ok(info.dict.get(entry).copied())
    }

    fn has_axis(&self, axis: &str) -> bool {
        self.axes.read().contains_key(axis)
    }

    fn has_scalar(&self, name: &str) -> bool {
        self.scalars.read().contains_key(name)
    }

    fn has_vector(&self, axis: &str, name: &str) -> bool {
        self.vectors
            .read()
            .contains_key(&(axis.to_string(), name.to_string()))
    }

    fn has_matrix(&self, rows_axis: &str, columns_axis: &str, name: &str, relayout: bool) -> bool {
        let matrices = self.matrices.read();
        let key = (
            rows_axis.to_string(),
            columns_axis.to_string(),
            name.to_string(),
        );
        if matrices.contains_key(&key) {
            return true;
        }
        relayout
            && rows_axis != columns_axis
            && matrices.contains_key(&(
                columns_axis.to_string(),
                rows_axis.to_string(),
                name.to_string(),
            ))
    }

    fn get_scalar(&self, name: &str) -> Result<Value> {
        self.scalars.read().get(name).cloned().ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::UnknownProperty,
                format!("the store has no scalar named {name}"),
            ))
        })
    }

    fn get_vector(&self, axis: &str, name: &str) -> Result<NamedVector> {
        let names = self.require_axis_entries(axis)?;
        let values = self
            .vectors
            .read()
            .get(&(axis.to_string(), name.to_string()))
            .map(|values| (**values).clone())
            .ok_or_else(|| {
                Error::Query(QueryError::new(
                    QueryErrorKind::UnknownProperty,
                    format!("the axis {axis} has no vector named {name}"),
                ))
            })?;
        Ok(NamedVector {
            axis: Some(axis.to_string()),
            names,
            values,
        })
    }

    fn get_matrix(
        &self,
        rows_axis: &str,
        columns_axis: &str,
        name: &str,
        relayout: bool,
    ) -> Result<NamedMatrix> {
        let row_names = self.require_axis_entries(rows_axis)?;
        let column_names = self.require_axis_entries(columns_axis)?;
        let key = (
            rows_axis.to_string(),
            columns_axis.to_string(),
            name.to_string(),
        );
        let stored = self.matrices.read().get(&key).map(Arc::clone);
        let values = if let Some(values) = stored {
            (*values).clone()
        } else {
            let transposed_key = (
                columns_axis.to_string(),
                rows_axis.to_string(),
                name.to_string(),
            );
            let transposed = self.matrices.read().get(&transposed_key).map(Arc::clone);
            match transposed {
                Some(stored_transposed) if relayout && rows_axis != columns_axis => {
                    let mut relayouts = self.relayouts.write();
                    let cached = relayouts.entry(key).or_insert_with(|| {
                        debug!(
                            matrix = name,
                            rows = rows_axis,
                            columns = columns_axis,
                            "materializing relayout"
                        );
                        Arc::new(stored_transposed.transposed())
                    });
                    (**cached).clone()
                }
                _ => {
                    return Err(Error::Query(QueryError::new(
                        QueryErrorKind::UnknownProperty,
                        format!(
                            "the axes {rows_axis} x {columns_axis} have no matrix named {name}"
                        ),
                    )));
                }
            }
        };
        Ok(NamedMatrix {
            rows_axis: Some(rows_axis.to_string()),
            columns_axis: Some(columns_axis.to_string()),
            row_names,
            column_names,
            values,
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("axes", &self.axes.read().len())
            .field("scalars", &self.scalars.read().len())
            .field("vectors", &self.vectors.read().len())
            .field("matrices", &self.matrices.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axial_common::Dtype;

    fn store_with_umis() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_axis("cell", ["c1", "c2", "c3", "c4"])
            .unwrap();
        store.create_axis("gene", ["g1", "g2"]).unwrap();
        let umis = MatrixData::from_rows(
            Dtype::I32,
            4,
            2,
            &[1, 2, 3, 4, 5, 6, 7, 8].map(Value::Int),
        )
        .unwrap();
        store.set_matrix("cell", "gene", "UMIs", umis).unwrap();
        store
    }

    #[test]
    fn test_axis_entries_are_ordered_and_unique() {
        let store = MemoryStore::new();
        store.create_axis("cell", ["c1", "c2"]).unwrap();
        assert_eq!(
            *store.axis_entries("cell").unwrap(),
            vec!["c1".to_string(), "c2".to_string()]
        );
        assert_eq!(store.axis_index_of("cell", "c2").unwrap(), Some(1));
        assert_eq!(store.axis_index_of("cell", "zz").unwrap(), None);
        assert!(store.create_axis("cell", ["x"]).is_err());
        assert!(store.create_axis("dup", ["a", "a"]).is_err());
    }

    #[test]
    fn test_vector_roundtrip_and_shape_check() {
        let store = MemoryStore::new();
        store.create_axis("cell", ["c1", "c2"]).unwrap();
        store
            .set_vector("cell", "age", ArrayData::I32(vec![10, 20]))
            .unwrap();
        let vector = store.get_vector("cell", "age").unwrap();
        assert_eq!(vector.values, ArrayData::I32(vec![10, 20]));
        assert_eq!(vector.get("c2"), Some(Value::Int(20)));
        assert!(store
            .set_vector("cell", "bad", ArrayData::I32(vec![1]))
            .is_err());
        assert!(store.get_vector("cell", "missing").is_err());
        assert!(store.get_vector("nope", "age").is_err());
    }

    #[test]
    fn test_matrix_relayout_is_cached() {
        let store = store_with_umis();

        // Stored orientation works without relayout.
        assert!(store.has_matrix("cell", "gene", "UMIs", false));
        assert!(!store.has_matrix("gene", "cell", "UMIs", false));
        assert!(store.has_matrix("gene", "cell", "UMIs", true));
        assert!(store.get_matrix("gene", "cell", "UMIs", false).is_err());

        let relayouted = store.get_matrix("gene", "cell", "UMIs", true).unwrap();
        assert_eq!(relayouted.values.rows(), 2);
        assert_eq!(relayouted.values.get(1, 3), Value::Int(8));
        assert_eq!(store.cached_relayouts(), 1);

        // Second request reuses the cached transpose.
        store.get_matrix("gene", "cell", "UMIs", true).unwrap();
        assert_eq!(store.cached_relayouts(), 1);
    }

    #[test]
    fn test_matrices_set_respects_relayout_flag() {
        let store = store_with_umis();
        assert!(store
            .matrices_set("gene", "cell", false)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.matrices_set("gene", "cell", true).unwrap(),
            BTreeSet::from(["UMIs".to_string()])
        );
    }

    #[test]
    fn test_scalars() {
        let store = MemoryStore::new();
        store.set_scalar("version", Value::Str("1.0".into()));
        assert_eq!(store.get_scalar("version").unwrap(), Value::Str("1.0".into()));
        assert!(store.get_scalar("missing").is_err());
        assert_eq!(store.scalars_set(), BTreeSet::from(["version".to_string()]));
    }
}
