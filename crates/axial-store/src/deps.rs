//! Cache-invalidation dependency keys.
//!
//! Every store artifact a query touches is identified by one of these
//! structured tags. The executor unions them into a [`DepSet`] returned
//! with the query result, so an (external) caching layer can drop cached
//! results when a write invalidates any key they depend on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of dependency keys one query accumulated.
pub type DepSet = BTreeSet<DependencyKey>;

/// Identifies one store artifact a query result depends on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyKey {
    /// The set of axis names.
    AxesSet,
    /// The set of scalar property names.
    ScalarsSet,
    /// The set of vector property names of one axis.
    VectorsSet(String),
    /// The set of matrix property names of an axis pair; the flag records
    /// whether relayout-reachable matrices were included.
    MatricesSet(String, String, bool),
    /// One axis (its entries and their order).
    Axis(String),
    /// One scalar property.
    Scalar(String),
    /// One vector property, as (axis, name).
    Vector(String, String),
    /// One matrix property, as (rows axis, columns axis, name).
    Matrix(String, String, String),
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKey::AxesSet => write!(f, "axes"),
            DependencyKey::ScalarsSet => write!(f, "scalars"),
            DependencyKey::VectorsSet(axis) => write!(f, "vectors@{axis}"),
            DependencyKey::MatricesSet(rows, columns, relayout) => {
                write!(f, "matrices@{rows},{columns};relayout={relayout}")
            }
            DependencyKey::Axis(axis) => write!(f, "axis@{axis}"),
            DependencyKey::Scalar(name) => write!(f, "scalar:{name}"),
            DependencyKey::Vector(axis, name) => write!(f, "vector@{axis}:{name}"),
            DependencyKey::Matrix(rows, columns, name) => {
                write!(f, "matrix@{rows},{columns}:{name}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_ordered_and_unique() {
        let mut deps = DepSet::new();
        deps.insert(DependencyKey::Vector("cell".into(), "age".into()));
        deps.insert(DependencyKey::Axis("cell".into()));
        deps.insert(DependencyKey::Vector("cell".into(), "age".into()));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DependencyKey::Matrix("cell".into(), "gene".into(), "UMIs".into()).to_string(),
            "matrix@cell,gene:UMIs"
        );
        assert_eq!(
            DependencyKey::MatricesSet("a".into(), "b".into(), true).to_string(),
            "matrices@a,b;relayout=true"
        );
    }
}
