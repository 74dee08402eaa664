//! # Axial
//!
//! A concatenative query language over a store of named axes and typed
//! properties (scalars, per-axis vectors, per-axis-pair matrices).
//!
//! Queries are small operator pipelines: declare axes, look properties
//! up, fetch through indirections, mask, group, count and reduce. Every
//! query returns one of four shapes: a set of names, a scalar, a named
//! vector, or a named matrix.
//!
//! ## Quick Start
//!
//! ```rust
//! use axial::{get_query, parse, MemoryStore, QueryValue};
//! use axial::{ArrayData, Value};
//!
//! let store = MemoryStore::new();
//! store.create_axis("cell", ["c1", "c2", "c3"])?;
//! store.set_vector("cell", "age", ArrayData::I32(vec![10, 20, 30]))?;
//!
//! let query = parse("@ cell : age >> Sum")?;
//! let answer = get_query(&store, &query)?;
//! assert_eq!(answer.value, QueryValue::Scalar(Value::Int(60)));
//! # Ok::<(), axial::Error>(())
//! ```

// Re-export the query API - parsing, execution, registration
pub use axial_query::{
    get_query, has_query, parse, OperandKind, Parser, Query, QueryAnswer, QueryOperation,
    QueryValue, Registry,
};
pub use axial_query::registry::{EltwiseOperation, Params, ReductionOperation};

// Re-export the storage boundary
pub use axial_store::{DepSet, DependencyKey, MemoryStore, NamedMatrix, NamedVector, Store};

// Re-export core types - you'll need these for values and arrays
pub use axial_common::{ArrayData, Dtype, Error, MatrixData, Result, Value};
