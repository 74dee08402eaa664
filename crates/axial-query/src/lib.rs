//! # axial-query
//!
//! The query layer of Axial: a concatenative query language compiled to a
//! linear sequence of typed operations and executed by a stack-based
//! interpreter against any [`axial_store::Store`].
//!
//! ## Modules
//!
//! - [`tokens`] - Tokenizer: query text to operator/value tokens
//! - [`ops`] - The typed operation set and the canonical printer
//! - [`parser`] - Token stream to operation sequence
//! - [`registry`] - Registered element-wise and reduction operations
//! - [`executor`] - Phrase matching and execution against a store
//!
//! ## Quick start
//!
//! ```rust
//! use axial_query::{get_query, parse, QueryValue};
//! use axial_store::MemoryStore;
//! use axial_common::{ArrayData, Value};
//!
//! let store = MemoryStore::new();
//! store.create_axis("cell", ["c1", "c2"])?;
//! store.set_vector("cell", "age", ArrayData::I32(vec![10, 20]))?;
//!
//! let query = parse("@ cell : age >> Sum")?;
//! let answer = get_query(&store, &query)?;
//! assert!(matches!(answer.value, QueryValue::Scalar(Value::Int(30))));
//! # Ok::<(), axial_common::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod executor;
pub mod ops;
pub mod parser;
pub mod registry;
pub mod tokens;

mod introspect;
mod state;

pub use executor::{get_query, has_query, QueryAnswer, QueryValue};
pub use ops::{Query, QueryOperation};
pub use parser::{parse, OperandKind, Parser};
pub use registry::{EltwiseOperation, Params, ReductionOperation, Registry};
