//! The query executor.
//!
//! A stack-based interpreter: the remaining operations and the typed
//! stack are matched against an ordered table of *phrases*; the first
//! matching phrase consumes its operations (and the stack suffix it
//! declared) and pushes fresh states. Execution is a single pass with
//! per-phrase lookahead and no backtracking.

mod chain;
mod count;
mod group;
mod mask;
mod matrix;
mod names;
mod reduce;
mod scalar;

use crate::ops::{NamesKind, Query, QueryOperation, Span, SpannedOp};
use crate::state::{StackElement, VectorState};
use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::utils::hash::FxHashMap;
use axial_common::types::CompareKind;
use axial_common::Value;
use axial_store::{DepSet, DependencyKey, NamedMatrix, NamedVector, Store};
use std::sync::Arc;
use tracing::debug;

/// The shaped result of one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// A set of names.
    Names(std::collections::BTreeSet<String>),
    /// A single scalar.
    Scalar(Value),
    /// A named vector.
    Vector(NamedVector),
    /// A named matrix.
    Matrix(NamedMatrix),
}

impl QueryValue {
    /// The rank of the result: -1 for names, 0/1/2 for scalar, vector,
    /// matrix.
    #[must_use]
    pub fn dimensions(&self) -> i8 {
        match self {
            QueryValue::Names(_) => -1,
            QueryValue::Scalar(_) => 0,
            QueryValue::Vector(_) => 1,
            QueryValue::Matrix(_) => 2,
        }
    }
}

/// A query result together with the store artifacts it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    /// The shaped result.
    pub value: QueryValue,
    /// Every dependency key the execution touched, for cache
    /// invalidation by the caller.
    pub deps: DepSet,
}

/// Executes a query against a store.
pub fn get_query(store: &dyn Store, query: &Query) -> Result<QueryAnswer> {
    Executor::new(store, query).run()
}

/// Whether the query evaluates successfully against the store.
///
/// Missing axes, properties or entries (and any other failure) yield
/// `false`.
#[must_use]
pub fn has_query(store: &dyn Store, query: &Query) -> bool {
    get_query(store, query).is_ok()
}

/// How a phrase constrains the stack.
#[derive(Debug, Clone, Copy)]
enum StackPattern {
    /// The stack must be empty.
    Empty,
    /// Any stack.
    Any,
    /// The stack must end with this suffix (listed bottom to top).
    Top(&'static [StatePattern]),
}

/// One element check of a stack suffix pattern.
#[derive(Debug, Clone, Copy)]
enum StatePattern {
    /// Any vector state.
    Vector,
    /// A vector state still representing an axis.
    AxisLike,
    /// A matrix state.
    Matrix,
}

/// One element check of the upcoming operations.
#[derive(Debug, Clone, Copy)]
enum OpPattern {
    AxisWithName,
    AxisWithoutName,
    Names,
    LookupScalar,
    Lookup,
    LookupMatrix,
    /// `Lookup` or `LookupMatrix`.
    AnyLookup,
    /// The `=` comparison, as used for entry selection.
    IsEqual,
    BeginMask,
    CountBy,
    GroupBy,
    GroupRowsBy,
    GroupColumnsBy,
    ReduceScalar,
    ReduceRow,
    ReduceColumn,
    Eltwise,
    /// Any ordering or regex comparison.
    Comparison,
    /// Zero or one `AsAxis`.
    OptionalAsAxis,
}

fn op_matches(pattern: OpPattern, op: &QueryOperation) -> bool {
    match pattern {
        OpPattern::AxisWithName => matches!(op, QueryOperation::Axis(a) if a.name.is_some()),
        OpPattern::AxisWithoutName => matches!(op, QueryOperation::Axis(a) if a.name.is_none()),
        OpPattern::Names => matches!(op, QueryOperation::Names(_)),
        OpPattern::LookupScalar => matches!(op, QueryOperation::LookupScalar(_)),
        OpPattern::Lookup => matches!(op, QueryOperation::Lookup(_)),
        OpPattern::LookupMatrix => matches!(op, QueryOperation::LookupMatrix(_)),
        OpPattern::AnyLookup => {
            matches!(op, QueryOperation::Lookup(_) | QueryOperation::LookupMatrix(_))
        }
        OpPattern::IsEqual => {
            matches!(op, QueryOperation::Compare(c) if c.kind == CompareKind::Equal)
        }
        OpPattern::BeginMask => matches!(op, QueryOperation::BeginMask(_)),
        OpPattern::CountBy => matches!(op, QueryOperation::CountBy(_)),
        OpPattern::GroupBy => matches!(op, QueryOperation::GroupBy(_)),
        OpPattern::GroupRowsBy => matches!(op, QueryOperation::GroupRowsBy(_)),
        OpPattern::GroupColumnsBy => matches!(op, QueryOperation::GroupColumnsBy(_)),
        OpPattern::ReduceScalar => matches!(op, QueryOperation::ReduceToScalar(_)),
        OpPattern::ReduceRow => matches!(op, QueryOperation::ReduceToRow(_)),
        OpPattern::ReduceColumn => matches!(op, QueryOperation::ReduceToColumn(_)),
        OpPattern::Eltwise => matches!(op, QueryOperation::Eltwise(_)),
        OpPattern::Comparison => {
            matches!(op, QueryOperation::Compare(_) | QueryOperation::Match(_))
        }
        OpPattern::OptionalAsAxis => matches!(op, QueryOperation::AsAxis(_)),
    }
}

/// One row of the dispatch table.
struct Phrase {
    name: &'static str,
    stack: StackPattern,
    ops: &'static [OpPattern],
    run: fn(&mut Executor<'_>) -> Result<()>,
}

/// The ordered phrase table; the first matching phrase wins.
static PHRASES: &[Phrase] = &[
    Phrase {
        name: "names-of-axes",
        stack: StackPattern::Empty,
        ops: &[OpPattern::AxisWithoutName, OpPattern::Names],
        run: names::run_names_of_axes,
    },
    Phrase {
        name: "names-at-root",
        stack: StackPattern::Empty,
        ops: &[OpPattern::Names],
        run: names::run_names_at_root,
    },
    Phrase {
        name: "names-of-matrices",
        stack: StackPattern::Top(&[StatePattern::AxisLike, StatePattern::AxisLike]),
        ops: &[OpPattern::Names],
        run: names::run_names_of_matrices,
    },
    Phrase {
        name: "names-of-vectors",
        stack: StackPattern::Top(&[StatePattern::AxisLike]),
        ops: &[OpPattern::Names],
        run: names::run_names_of_vectors,
    },
    Phrase {
        name: "scalar-lookup",
        stack: StackPattern::Empty,
        ops: &[OpPattern::LookupScalar],
        run: scalar::run_scalar_lookup,
    },
    Phrase {
        name: "vector-entry-scalar",
        stack: StackPattern::Empty,
        ops: &[OpPattern::Lookup],
        run: scalar::run_vector_entry_scalar,
    },
    Phrase {
        name: "matrix-entry-scalar",
        stack: StackPattern::Empty,
        ops: &[OpPattern::LookupMatrix],
        run: scalar::run_matrix_entry_scalar,
    },
    Phrase {
        name: "entry-select",
        stack: StackPattern::Any,
        ops: &[OpPattern::AxisWithName, OpPattern::IsEqual],
        run: chain::run_entry_select,
    },
    Phrase {
        name: "axis-push",
        stack: StackPattern::Any,
        ops: &[OpPattern::AxisWithName],
        run: chain::run_axis_push,
    },
    Phrase {
        name: "mask-region",
        stack: StackPattern::Top(&[StatePattern::AxisLike]),
        ops: &[OpPattern::BeginMask],
        run: mask::run_mask_region,
    },
    Phrase {
        name: "matrix-lookup",
        stack: StackPattern::Top(&[StatePattern::AxisLike, StatePattern::AxisLike]),
        ops: &[OpPattern::LookupMatrix],
        run: matrix::run_matrix_lookup,
    },
    Phrase {
        name: "count-by",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::OptionalAsAxis, OpPattern::CountBy],
        run: count::run_count_by,
    },
    Phrase {
        name: "group-by",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::GroupBy],
        run: group::run_group_vector,
    },
    Phrase {
        name: "group-rows",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::GroupRowsBy],
        run: group::run_group_rows,
    },
    Phrase {
        name: "group-columns",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::GroupColumnsBy],
        run: group::run_group_columns,
    },
    Phrase {
        name: "lookup-chain",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::OptionalAsAxis, OpPattern::AnyLookup],
        run: chain::run_chain,
    },
    Phrase {
        name: "comparison",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::Comparison],
        run: reduce::run_comparison,
    },
    Phrase {
        name: "eltwise-vector",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::Eltwise],
        run: reduce::run_eltwise_vector,
    },
    Phrase {
        name: "eltwise-matrix",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::Eltwise],
        run: reduce::run_eltwise_matrix,
    },
    Phrase {
        name: "reduce-vector",
        stack: StackPattern::Top(&[StatePattern::Vector]),
        ops: &[OpPattern::ReduceScalar],
        run: reduce::run_reduce_vector,
    },
    Phrase {
        name: "reduce-matrix",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::ReduceScalar],
        run: reduce::run_reduce_matrix,
    },
    Phrase {
        name: "reduce-rows",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::ReduceRow],
        run: reduce::run_reduce_rows,
    },
    Phrase {
        name: "reduce-columns",
        stack: StackPattern::Top(&[StatePattern::Matrix]),
        ops: &[OpPattern::ReduceColumn],
        run: reduce::run_reduce_columns,
    },
];

/// The per-query interpreter state.
pub(crate) struct Executor<'a> {
    store: &'a dyn Store,
    query: &'a Query,
    stack: Vec<StackElement>,
    deps: DepSet,
    cursor: usize,
}

impl<'a> Executor<'a> {
    fn new(store: &'a dyn Store, query: &'a Query) -> Executor<'a> {
        Executor {
            store,
            query,
            stack: Vec::new(),
            deps: DepSet::new(),
            cursor: 0,
        }
    }

    fn run(mut self) -> Result<QueryAnswer> {
        if self.query.is_empty() {
            return Err(self.err(
                QueryErrorKind::IncompleteQuery,
                "the query has no operations".to_string(),
                Span { start: 0, end: 0 },
            ));
        }
        while self.cursor < self.query.len() {
            let phrase = PHRASES
                .iter()
                .find(|phrase| self.matches(phrase))
                .ok_or_else(|| self.invalid_phrase())?;
            debug!(phrase = phrase.name, position = self.cursor, "phrase");
            (phrase.run)(&mut self)?;
            self.assert_invariants();
        }
        self.into_answer()
    }

    fn matches(&self, phrase: &Phrase) -> bool {
        match phrase.stack {
            StackPattern::Empty => {
                if !self.stack.is_empty() {
                    return false;
                }
            }
            StackPattern::Any => {}
            StackPattern::Top(suffix) => {
                if self.stack.len() < suffix.len() {
                    return false;
                }
                let tail = &self.stack[self.stack.len() - suffix.len()..];
                for (pattern, element) in suffix.iter().zip(tail.iter()) {
                    let ok = match (pattern, element) {
                        (StatePattern::Vector, StackElement::Vector(_)) => true,
                        (StatePattern::AxisLike, StackElement::Vector(state)) => {
                            state.is_axis_like()
                        }
                        (StatePattern::Matrix, StackElement::Matrix(_)) => true,
                        _ => false,
                    };
                    if !ok {
                        return false;
                    }
                }
            }
        }
        let mut offset = 0;
        for pattern in phrase.ops {
            match pattern {
                OpPattern::OptionalAsAxis => {
                    if self
                        .peek_at(offset)
                        .is_some_and(|op| op_matches(*pattern, op))
                    {
                        offset += 1;
                    }
                }
                required => {
                    let Some(op) = self.peek_at(offset) else {
                        return false;
                    };
                    if !op_matches(*required, op) {
                        return false;
                    }
                    offset += 1;
                }
            }
        }
        true
    }

    fn invalid_phrase(&self) -> Error {
        let span = self.span_here();
        self.err(
            QueryErrorKind::InvalidPhrase,
            "no phrase matches here".to_string(),
            span,
        )
    }

    // ---- cursor helpers ----

    pub(crate) fn peek(&self) -> Option<&QueryOperation> {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&QueryOperation> {
        self.query
            .spanned_ops()
            .get(self.cursor + offset)
            .map(|spanned| &spanned.op)
    }

    /// Consumes and clones the current operation.
    ///
    /// # Panics
    ///
    /// Panics when called past the end; phrases only advance after
    /// peeking.
    pub(crate) fn advance(&mut self) -> SpannedOp {
        let spanned = self.query.spanned_ops()[self.cursor].clone();
        self.cursor += 1;
        spanned
    }

    /// The span of the current operation, or an empty span at the end of
    /// the query.
    pub(crate) fn span_here(&self) -> Span {
        self.query
            .spanned_ops()
            .get(self.cursor)
            .map_or_else(
                || {
                    let end = self.query.text().len();
                    Span { start: 0, end }
                },
                |spanned| spanned.span,
            )
    }

    // ---- stack helpers ----

    pub(crate) fn push(&mut self, element: StackElement) {
        self.stack.push(element);
    }

    /// Pops the top element, which the phrase pattern guaranteed exists.
    pub(crate) fn pop(&mut self) -> StackElement {
        self.stack.pop().expect("phrase patterns guarantee the stack suffix")
    }

    pub(crate) fn pop_vector(&mut self) -> VectorState {
        match self.pop() {
            StackElement::Vector(state) => state,
            other => unreachable!("expected a vector state, found {}", other.kind_name()),
        }
    }

    // ---- error helpers ----

    pub(crate) fn err(&self, kind: QueryErrorKind, message: String, span: Span) -> Error {
        Error::Query(QueryError::new(kind, message).with_location(
            self.query.text().to_string(),
            span.start,
            span.end,
        ))
    }

    /// Attaches the query location to an error that lacks one.
    pub(crate) fn locate(&self, err: Error, span: Span) -> Error {
        match err {
            Error::Query(query_err) => Error::Query(query_err.or_location(
                self.query.text().to_string(),
                span.start,
                span.end,
            )),
            other => other,
        }
    }

    // ---- store helpers ----

    pub(crate) fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub(crate) fn record(&mut self, key: DependencyKey) {
        self.deps.insert(key);
    }

    /// Axis entries plus the dependency on them.
    pub(crate) fn axis_entries(&mut self, axis: &str, span: Span) -> Result<Arc<Vec<String>>> {
        let entries = self
            .store
            .axis_entries(axis)
            .map_err(|err| self.locate(err, span))?;
        self.record(DependencyKey::Axis(axis.to_string()));
        Ok(entries)
    }

    /// A name-to-index map over the entries of an axis.
    pub(crate) fn axis_dict(
        &mut self,
        axis: &str,
        span: Span,
    ) -> Result<FxHashMap<String, usize>> {
        let entries = self.axis_entries(axis, span)?;
        Ok(entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.clone(), index))
            .collect())
    }

    // ---- finalization ----

    fn assert_invariants(&self) {
        for element in &self.stack {
            match element {
                StackElement::Vector(state) => state.assert_invariants(),
                StackElement::Matrix(state) => state.assert_invariants(),
                _ => {}
            }
        }
    }

    fn into_answer(mut self) -> Result<QueryAnswer> {
        if self.stack.len() != 1 {
            let end = self.query.text().len();
            return Err(self.err(
                QueryErrorKind::IncompleteQuery,
                format!(
                    "the query left {} elements on the stack instead of one result",
                    self.stack.len()
                ),
                Span { start: 0, end },
            ));
        }
        let value = match self.stack.pop().expect("length checked") {
            StackElement::Names(state) => QueryValue::Names(state.names),
            StackElement::Scalar(state) => QueryValue::Scalar(state.value),
            StackElement::Vector(mut state) => {
                state.finalize()?;
                QueryValue::Vector(NamedVector {
                    axis: state.entries_axis_name,
                    names: Arc::new(state.entries),
                    values: state.values,
                })
            }
            StackElement::Matrix(state) => QueryValue::Matrix(NamedMatrix {
                rows_axis: state.rows.entries_axis_name.clone(),
                columns_axis: state.columns.entries_axis_name.clone(),
                row_names: Arc::new(state.rows.entries),
                column_names: Arc::new(state.columns.entries),
                values: state.values,
            }),
        };
        Ok(QueryAnswer {
            value,
            deps: self.deps,
        })
    }
}

/// Validates a `Names` kind qualifier against the context it appeared in.
pub(crate) fn reject_names_kind(
    exec: &Executor<'_>,
    kind: Option<NamesKind>,
    span: Span,
    context: &str,
) -> Result<()> {
    if kind.is_some() {
        return Err(exec.err(
            QueryErrorKind::Parse,
            format!("a names kind cannot be given when listing {context}"),
            span,
        ));
    }
    Ok(())
}
