//! The typed query operation set.
//!
//! A parsed query is a linear sequence of these operations, each carrying
//! the byte span it occupies in the canonical one-line rendering (used
//! for error markers). Registered element-wise and reduction operations
//! are bound to their implementations at parse time; the raw keyword
//! parameters are kept alongside for printing.

use crate::registry::{EltwiseOperation, ReductionOperation};
use crate::tokens::escape_value;
use axial_common::types::CompareKind;
use axial_common::Dtype;
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Keyword parameters of a registered operation call; almost all calls
/// have at most two.
pub type CallParams = SmallVec<[(String, String); 2]>;

/// A byte range in the canonical query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First byte of the operation.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

/// An operation plus its location in the canonical query text.
#[derive(Debug, Clone)]
pub struct SpannedOp {
    /// The operation.
    pub op: QueryOperation,
    /// Where it sits in the canonical rendering.
    pub span: Span,
}

/// What `?` should list when the stack is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamesKind {
    /// Scalar property names (the default).
    Scalars,
    /// Axis names.
    Axes,
}

/// Which mask combination an `&`/`|`/`^` operator requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

/// One operation of a query.
#[derive(Debug, Clone)]
pub enum QueryOperation {
    /// `@ name?` - declare an axis (or, without a name, qualify `Names`).
    Axis(AxisOp),
    /// `=@ name?` - declare the current string values as entries of an axis.
    AsAxis(AsAxisOp),
    /// `? kind?` - request a set of names.
    Names(NamesOp),
    /// `. name` - look up a scalar property.
    LookupScalar(LookupPropertyOp),
    /// `: name` - look up (or indirectly fetch) a vector property.
    Lookup(LookupPropertyOp),
    /// `:: name` - look up a matrix property.
    LookupMatrix(LookupPropertyOp),
    /// `|| value type?` - default for an absent property.
    IfMissing(IfMissingOp),
    /// `?? value?` - handling for false-ish values in a chain.
    IfNot(IfNotOp),
    /// `% Op k v ...` - element-wise operation.
    Eltwise(EltwiseCall),
    /// `>> Op k v ...` - reduce to a scalar (or per group).
    ReduceToScalar(ReductionCall),
    /// `>- Op k v ...` - reduce each row of a matrix.
    ReduceToRow(ReductionCall),
    /// `>| Op k v ...` - reduce each column of a matrix.
    ReduceToColumn(ReductionCall),
    /// `/ name` - group a vector by a key property.
    GroupBy(GroupByOp),
    /// `-/ name` - group the rows of a matrix by a key property.
    GroupRowsBy(GroupByOp),
    /// `|/ name` - group the columns of a matrix by a key property.
    GroupColumnsBy(GroupByOp),
    /// `* name` - cross-tabulate two vectors into a counts matrix.
    CountBy(CountByOp),
    /// `@| entry` - slice a column out of a square matrix.
    SquareColumnIs(SquareIsOp),
    /// `@- entry` - slice a row out of a square matrix.
    SquareRowIs(SquareIsOp),
    /// `[ name` / `[! name` - open a mask region.
    BeginMask(BeginMaskOp),
    /// `]` - close a mask region.
    EndMask,
    /// `& name`, `| name`, `^ name` (optionally `!`-negated) - combine masks.
    MaskCombine(MaskCombineOp),
    /// `< v`, `<= v`, `= v`, `!= v`, `>= v`, `> v` - ordering comparison.
    Compare(CompareOp),
    /// `~ pattern` / `!~ pattern` - regex comparison.
    Match(MatchOp),
}

/// Payload of `Axis`.
#[derive(Debug, Clone)]
pub struct AxisOp {
    /// The axis name; absent for the `@ ?` form.
    pub name: Option<String>,
}

/// Payload of `AsAxis`.
#[derive(Debug, Clone)]
pub struct AsAxisOp {
    /// The declared axis; absent to infer it from the property name.
    pub name: Option<String>,
}

/// Payload of `Names`.
#[derive(Debug, Clone)]
pub struct NamesOp {
    /// The optional kind qualifier.
    pub kind: Option<NamesKind>,
}

/// Payload of the three property lookups.
#[derive(Debug, Clone)]
pub struct LookupPropertyOp {
    /// The property name.
    pub name: String,
}

/// Payload of `IfMissing`.
#[derive(Debug, Clone)]
pub struct IfMissingOp {
    /// The raw default value.
    pub value: String,
    /// The element type of the default, when spelled out.
    pub dtype: Option<Dtype>,
}

/// Payload of `IfNot`.
#[derive(Debug, Clone)]
pub struct IfNotOp {
    /// The replacement for false-ish values; absent to drop the entries.
    pub value: Option<String>,
}

/// A registered element-wise operation call.
#[derive(Debug, Clone)]
pub struct EltwiseCall {
    /// The registered name.
    pub name: String,
    /// Raw keyword parameters, in written order.
    pub params: CallParams,
    /// The bound implementation.
    pub op: Arc<dyn EltwiseOperation>,
}

/// A registered reduction operation call.
#[derive(Debug, Clone)]
pub struct ReductionCall {
    /// The registered name.
    pub name: String,
    /// Raw keyword parameters, in written order.
    pub params: CallParams,
    /// The bound implementation.
    pub op: Arc<dyn ReductionOperation>,
}

/// Payload of the grouping operations.
#[derive(Debug, Clone)]
pub struct GroupByOp {
    /// The group key property name.
    pub name: String,
}

/// Payload of `CountBy`.
#[derive(Debug, Clone)]
pub struct CountByOp {
    /// The partner property name.
    pub name: String,
}

/// Payload of the square-matrix slices.
#[derive(Debug, Clone)]
pub struct SquareIsOp {
    /// The entry naming the sliced row or column.
    pub entry: String,
}

/// Payload of `BeginMask`.
#[derive(Debug, Clone)]
pub struct BeginMaskOp {
    /// Whether the accumulated mask is negated at the closing `]`.
    pub negated: bool,
    /// The first mask property.
    pub name: String,
}

/// Payload of `MaskCombine`.
#[derive(Debug, Clone)]
pub struct MaskCombineOp {
    /// Which bitwise combination to apply.
    pub kind: MaskKind,
    /// Whether the right-hand mask is negated first.
    pub negated: bool,
    /// The right-hand mask property.
    pub name: String,
}

/// Payload of the ordering comparisons.
#[derive(Debug, Clone)]
pub struct CompareOp {
    /// Which comparison.
    pub kind: CompareKind,
    /// The raw right-hand operand.
    pub operand: String,
}

/// Payload of the regex comparisons.
#[derive(Debug, Clone)]
pub struct MatchOp {
    /// Whether the match is negated (`!~`).
    pub negated: bool,
    /// The raw pattern, kept for printing.
    pub pattern: String,
    /// The pattern, compiled once at parse time.
    pub regex: Regex,
}

impl QueryOperation {
    fn write_registered(
        f: &mut fmt::Formatter<'_>,
        operator: &str,
        name: &str,
        params: &[(String, String)],
    ) -> fmt::Result {
        write!(f, "{operator} {}", escape_value(name))?;
        for (key, value) in params {
            write!(f, " {} {}", escape_value(key), escape_value(value))?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperation::Axis(op) => match &op.name {
                Some(name) => write!(f, "@ {}", escape_value(name)),
                None => f.write_str("@"),
            },
            QueryOperation::AsAxis(op) => match &op.name {
                Some(name) => write!(f, "=@ {}", escape_value(name)),
                None => f.write_str("=@"),
            },
            QueryOperation::Names(op) => match op.kind {
                Some(NamesKind::Scalars) => f.write_str("? scalars"),
                Some(NamesKind::Axes) => f.write_str("? axes"),
                None => f.write_str("?"),
            },
            QueryOperation::LookupScalar(op) => write!(f, ". {}", escape_value(&op.name)),
            QueryOperation::Lookup(op) => write!(f, ": {}", escape_value(&op.name)),
            QueryOperation::LookupMatrix(op) => write!(f, ":: {}", escape_value(&op.name)),
            QueryOperation::IfMissing(op) => {
                write!(f, "|| {}", escape_value(&op.value))?;
                if let Some(dtype) = op.dtype {
                    write!(f, " {dtype}")?;
                }
                Ok(())
            }
            QueryOperation::IfNot(op) => match &op.value {
                Some(value) => write!(f, "?? {}", escape_value(value)),
                None => f.write_str("??"),
            },
            QueryOperation::Eltwise(call) => {
                Self::write_registered(f, "%", &call.name, &call.params)
            }
            QueryOperation::ReduceToScalar(call) => {
                Self::write_registered(f, ">>", &call.name, &call.params)
            }
            QueryOperation::ReduceToRow(call) => {
                Self::write_registered(f, ">-", &call.name, &call.params)
            }
            QueryOperation::ReduceToColumn(call) => {
                Self::write_registered(f, ">|", &call.name, &call.params)
            }
            QueryOperation::GroupBy(op) => write!(f, "/ {}", escape_value(&op.name)),
            QueryOperation::GroupRowsBy(op) => write!(f, "-/ {}", escape_value(&op.name)),
            QueryOperation::GroupColumnsBy(op) => write!(f, "|/ {}", escape_value(&op.name)),
            QueryOperation::CountBy(op) => write!(f, "* {}", escape_value(&op.name)),
            QueryOperation::SquareColumnIs(op) => write!(f, "@| {}", escape_value(&op.entry)),
            QueryOperation::SquareRowIs(op) => write!(f, "@- {}", escape_value(&op.entry)),
            QueryOperation::BeginMask(op) => {
                let operator = if op.negated { "[!" } else { "[" };
                write!(f, "{operator} {}", escape_value(&op.name))
            }
            QueryOperation::EndMask => f.write_str("]"),
            QueryOperation::MaskCombine(op) => {
                let base = match op.kind {
                    MaskKind::And => "&",
                    MaskKind::Or => "|",
                    MaskKind::Xor => "^",
                };
                let operator = if op.negated {
                    format!("{base}!")
                } else {
                    base.to_string()
                };
                write!(f, "{operator} {}", escape_value(&op.name))
            }
            QueryOperation::Compare(op) => {
                let operator = match op.kind {
                    CompareKind::Less => "<",
                    CompareKind::LessEqual => "<=",
                    CompareKind::Equal => "=",
                    CompareKind::NotEqual => "!=",
                    CompareKind::Greater => ">",
                    CompareKind::GreaterEqual => ">=",
                };
                write!(f, "{operator} {}", escape_value(&op.operand))
            }
            QueryOperation::Match(op) => {
                let operator = if op.negated { "!~" } else { "~" };
                write!(f, "{operator} {}", escape_value(&op.pattern))
            }
        }
    }
}

/// A parsed query: an ordered operation sequence plus its canonical text.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    ops: Vec<SpannedOp>,
}

impl Query {
    /// Builds a query from operations, rendering the canonical text and
    /// assigning each operation its span within it.
    #[must_use]
    pub fn from_ops(ops: Vec<QueryOperation>) -> Query {
        let mut text = String::new();
        let mut spanned = Vec::with_capacity(ops.len());
        for op in ops {
            if !text.is_empty() {
                text.push(' ');
            }
            let start = text.len();
            text.push_str(&op.to_string());
            spanned.push(SpannedOp {
                op,
                span: Span {
                    start,
                    end: text.len(),
                },
            });
        }
        Query { text, ops: spanned }
    }

    /// The canonical one-line rendering.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The operations with their spans.
    #[must_use]
    pub fn spanned_ops(&self) -> &[SpannedOp] {
        &self.ops
    }

    /// The operations in order.
    pub fn operations(&self) -> impl Iterator<Item = &QueryOperation> {
        self.ops.iter().map(|spanned| &spanned.op)
    }

    /// The number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the query has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Concatenates two queries into one, re-rendering the canonical text.
    ///
    /// Parsing the concatenation of two query texts yields the same
    /// operations as concatenating their parses.
    #[must_use]
    pub fn concat(&self, other: &Query) -> Query {
        let ops = self
            .operations()
            .chain(other.operations())
            .cloned()
            .collect();
        Query::from_ops(ops)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_printing() {
        let query = Query::from_ops(vec![
            QueryOperation::Axis(AxisOp {
                name: Some("cell".into()),
            }),
            QueryOperation::Lookup(LookupPropertyOp { name: "age".into() }),
            QueryOperation::IfNot(IfNotOp {
                value: Some("black bird".into()),
            }),
        ]);
        assert_eq!(query.to_string(), r"@ cell : age ?? black\ bird");
    }

    #[test]
    fn test_spans_cover_whole_operations() {
        let query = Query::from_ops(vec![
            QueryOperation::Axis(AxisOp {
                name: Some("cell".into()),
            }),
            QueryOperation::Lookup(LookupPropertyOp { name: "age".into() }),
        ]);
        let spans = query.spanned_ops();
        assert_eq!(&query.text()[spans[0].span.start..spans[0].span.end], "@ cell");
        assert_eq!(&query.text()[spans[1].span.start..spans[1].span.end], ": age");
    }

    #[test]
    fn test_concat_rerenders() {
        let left = Query::from_ops(vec![QueryOperation::Axis(AxisOp {
            name: Some("cell".into()),
        })]);
        let right = Query::from_ops(vec![QueryOperation::Lookup(LookupPropertyOp {
            name: "age".into(),
        })]);
        assert_eq!(left.concat(&right).to_string(), "@ cell : age");
    }
}
