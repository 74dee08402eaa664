//! The parser: token stream to operation sequence.
//!
//! The parser walks the token stream once. Every operator consumes a
//! fixed number of value tokens (zero, one, or value-plus-optional-type
//! for `IfMissing`); registered operations additionally consume keyword
//! `name value` pairs until the next operator or the end of the query,
//! and are bound against the [`Registry`] while parsing.

use crate::ops::{
    AsAxisOp, AxisOp, BeginMaskOp, CallParams, CompareOp, CountByOp, EltwiseCall, GroupByOp,
    IfMissingOp, IfNotOp, LookupPropertyOp, MaskCombineOp, MaskKind, MatchOp, NamesKind, NamesOp,
    Query, QueryOperation, ReductionCall, SquareIsOp,
};
use crate::registry::Registry;
use crate::tokens::{canonical_text, tokenize, Token};
use axial_common::types::CompareKind;
use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::Dtype;
use regex::Regex;

/// What a single bare value parses into, for the shorthand forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A single value is an axis name.
    Axis,
    /// A single value is a vector property name.
    Lookup,
}

/// Parses a query with the built-in operation registry.
pub fn parse(text: &str) -> Result<Query> {
    Registry::with_builtins().parse(text)
}

impl Registry {
    /// Parses a query against this registry.
    pub fn parse(&self, text: &str) -> Result<Query> {
        Parser::new(self, text)?.parse_query()
    }

    /// Parses a query, treating a single bare value as the given operand.
    pub fn parse_operand_only(&self, text: &str, kind: OperandKind) -> Result<Query> {
        let parser = Parser::new(self, text)?;
        if let [token] = parser.tokens.as_slice() {
            if !token.is_operator {
                let op = match kind {
                    OperandKind::Axis => QueryOperation::Axis(AxisOp {
                        name: Some(token.value.clone()),
                    }),
                    OperandKind::Lookup => QueryOperation::Lookup(LookupPropertyOp {
                        name: token.value.clone(),
                    }),
                };
                return Ok(Query::from_ops(vec![op]));
            }
        }
        parser.parse_query()
    }
}

/// A single-use parser over one tokenized query.
pub struct Parser<'a> {
    registry: &'a Registry,
    tokens: Vec<Token>,
    canonical: String,
    position: usize,
}

impl<'a> Parser<'a> {
    /// Tokenizes the text and prepares a parser over it.
    pub fn new(registry: &'a Registry, text: &str) -> Result<Parser<'a>> {
        let tokens = tokenize(text)?;
        let canonical = canonical_text(&tokens);
        Ok(Parser {
            registry,
            tokens,
            canonical,
            position: 0,
        })
    }

    /// Parses all tokens into a query.
    pub fn parse_query(mut self) -> Result<Query> {
        let mut ops = Vec::new();
        while self.position < self.tokens.len() {
            ops.push(self.parse_operation()?);
        }
        Ok(Query::from_ops(ops))
    }

    fn parse_operation(&mut self) -> Result<QueryOperation> {
        let token = self.tokens[self.position].clone();
        if !token.is_operator {
            return Err(self.error_at(
                QueryErrorKind::ExpectedOperator,
                format!("expected an operator, found the value {}", token.value),
                &token,
            ));
        }
        self.position += 1;
        let op = match token.value.as_str() {
            "@" => QueryOperation::Axis(AxisOp {
                name: self.optional_value(),
            }),
            "=@" => QueryOperation::AsAxis(AsAxisOp {
                name: self.optional_value(),
            }),
            "?" => {
                let kind = match self.optional_value() {
                    None => None,
                    Some(raw) if raw == "scalars" => Some(NamesKind::Scalars),
                    Some(raw) if raw == "axes" => Some(NamesKind::Axes),
                    Some(raw) => {
                        return Err(self.error_at(
                            QueryErrorKind::Parse,
                            format!("the names kind {raw} is not scalars or axes"),
                            &token,
                        ));
                    }
                };
                QueryOperation::Names(NamesOp { kind })
            }
            "." => QueryOperation::LookupScalar(LookupPropertyOp {
                name: self.required_value(&token)?,
            }),
            ":" => QueryOperation::Lookup(LookupPropertyOp {
                name: self.required_value(&token)?,
            }),
            "::" => QueryOperation::LookupMatrix(LookupPropertyOp {
                name: self.required_value(&token)?,
            }),
            "||" => {
                let value = self.required_value(&token)?;
                let dtype = match self.optional_value() {
                    None => None,
                    Some(raw) => Some(Dtype::parse(&raw).ok_or_else(|| {
                        self.error_at(
                            QueryErrorKind::Parse,
                            format!("the default type {raw} is not a known element type"),
                            &token,
                        )
                    })?),
                };
                QueryOperation::IfMissing(IfMissingOp { value, dtype })
            }
            "??" => QueryOperation::IfNot(IfNotOp {
                value: self.optional_value(),
            }),
            "%" => {
                let (name, params) = self.registered_call(&token)?;
                let op = self
                    .registry
                    .build_eltwise(&name, &params)
                    .map_err(|err| self.locate(err, &token))?;
                QueryOperation::Eltwise(EltwiseCall { name, params, op })
            }
            ">>" | ">-" | ">|" => {
                let (name, params) = self.registered_call(&token)?;
                let op = self
                    .registry
                    .build_reduction(&name, &params)
                    .map_err(|err| self.locate(err, &token))?;
                let call = ReductionCall { name, params, op };
                match token.value.as_str() {
                    ">>" => QueryOperation::ReduceToScalar(call),
                    ">-" => QueryOperation::ReduceToRow(call),
                    _ => QueryOperation::ReduceToColumn(call),
                }
            }
            "/" => QueryOperation::GroupBy(GroupByOp {
                name: self.required_value(&token)?,
            }),
            "-/" => QueryOperation::GroupRowsBy(GroupByOp {
                name: self.required_value(&token)?,
            }),
            "|/" => QueryOperation::GroupColumnsBy(GroupByOp {
                name: self.required_value(&token)?,
            }),
            "*" => QueryOperation::CountBy(CountByOp {
                name: self.required_value(&token)?,
            }),
            "@|" => QueryOperation::SquareColumnIs(SquareIsOp {
                entry: self.required_value(&token)?,
            }),
            "@-" => QueryOperation::SquareRowIs(SquareIsOp {
                entry: self.required_value(&token)?,
            }),
            "[" | "[!" => QueryOperation::BeginMask(BeginMaskOp {
                negated: token.value == "[!",
                name: self.required_value(&token)?,
            }),
            "]" => QueryOperation::EndMask,
            "&" | "&!" | "|" | "|!" | "^" | "^!" => {
                let kind = match token.value.chars().next() {
                    Some('&') => MaskKind::And,
                    Some('|') => MaskKind::Or,
                    _ => MaskKind::Xor,
                };
                QueryOperation::MaskCombine(MaskCombineOp {
                    kind,
                    negated: token.value.ends_with('!'),
                    name: self.required_value(&token)?,
                })
            }
            "<" | "<=" | "=" | "!=" | ">=" | ">" => {
                let kind = match token.value.as_str() {
                    "<" => CompareKind::Less,
                    "<=" => CompareKind::LessEqual,
                    "=" => CompareKind::Equal,
                    "!=" => CompareKind::NotEqual,
                    ">=" => CompareKind::GreaterEqual,
                    _ => CompareKind::Greater,
                };
                QueryOperation::Compare(CompareOp {
                    kind,
                    operand: self.required_value(&token)?,
                })
            }
            "~" | "!~" => {
                let pattern = self.required_value(&token)?;
                let regex = Regex::new(&pattern).map_err(|err| {
                    self.error_at(
                        QueryErrorKind::Parse,
                        format!("invalid regex {pattern}: {err}"),
                        &token,
                    )
                })?;
                QueryOperation::Match(MatchOp {
                    negated: token.value == "!~",
                    pattern,
                    regex,
                })
            }
            other => {
                return Err(self.error_at(
                    QueryErrorKind::Parse,
                    format!("the operator {other} cannot start an operation"),
                    &token,
                ));
            }
        };
        Ok(op)
    }

    /// Collects the operation name and `name value` parameter pairs of a
    /// registered operation call.
    fn registered_call(&mut self, operator: &Token) -> Result<(String, CallParams)> {
        let name = self.required_value(operator)?;
        let mut params = CallParams::new();
        while let Some(key) = self.optional_value() {
            if params.iter().any(|(existing, _)| *existing == key) {
                return Err(self.error_at(
                    QueryErrorKind::RepeatedParameter,
                    format!("the parameter {key} was given twice"),
                    operator,
                ));
            }
            let value = self.required_value(operator)?;
            params.push((key, value));
        }
        Ok((name, params))
    }

    /// Consumes the next token if it is a value.
    fn optional_value(&mut self) -> Option<String> {
        match self.tokens.get(self.position) {
            Some(token) if !token.is_operator => {
                self.position += 1;
                Some(token.value.clone())
            }
            _ => None,
        }
    }

    /// Consumes the next token, which must be a value.
    fn required_value(&mut self, operator: &Token) -> Result<String> {
        self.optional_value().ok_or_else(|| {
            self.error_at(
                QueryErrorKind::ExpectedValue,
                format!("the operator {} requires a value", operator.value),
                operator,
            )
        })
    }

    fn error_at(&self, kind: QueryErrorKind, message: String, token: &Token) -> Error {
        Error::Query(QueryError::new(kind, message).with_location(
            self.canonical.clone(),
            token.start,
            token.end,
        ))
    }

    fn locate(&self, err: Error, token: &Token) -> Error {
        match err {
            Error::Query(query_err) => Error::Query(query_err.or_location(
                self.canonical.clone(),
                token.start,
                token.end,
            )),
            other => other,
        }
    }
}
