//! Error types shared across the Axial crates.
//!
//! All user-facing failures are `QueryError`s: a kind, a message, and
//! optionally the canonical query text plus the byte span of the offending
//! operation. `Display` renders the two-line form with a `▲` marker under
//! the failing range. Violations of internal stack invariants are
//! programmer errors and are checked with `debug_assert!`, not represented
//! here.

use std::fmt;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A query failed to tokenize, parse, or execute.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A store write was rejected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An internal invariant was violated. Seeing this is a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the query error kind, if this is a query error.
    #[must_use]
    pub fn query_kind(&self) -> Option<QueryErrorKind> {
        match self {
            Error::Query(err) => Some(err.kind()),
            Error::Store(_) | Error::Internal(_) => None,
        }
    }
}

/// Rejected store writes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// An axis with this name already exists.
    #[error("the axis {0} already exists")]
    AxisExists(String),

    /// The entries given for a new axis are not unique.
    #[error("the entries of the axis {0} are not unique")]
    DuplicateEntries(String),

    /// A write referenced an axis that does not exist.
    #[error("the store has no axis named {0}")]
    NoSuchAxis(String),

    /// A written array does not match the length or shape of its axes.
    #[error("{0}")]
    ShapeMismatch(String),
}

/// Classification of query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// A bad token in the query text.
    Syntax,
    /// Malformed operation arguments or a bad regex.
    Parse,
    /// A registered element-wise or reduction operation name is unknown.
    UnknownOperation,
    /// A keyword parameter is not accepted by the registered operation.
    UnknownParameter,
    /// A keyword parameter was given twice.
    RepeatedParameter,
    /// An operator that requires a value was not followed by one.
    ExpectedValue,
    /// A value appeared where an operator was required.
    ExpectedOperator,
    /// A named axis does not exist in the store.
    UnknownAxis,
    /// A named property does not exist (at the given axis, if any).
    UnknownProperty,
    /// An entry name does not exist in an axis.
    UnknownEntry,
    /// A lookup or reduction needed a default but none was provided.
    MissingDefault,
    /// Two arrays that must agree in shape do not.
    ShapeMismatch,
    /// An operation does not support the element type it was given.
    UnsupportedType,
    /// A group over an axis has no members and no default was provided.
    EmptyGroup,
    /// No phrase matches the current stack and remaining operations.
    InvalidPhrase,
    /// The operations ended while the stack was not a single result.
    IncompleteQuery,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryErrorKind::Syntax => "syntax error",
            QueryErrorKind::Parse => "parse error",
            QueryErrorKind::UnknownOperation => "unknown operation",
            QueryErrorKind::UnknownParameter => "unknown parameter",
            QueryErrorKind::RepeatedParameter => "repeated parameter",
            QueryErrorKind::ExpectedValue => "expected a value",
            QueryErrorKind::ExpectedOperator => "expected an operator",
            QueryErrorKind::UnknownAxis => "unknown axis",
            QueryErrorKind::UnknownProperty => "unknown property",
            QueryErrorKind::UnknownEntry => "unknown entry",
            QueryErrorKind::MissingDefault => "missing default",
            QueryErrorKind::ShapeMismatch => "shape mismatch",
            QueryErrorKind::UnsupportedType => "unsupported type",
            QueryErrorKind::EmptyGroup => "empty group",
            QueryErrorKind::InvalidPhrase => "invalid phrase",
            QueryErrorKind::IncompleteQuery => "incomplete query",
        };
        f.write_str(name)
    }
}

/// A query failure with an optional location in the canonical query text.
#[derive(Debug, Clone)]
pub struct QueryError {
    kind: QueryErrorKind,
    message: String,
    location: Option<QueryLocation>,
}

/// A byte range inside a rendered one-line query.
#[derive(Debug, Clone)]
pub struct QueryLocation {
    /// The canonical one-line query text.
    pub query: String,
    /// Byte offset of the first offending byte.
    pub start: usize,
    /// Byte offset one past the last offending byte.
    pub end: usize,
}

impl QueryError {
    /// Creates a new query error without a location.
    #[must_use]
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Attaches the canonical query text and the offending byte span.
    #[must_use]
    pub fn with_location(mut self, query: impl Into<String>, start: usize, end: usize) -> Self {
        self.location = Some(QueryLocation {
            query: query.into(),
            start,
            end,
        });
        self
    }

    /// Attaches a location only if none is present yet.
    ///
    /// Lets outer layers supply the whole-query context without clobbering
    /// a more precise span recorded deeper down.
    #[must_use]
    pub fn or_location(self, query: impl Into<String>, start: usize, end: usize) -> Self {
        if self.location.is_some() {
            self
        } else {
            self.with_location(query, start, end)
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }

    /// Returns the message without the rendered location.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the location, if one was attached.
    #[must_use]
    pub fn location(&self) -> Option<&QueryLocation> {
        self.location.as_ref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            let prefix_columns = location.query[..location.start.min(location.query.len())]
                .chars()
                .count();
            let marked_columns = location.query
                [location.start.min(location.query.len())..location.end.min(location.query.len())]
                .chars()
                .count()
                .max(1);
            write!(f, "\nin: {}", location.query)?;
            write!(
                f,
                "\n    {}{}",
                " ".repeat(prefix_columns),
                "▲".repeat(marked_columns)
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_without_location() {
        let err = QueryError::new(QueryErrorKind::UnknownAxis, "no axis named cell");
        assert_eq!(err.to_string(), "unknown axis: no axis named cell");
    }

    #[test]
    fn test_error_with_location_renders_marker() {
        let err = QueryError::new(QueryErrorKind::UnknownProperty, "no vector named agee")
            .with_location("@ cell : agee", 9, 13);
        let rendered = err.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "in: @ cell : agee");
        assert_eq!(lines[2], format!("    {}{}", " ".repeat(9), "▲".repeat(4)));
    }

    #[test]
    fn test_or_location_keeps_existing() {
        let err = QueryError::new(QueryErrorKind::Parse, "bad")
            .with_location("@ x", 0, 1)
            .or_location("@ y", 2, 3);
        assert_eq!(err.location().unwrap().query, "@ x");
    }

    #[test]
    fn test_marker_spans_at_least_one_column() {
        let err =
            QueryError::new(QueryErrorKind::IncompleteQuery, "empty").with_location("@ a", 3, 3);
        assert!(err.to_string().contains('▲'));
    }
}
