//! Registered element-wise and reduction operations.
//!
//! Operations are registered by unique name in a per-[`Registry`] map (no
//! process-wide singletons); the parser looks them up and builds the
//! operation instance from keyword `name value` parameter pairs. A fresh
//! registry starts empty; [`Registry::with_builtins`] pre-populates the
//! standard set.

mod eltwise;
mod reduction;

use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use axial_common::utils::hash::FxHashMap;
use axial_common::{ArrayData, Dtype, Value};
use std::fmt;
use std::sync::Arc;

pub use eltwise::{Abs, Clamp, Convert, Fraction, Log, Round, Sqrt};
pub use reduction::{Count, Max, Mean, Median, Min, Mode, Quantile, Std, Sum, Var};

/// An element-wise operation applied to a vector or matrix.
pub trait EltwiseOperation: fmt::Debug + Send + Sync {
    /// Whether string inputs are accepted.
    fn supports_strings(&self) -> bool {
        false
    }

    /// The element type of the result given the input element type.
    fn result_dtype(&self, input: Dtype) -> Dtype;

    /// Applies the operation; the result has the same shape as the input.
    fn apply(&self, values: &ArrayData) -> Result<ArrayData>;
}

/// A reduction collapsing a vector of values into one value.
///
/// Matrix reductions (whole, per-row, per-column) are expressed by the
/// executor slicing the matrix and calling [`ReductionOperation::reduce`]
/// on each slice.
pub trait ReductionOperation: fmt::Debug + Send + Sync {
    /// Whether string inputs are accepted.
    fn supports_strings(&self) -> bool {
        false
    }

    /// The element type of the result given the input element type.
    fn result_dtype(&self, input: Dtype) -> Dtype;

    /// The identity produced for an empty input, if the reduction has one.
    ///
    /// Reductions without an identity require an explicit default
    /// (`IfMissing`) when reducing an empty input.
    fn empty_value(&self, result: Dtype) -> Option<Value> {
        let _ = result;
        None
    }

    /// Reduces a non-empty array to a single value.
    fn reduce(&self, values: &ArrayData) -> Result<Value>;
}

/// Keyword parameters of a registered operation call.
///
/// Tracks which parameters the factory consumed so that leftovers fail
/// with `UnknownParameter`.
pub struct Params<'a> {
    pairs: &'a [(String, String)],
    used: Vec<bool>,
}

impl<'a> Params<'a> {
    /// Wraps raw `name value` pairs collected by the parser.
    #[must_use]
    pub fn new(pairs: &'a [(String, String)]) -> Self {
        Self {
            used: vec![false; pairs.len()],
            pairs,
        }
    }

    /// The raw value of a parameter, marking it consumed.
    pub fn get(&mut self, name: &str) -> Option<&'a str> {
        let pairs = self.pairs;
        for (index, (key, value)) in pairs.iter().enumerate() {
            if key == name {
                self.used[index] = true;
                return Some(value.as_str());
            }
        }
        None
    }

    /// A parameter parsed as a dtype name.
    pub fn dtype(&mut self, name: &str) -> Result<Option<Dtype>> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => Dtype::parse(raw).map(Some).ok_or_else(|| {
                Error::Query(QueryError::new(
                    QueryErrorKind::Parse,
                    format!("invalid type {raw} for the parameter {name}"),
                ))
            }),
        }
    }

    /// A parameter parsed as a float.
    pub fn f64(&mut self, name: &str) -> Result<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Error::Query(QueryError::new(
                    QueryErrorKind::Parse,
                    format!("invalid number {raw} for the parameter {name}"),
                ))
            }),
        }
    }

    /// Fails with `UnknownParameter` if any parameter was not consumed.
    pub fn finish(&self) -> Result<()> {
        for (index, (key, _)) in self.pairs.iter().enumerate() {
            if !self.used[index] {
                return Err(Error::Query(QueryError::new(
                    QueryErrorKind::UnknownParameter,
                    format!("the parameter {key} is not accepted"),
                )));
            }
        }
        Ok(())
    }
}

/// Builds an eltwise operation instance from its keyword parameters.
pub type EltwiseFactory = fn(&mut Params<'_>) -> Result<Arc<dyn EltwiseOperation>>;

/// Builds a reduction operation instance from its keyword parameters.
pub type ReductionFactory = fn(&mut Params<'_>) -> Result<Arc<dyn ReductionOperation>>;

/// The per-parser map of registered operations.
#[derive(Default)]
pub struct Registry {
    eltwise: FxHashMap<String, EltwiseFactory>,
    reductions: FxHashMap<String, ReductionFactory>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in operations.
    ///
    /// Element-wise: `Abs`, `Clamp`, `Convert`, `Fraction`, `Log`,
    /// `Round`, `Sqrt`. Reductions: `Sum`, `Mean`, `Min`, `Max`,
    /// `Median`, `Quantile`, `Std`, `Var`, `Mode`, `Count`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_eltwise("Abs", eltwise::abs_factory);
        registry.register_eltwise("Clamp", eltwise::clamp_factory);
        registry.register_eltwise("Convert", eltwise::convert_factory);
        registry.register_eltwise("Fraction", eltwise::fraction_factory);
        registry.register_eltwise("Log", eltwise::log_factory);
        registry.register_eltwise("Round", eltwise::round_factory);
        registry.register_eltwise("Sqrt", eltwise::sqrt_factory);
        registry.register_reduction("Sum", reduction::sum_factory);
        registry.register_reduction("Mean", reduction::mean_factory);
        registry.register_reduction("Min", reduction::min_factory);
        registry.register_reduction("Max", reduction::max_factory);
        registry.register_reduction("Median", reduction::median_factory);
        registry.register_reduction("Quantile", reduction::quantile_factory);
        registry.register_reduction("Std", reduction::std_factory);
        registry.register_reduction("Var", reduction::var_factory);
        registry.register_reduction("Mode", reduction::mode_factory);
        registry.register_reduction("Count", reduction::count_factory);
        registry
    }

    /// Registers (or replaces) an element-wise operation.
    pub fn register_eltwise(&mut self, name: &str, factory: EltwiseFactory) {
        self.eltwise.insert(name.to_string(), factory);
    }

    /// Registers (or replaces) a reduction operation.
    pub fn register_reduction(&mut self, name: &str, factory: ReductionFactory) {
        self.reductions.insert(name.to_string(), factory);
    }

    pub(crate) fn build_eltwise(
        &self,
        name: &str,
        pairs: &[(String, String)],
    ) -> Result<Arc<dyn EltwiseOperation>> {
        let factory = self.eltwise.get(name).ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::UnknownOperation,
                format!("no element-wise operation named {name} is registered"),
            ))
        })?;
        let mut params = Params::new(pairs);
        let operation = factory(&mut params)?;
        params.finish()?;
        Ok(operation)
    }

    pub(crate) fn build_reduction(
        &self,
        name: &str,
        pairs: &[(String, String)],
    ) -> Result<Arc<dyn ReductionOperation>> {
        let factory = self.reductions.get(name).ok_or_else(|| {
            Error::Query(QueryError::new(
                QueryErrorKind::UnknownOperation,
                format!("no reduction operation named {name} is registered"),
            ))
        })?;
        let mut params = Params::new(pairs);
        let operation = factory(&mut params)?;
        params.finish()?;
        Ok(operation)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("eltwise", &self.eltwise.keys().collect::<Vec<_>>())
            .field("reductions", &self.reductions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_operation() {
        let registry = Registry::with_builtins();
        let err = registry.build_reduction("Nope", &[]).unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_unknown_parameter() {
        let registry = Registry::with_builtins();
        let pairs = vec![("bogus".to_string(), "1".to_string())];
        assert!(registry.build_reduction("Mean", &pairs).is_err());
    }

    #[test]
    fn test_builtin_construction() {
        let registry = Registry::with_builtins();
        let pairs = vec![("type".to_string(), "Int64".to_string())];
        let sum = registry.build_reduction("Sum", &pairs).unwrap();
        assert_eq!(sum.result_dtype(Dtype::I32), Dtype::I64);
    }
}
