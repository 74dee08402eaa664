//! Mask regions: bracketed sub-queries subsetting an axis.
//!
//! Each mask term fetches one property over the base axis (with optional
//! default, matrix slice and comparison) and yields a boolean mask; terms
//! combine strictly left to right with `&`, `|`, `^` and their negated
//! forms. The closing `]` keeps the entries where the accumulated mask is
//! true, or false for the `[!` variant.

use super::chain::{fetch_property_into, parse_step_mods};
use super::reduce::comparison_mask;
use super::Executor;
use crate::ops::{MaskKind, QueryOperation, Span};
use crate::state::{StackElement, VectorState};
use axial_common::utils::error::{QueryErrorKind, Result};

pub(super) fn run_mask_region(exec: &mut Executor<'_>) -> Result<()> {
    let mut base = exec.pop_vector();
    let begin_spanned = exec.advance();
    let QueryOperation::BeginMask(begin) = begin_spanned.op else {
        unreachable!("the phrase pattern guarantees a mask begin");
    };
    let mut mask = eval_mask_term(exec, &base, &begin.name, begin_spanned.span)?;
    loop {
        match exec.peek() {
            Some(QueryOperation::MaskCombine(_)) => {
                let spanned = exec.advance();
                let QueryOperation::MaskCombine(combine) = spanned.op else {
                    unreachable!("peeked");
                };
                let mut rhs = eval_mask_term(exec, &base, &combine.name, spanned.span)?;
                if combine.negated {
                    for bit in &mut rhs {
                        *bit = !*bit;
                    }
                }
                for (left, right) in mask.iter_mut().zip(rhs.iter()) {
                    *left = match combine.kind {
                        MaskKind::And => *left && *right,
                        MaskKind::Or => *left || *right,
                        MaskKind::Xor => *left != *right,
                    };
                }
            }
            Some(QueryOperation::EndMask) => {
                exec.advance();
                break;
            }
            Some(_) => {
                let span = exec.span_here();
                return Err(exec.err(
                    QueryErrorKind::InvalidPhrase,
                    "only mask combinations may appear before the closing ]".to_string(),
                    span,
                ));
            }
            None => {
                return Err(exec.err(
                    QueryErrorKind::IncompleteQuery,
                    "the mask region is not closed".to_string(),
                    begin_spanned.span,
                ));
            }
        }
    }
    if begin.negated {
        for bit in &mut mask {
            *bit = !*bit;
        }
    }
    base.retain(&mask);
    exec.push(StackElement::Vector(base));
    Ok(())
}

/// Fetches one mask term over the base axis and boils it down to booleans
/// (through a comparison when one follows, by truthiness otherwise).
fn eval_mask_term(
    exec: &mut Executor<'_>,
    base: &VectorState,
    property: &str,
    span: Span,
) -> Result<Vec<bool>> {
    let mods = parse_step_mods(exec, true, false);
    let mut term = base.clone();
    let mut carried = None;
    fetch_property_into(exec, &mut term, property, &mods, None, &mut carried, span)?;
    debug_assert_eq!(term.len(), base.len());
    let mask = match exec.peek() {
        Some(QueryOperation::Compare(_) | QueryOperation::Match(_)) => {
            let spanned = exec.advance();
            comparison_mask(exec, &term.values, &spanned.op, spanned.span)?
        }
        _ => term.values.truthy(),
    };
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::state::StackElement;
    use axial_common::ArrayData;
    use axial_store::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_axis("gene", ["g1", "g2", "g3"])
            .unwrap();
        store
            .set_vector(
                "gene",
                "marker",
                ArrayData::Bool(vec![true, false, true]),
            )
            .unwrap();
        store
            .set_vector("gene", "weight", ArrayData::I32(vec![5, 10, 15]))
            .unwrap();
        store
    }

    fn masked_entries(store: &MemoryStore, text: &str) -> Vec<String> {
        let query = parse(text).unwrap();
        let mut exec = Executor::new(store, &query);
        exec.push(StackElement::Vector(VectorState::axis(
            "gene",
            vec!["g1".into(), "g2".into(), "g3".into()],
        )));
        run_mask_region(&mut exec).unwrap();
        match exec.pop() {
            StackElement::Vector(state) => state.entries,
            other => panic!("expected a vector state, found {}", other.kind_name()),
        }
    }

    #[test]
    fn test_truthy_term() {
        let store = store();
        assert_eq!(masked_entries(&store, "[ marker ]"), vec!["g1", "g3"]);
    }

    #[test]
    fn test_negated_region() {
        let store = store();
        assert_eq!(masked_entries(&store, "[! marker ]"), vec!["g2"]);
    }

    #[test]
    fn test_comparison_term_and_combination() {
        let store = store();
        assert_eq!(
            masked_entries(&store, "[ marker & weight > 7 ]"),
            vec!["g3"]
        );
        assert_eq!(
            masked_entries(&store, "[ marker |! weight > 7 ]"),
            vec!["g1", "g3"]
        );
    }

    #[test]
    fn test_default_term() {
        let store = store();
        assert_eq!(
            masked_entries(&store, "[ marker | absent || true ]"),
            vec!["g1", "g2", "g3"]
        );
    }

    #[test]
    fn test_unclosed_region() {
        let store = store();
        let query = parse("[ marker").unwrap();
        let mut exec = Executor::new(&store, &query);
        exec.push(StackElement::Vector(VectorState::axis(
            "gene",
            vec!["g1".into(), "g2".into(), "g3".into()],
        )));
        let err = run_mask_region(&mut exec).unwrap_err();
        assert_eq!(
            err.query_kind(),
            Some(axial_common::QueryErrorKind::IncompleteQuery)
        );
    }
}
