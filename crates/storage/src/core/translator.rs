//! Selection predicate translation contract.

use crate::types::{FieldRequirement, Operator, SelectionPredicate};

/// Converts a [`SelectionPredicate`] into a backend-native filter.
///
/// All implementations share one policy: equality uses a mirrored column or
/// attribute when there is one and falls back to the raw object otherwise;
/// `NotEquals` is the negation of the same test; `Exists`/`NotExists` test
/// path presence; `In`/`NotIn` are logged and skipped; requirements are
/// AND-ed together. Paging is not part of the output.
pub trait PredicateTranslator {
    /// The native filter type.
    type Output;

    /// Translates the label and field requirements of `predicate`.
    fn translate(&self, predicate: &SelectionPredicate) -> Self::Output;
}

/// Returns the requirements a translator should emit, logging and dropping
/// the set-based ones no backend supports.
pub fn supported_requirements(
    backend: &'static str,
    predicate: &SelectionPredicate,
) -> Vec<FieldRequirement> {
    predicate
        .requirements()
        .into_iter()
        .filter(|req| {
            let supported = !matches!(req.operator, Operator::In | Operator::NotIn);
            if !supported {
                tracing::warn!(
                    backend,
                    field = %req.path,
                    operator = %req.operator,
                    "selector operator not supported, skipping requirement"
                );
            }
            supported
        })
        .collect()
}
