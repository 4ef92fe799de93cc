//! Detection strategies.
//!
//! Each strategy is a pure, stateless function over one ordered
//! (source, target) table pair plus the pattern configuration, returning
//! zero or more candidate relationships. Strategies never mutate shared
//! state and may run in any order or in parallel; conflict resolution
//! between candidates happens in the aggregator, never here.

mod convention;
mod custom;
mod exact;
pub mod inflect;
mod type_compat;

pub use convention::ConventionStrategy;
pub use custom::CustomStrategy;
pub use exact::ExactNameStrategy;
pub use type_compat::TypeCompatStrategy;

use crate::config::{CustomRules, PatternConfig};
use crate::model::{Cardinality, DetectionMethod, Relationship, TableSchema};

/// A relationship detection strategy.
pub trait Strategy: Send + Sync {
    /// The method tag candidates from this strategy carry.
    fn method(&self) -> DetectionMethod;

    /// Detect candidate relationships from `source` columns into `target`.
    ///
    /// The coordinator invokes this for both orientations of an unordered
    /// table pair (once for self-pairs), so implementations only look in
    /// the source→target direction.
    fn detect(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Vec<Relationship>;
}

/// The strategy set in priority order. Custom rules, when present, come
/// first; the aggregator's tie-breaks rely on method priority rather than
/// registry position, so order here only affects candidate ordering.
pub fn registry(custom: Option<CustomRules>) -> Vec<Box<dyn Strategy>> {
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    if let Some(rules) = custom {
        if !rules.is_empty() {
            strategies.push(Box::new(CustomStrategy::new(rules)));
        }
    }
    strategies.push(Box::new(ExactNameStrategy));
    strategies.push(Box::new(ConventionStrategy));
    strategies.push(Box::new(TypeCompatStrategy));
    strategies
}

/// Cardinality heuristic shared by the automatic strategies: a reference
/// into a key column is many-to-one unless the source column is itself
/// key-shaped.
pub(crate) fn infer_cardinality(source_is_key: bool, target_is_key: bool) -> Cardinality {
    match (source_is_key, target_is_key) {
        (true, true) => Cardinality::OneToOne,
        (true, false) => Cardinality::OneToMany,
        _ => Cardinality::ManyToOne,
    }
}

/// Guard against the degenerate self-edge where a column would
/// reference itself.
pub(crate) fn is_self_column(
    source: &TableSchema,
    source_column: &str,
    target: &TableSchema,
    target_column: &str,
) -> bool {
    source.name.eq_ignore_ascii_case(&target.name)
        && source_column.eq_ignore_ascii_case(target_column)
}
