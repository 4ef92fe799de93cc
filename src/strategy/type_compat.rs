//! Type-compatibility fallback matching.
//!
//! Proposes low-confidence candidates for column pairs the name-driven
//! strategies missed: compatible semantic types plus a loosely similar
//! name. The aggregator guarantees these never displace a
//! higher-confidence candidate for the same edge.

use super::inflect::names_match;
use super::{infer_cardinality, is_self_column, Strategy};
use crate::config::PatternConfig;
use crate::model::{ColumnInfo, ColumnMode, ColumnType, DetectionMethod, Relationship, TableSchema};

/// Column names too generic to pair on name identity alone.
const GENERIC_KEY_NAMES: &[&str] = &["id", "key", "pk", "code", "uuid", "guid"];

pub struct TypeCompatStrategy;

impl TypeCompatStrategy {
    fn is_generic(name: &str) -> bool {
        GENERIC_KEY_NAMES.iter().any(|g| name.eq_ignore_ascii_case(g))
    }

    /// Nested and repeated columns are not join keys.
    fn joinable(column: &ColumnInfo) -> bool {
        column.mode != ColumnMode::Repeated
            && !matches!(column.column_type, ColumnType::Record | ColumnType::Json)
    }

    /// Loose name similarity: identical non-generic names, a shared stem
    /// after suffix normalization, or a stem that names the target table.
    fn names_similar(
        config: &PatternConfig,
        source_col: &str,
        target_col: &str,
        target_table: &str,
        target_is_key: bool,
    ) -> bool {
        let s = source_col.to_lowercase();
        let t = target_col.to_lowercase();

        if s == t && !Self::is_generic(&s) {
            return true;
        }

        let stem_s = config.strip_fk_suffix(&s).map(|(stem, _)| stem);
        let stem_t = config.strip_fk_suffix(&t).map(|(stem, _)| stem);
        if let (Some(a), Some(b)) = (&stem_s, &stem_t) {
            if a == b {
                return true;
            }
        }

        // customer_id vs clients.id style: the stem must relate to the
        // target table name and the target column must be key-shaped.
        if target_is_key {
            if let Some(stem) = &stem_s {
                if stem.len() >= 3 && names_match(stem, target_table) {
                    return true;
                }
            }
        }

        false
    }
}

impl Strategy for TypeCompatStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::TypeCompatibility
    }

    fn detect(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Vec<Relationship> {
        let mut out = Vec::new();

        for scol in &source.columns {
            if !Self::joinable(scol) {
                continue;
            }
            // Key columns of the source are reference targets, not
            // outgoing references.
            if config.is_primary_key_indicator(&scol.name, &source.name) {
                continue;
            }

            for tcol in &target.columns {
                if !Self::joinable(tcol) {
                    continue;
                }
                if is_self_column(source, &scol.name, target, &tcol.name) {
                    continue;
                }
                // A join needs at least one side declared non-nullable.
                if scol.mode.is_nullable() && tcol.mode.is_nullable() {
                    continue;
                }
                if !scol.column_type.is_compatible_with(tcol.column_type) {
                    continue;
                }

                let target_is_key = config.is_primary_key_indicator(&tcol.name, &target.name);
                if !Self::names_similar(config, &scol.name, &tcol.name, &target.name, target_is_key)
                {
                    continue;
                }

                let score = scol.column_type.compatibility_score(tcol.column_type);
                out.push(Relationship::new(
                    &source.name,
                    &scol.name,
                    &target.name,
                    &tcol.name,
                    infer_cardinality(false, target_is_key),
                    config.strategies.type_compatibility * score,
                    DetectionMethod::TypeCompatibility,
                ));
            }
        }
        out
    }
}
