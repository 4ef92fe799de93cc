//! Exact-name matching: `customer_id` -> `customers.id`.

use super::inflect::{names_match, pluralize};
use super::{infer_cardinality, is_self_column, Strategy};
use crate::config::PatternConfig;
use crate::model::{ColumnMode, DetectionMethod, Relationship, TableSchema};

/// Matches foreign-key-suffixed columns whose stem names the target table
/// (singular or plural) when the target has a primary-key-shaped column.
/// Highest-confidence automatic strategy.
pub struct ExactNameStrategy;

impl Strategy for ExactNameStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::ExactName
    }

    fn detect(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Vec<Relationship> {
        let Some(target_pk) = config.primary_key_column(target) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for column in &source.columns {
            if column.mode == ColumnMode::Repeated {
                continue;
            }
            let Some((stem, _suffix)) = config.strip_fk_suffix(&column.name) else {
                continue;
            };
            if !names_match(&stem, &target.name) {
                continue;
            }
            if is_self_column(source, &column.name, target, &target_pk.name) {
                continue;
            }

            // Plural-form table names are the canonical convention; a
            // singular-form match is slightly less specific.
            let weight = config.strategies.exact_name;
            let confidence = if pluralize(&stem) == target.name.to_lowercase() {
                weight
            } else {
                weight * 0.95
            };

            let source_is_key = config.is_primary_key_indicator(&column.name, &source.name);
            out.push(Relationship::new(
                &source.name,
                &column.name,
                &target.name,
                &target_pk.name,
                infer_cardinality(source_is_key, true),
                confidence,
                DetectionMethod::ExactName,
            ));
        }
        out
    }
}
