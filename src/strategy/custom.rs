//! User-declared rules: explicit relationship pairs and regex naming
//! patterns.

use super::{infer_cardinality, is_self_column, Strategy};
use crate::config::{CustomRules, PatternConfig};
use crate::model::{ColumnMode, DetectionMethod, Relationship, TableSchema};

/// Applies the custom-rules document. Explicit pairs are emitted verbatim
/// with `custom = true`, which makes them win conflict resolution for
/// their edge; naming-pattern matches rank like ordinary candidates.
pub struct CustomStrategy {
    rules: CustomRules,
}

impl CustomStrategy {
    pub fn new(rules: CustomRules) -> Self {
        Self { rules }
    }
}

impl Strategy for CustomStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::CustomRule
    }

    fn detect(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Vec<Relationship> {
        let mut out = Vec::new();

        for rule in &self.rules.relationships {
            if !rule.source_table.eq_ignore_ascii_case(&source.name)
                || !rule.target_table.eq_ignore_ascii_case(&target.name)
            {
                continue;
            }
            let (Some(scol), Some(tcol)) = (
                source.column(&rule.source_column),
                target.column(&rule.target_column),
            ) else {
                continue;
            };

            let mut rel = Relationship::new(
                &source.name,
                &scol.name,
                &target.name,
                &tcol.name,
                rule.cardinality,
                rule.confidence,
                DetectionMethod::CustomRule,
            );
            rel.custom = true;
            out.push(rel);
        }

        for rule in &self.rules.naming_patterns {
            let Some(re) = rule.regex() else { continue };
            for column in &source.columns {
                if column.mode == ColumnMode::Repeated {
                    continue;
                }
                let name_lower = column.name.to_lowercase();
                let Some(caps) = re.captures(&name_lower) else {
                    continue;
                };
                let stem = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or(name_lower.as_str());
                let expected = format!("{}{}", stem, rule.target_suffix);
                if !target.name.eq_ignore_ascii_case(&expected) {
                    continue;
                }
                let Some(target_col) = config.primary_key_column(target) else {
                    continue;
                };
                if is_self_column(source, &column.name, target, &target_col.name) {
                    continue;
                }

                let source_is_key = config.is_primary_key_indicator(&column.name, &source.name);
                out.push(Relationship::new(
                    &source.name,
                    &column.name,
                    &target.name,
                    &target_col.name,
                    infer_cardinality(source_is_key, true),
                    rule.confidence,
                    DetectionMethod::CustomNamingPattern,
                ));
            }
        }

        out
    }
}
