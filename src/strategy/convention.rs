//! Naming-convention matching across table-pattern families, including
//! data-vault hub/link/satellite references.

use super::inflect::names_match;
use super::{infer_cardinality, is_self_column, Strategy};
use crate::config::PatternConfig;
use crate::model::{ColumnInfo, ColumnMode, DetectionMethod, Relationship, TableSchema};

/// Matches foreign-key stems against prefixed table names
/// (`customer_id` -> `dim_customer`), and hash-key columns against
/// data-vault hubs (`customer_hk` -> `h_customer.customer_hk`).
pub struct ConventionStrategy;

impl ConventionStrategy {
    /// Target column for a convention match: a same-named key column when
    /// the target has one, otherwise the target's primary-key column.
    fn target_column<'a>(
        config: &PatternConfig,
        target: &'a TableSchema,
        source_column: &str,
    ) -> Option<&'a ColumnInfo> {
        if let Some(same) = target.column(source_column) {
            if same.mode != ColumnMode::Repeated
                && config.is_primary_key_indicator(&same.name, &target.name)
            {
                return Some(same);
            }
        }
        config.primary_key_column(target)
    }

    /// Data-vault reference: the column carries a hash-key suffix and the
    /// target is the hub (or link) for its stem.
    fn detect_data_vault(
        source: &TableSchema,
        column: &ColumnInfo,
        stem: &str,
        suffix: &str,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Option<Relationship> {
        if suffix != "_hk" && suffix != "_hash_key" {
            return None;
        }

        let target_lower = target.name.to_lowercase();
        let vault = config.table_patterns.get("data_vault")?;
        let is_vault_target = vault
            .values()
            .any(|p| !p.prefix.is_empty() && target_lower.starts_with(&p.prefix));
        if !is_vault_target {
            return None;
        }

        // Stem must name the target once its vault prefix is removed,
        // or the target is a hub sharing the exact hash-key column.
        let base = vault
            .values()
            .filter(|p| !p.prefix.is_empty())
            .filter_map(|p| target_lower.strip_prefix(p.prefix.as_str()))
            .next()
            .unwrap_or(target_lower.as_str());
        let is_hub_target = vault
            .get("hub")
            .is_some_and(|p| !p.prefix.is_empty() && target_lower.starts_with(&p.prefix));
        let shares_column = is_hub_target
            && target
                .column(&column.name)
                .is_some_and(|c| config.is_primary_key_indicator(&c.name, &target.name));
        if !names_match(stem, base) && !shares_column {
            return None;
        }

        let target_col = Self::target_column(config, target, &column.name)?;
        if is_self_column(source, &column.name, target, &target_col.name) {
            return None;
        }

        let source_is_key = config.is_primary_key_indicator(&column.name, &source.name);
        Some(Relationship::new(
            &source.name,
            &column.name,
            &target.name,
            &target_col.name,
            infer_cardinality(source_is_key, true),
            config.strategies.data_vault,
            DetectionMethod::DataVaultPattern,
        ))
    }

    /// Prefix-tolerant stem matching: `customer_id` -> `dim_customer`.
    fn detect_prefixed(
        source: &TableSchema,
        column: &ColumnInfo,
        stem: &str,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Option<Relationship> {
        let target_lower = target.name.to_lowercase();
        let base = config
            .table_prefixes()
            .iter()
            .find_map(|prefix| target_lower.strip_prefix(*prefix))
            .map(|b| b.to_string())?;

        if !names_match(stem, &base) {
            return None;
        }

        let target_col = Self::target_column(config, target, &column.name)?;
        if is_self_column(source, &column.name, target, &target_col.name) {
            return None;
        }

        let source_is_key = config.is_primary_key_indicator(&column.name, &source.name);
        Some(Relationship::new(
            &source.name,
            &column.name,
            &target.name,
            &target_col.name,
            infer_cardinality(source_is_key, true),
            config.strategies.naming_convention,
            DetectionMethod::NamingConvention,
        ))
    }
}

impl Strategy for ConventionStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::NamingConvention
    }

    fn detect(
        &self,
        source: &TableSchema,
        target: &TableSchema,
        config: &PatternConfig,
    ) -> Vec<Relationship> {
        let mut out = Vec::new();
        for column in &source.columns {
            if column.mode == ColumnMode::Repeated {
                continue;
            }
            let Some((stem, suffix)) = config.strip_fk_suffix(&column.name) else {
                continue;
            };

            if let Some(rel) =
                Self::detect_data_vault(source, column, &stem, suffix, target, config)
            {
                out.push(rel);
                continue;
            }
            if let Some(rel) = Self::detect_prefixed(source, column, &stem, target, config) {
                out.push(rel);
            }
        }
        out
    }
}
