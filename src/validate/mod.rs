//! Data-based relationship validation.
//!
//! Samples actual column values through the `SchemaSource` boundary and
//! tests a candidate's referential plausibility, type compatibility and
//! distribution similarity. Sampling failures are never fatal: the
//! candidate is kept at its pre-validation confidence, unvalidated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DataTestingSettings;
use crate::model::{Cardinality, Relationship, TableSchema, ValidationEvidence};

/// Errors surfaced by a schema source. Recovered locally; a failed
/// sample leaves the candidate unvalidated.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("failed to sample {table}.{column}: {reason}")]
    Sample {
        table: String,
        column: String,
        reason: String,
    },

    #[error("timed out sampling {table}.{column}")]
    Timeout { table: String, column: String },

    #[error("schema source error: {0}")]
    Source(String),
}

/// Boundary to the system that owns the actual data. The engine only
/// ever asks for bounded column samples and row-count hints.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Draw up to `limit` non-null values from a column, stringified.
    async fn sample_column(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, ValidateError>;

    /// Total row count of a table, when cheaply available.
    async fn row_count(&self, _table: &str) -> Result<Option<u64>, ValidateError> {
        Ok(None)
    }
}

/// Validates candidate relationships against sampled data.
pub struct DataValidator {
    source: Arc<dyn SchemaSource>,
    settings: DataTestingSettings,
}

impl DataValidator {
    pub fn new(source: Arc<dyn SchemaSource>, settings: DataTestingSettings) -> Self {
        Self { source, settings }
    }

    /// Validate one candidate in place, adjusting its confidence and
    /// attaching evidence. On sampling failure the candidate is left
    /// untouched apart from a debug log.
    pub async fn validate(
        &self,
        rel: &mut Relationship,
        source_schema: &TableSchema,
        target_schema: &TableSchema,
    ) {
        let limit = self.sample_limit(rel).await;

        let source_sample = match self
            .fetch(&rel.source_table, &rel.source_column, limit)
            .await
        {
            Ok(sample) => sample,
            Err(err) => {
                warn!(
                    table = %rel.source_table,
                    column = %rel.source_column,
                    error = %err,
                    "sampling failed, keeping candidate unvalidated"
                );
                return;
            }
        };
        let target_sample = match self
            .fetch(&rel.target_table, &rel.target_column, limit)
            .await
        {
            Ok(sample) => sample,
            Err(err) => {
                warn!(
                    table = %rel.target_table,
                    column = %rel.target_column,
                    error = %err,
                    "sampling failed, keeping candidate unvalidated"
                );
                return;
            }
        };

        if source_sample.is_empty() || target_sample.is_empty() {
            debug!(
                source = %rel.source_table,
                target = %rel.target_table,
                "empty sample, keeping candidate unvalidated"
            );
            return;
        }

        let (referential_integrity, orphan_count, source_distinct) =
            referential_integrity(&source_sample, &target_sample);
        let type_compatibility = type_compatibility(rel, source_schema, target_schema);
        let distribution_similarity = distribution_similarity(&source_sample, &target_sample);

        let overall = 0.5 * referential_integrity
            + 0.3 * type_compatibility
            + 0.2 * distribution_similarity;

        let plausible = referential_integrity >= 1.0 - self.settings.max_orphan_percentage / 100.0;
        let passed = plausible && overall >= self.settings.confidence_threshold;

        if passed {
            rel.confidence = (rel.confidence + self.settings.validation_bonus).min(1.0);
            self.refine_cardinality(rel, &source_sample, source_distinct, &target_sample);
        } else {
            rel.confidence *= self.settings.failure_factor;
            debug!(
                source = %rel.source_table,
                target = %rel.target_table,
                overall,
                "validation failed, confidence reduced to {:.3}",
                rel.confidence
            );
        }

        rel.evidence = Some(ValidationEvidence {
            referential_integrity,
            type_compatibility,
            distribution_similarity,
            overall,
            sample_size: source_sample.len(),
            orphan_count,
            passed,
        });
    }

    /// Fetch one column sample under the per-sample timeout. A timed-out
    /// fetch is a validator failure, never a batch-level one.
    async fn fetch(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, ValidateError> {
        let timeout = std::time::Duration::from_secs(self.settings.sample_timeout_secs.max(1));
        match tokio::time::timeout(timeout, self.source.sample_column(table, column, limit)).await
        {
            Ok(result) => result,
            Err(_) => Err(ValidateError::Timeout {
                table: table.to_string(),
                column: column.to_string(),
            }),
        }
    }

    /// Sample size, grown adaptively for borderline candidates when a
    /// target confidence level is configured.
    async fn sample_limit(&self, rel: &Relationship) -> usize {
        let base = self.settings.sample_size;
        let Some(target_confidence) = self.settings.target_confidence else {
            return base;
        };
        let borderline = (rel.confidence - self.settings.confidence_threshold).abs() <= 0.15;
        if !borderline {
            return base;
        }
        match self.source.row_count(&rel.source_table).await {
            Ok(Some(rows)) => base.max(cochran_sample_size(rows, target_confidence)),
            _ => base,
        }
    }

    /// Refine cardinality from sample uniqueness once the relationship
    /// is data-validated.
    fn refine_cardinality(
        &self,
        rel: &mut Relationship,
        source_sample: &[String],
        source_distinct: usize,
        target_sample: &[String],
    ) {
        let target_distinct = target_sample.iter().collect::<HashSet<_>>().len();
        let source_unique = source_distinct as f64 / source_sample.len() as f64 >= 0.95;
        let target_unique = target_distinct as f64 / target_sample.len() as f64 >= 0.95;
        rel.cardinality = Cardinality::from_uniqueness(source_unique, target_unique);
    }
}

/// Fraction of distinct source values present in the target sample,
/// plus the orphan count and the distinct source count.
fn referential_integrity(source: &[String], target: &[String]) -> (f64, usize, usize) {
    let source_set: HashSet<&String> = source.iter().collect();
    let target_set: HashSet<&String> = target.iter().collect();
    let overlap = source_set.intersection(&target_set).count();
    let distinct = source_set.len();
    let orphans = distinct - overlap;
    let integrity = if distinct > 0 {
        overlap as f64 / distinct as f64
    } else {
        0.0
    };
    (integrity, orphans, distinct)
}

/// Declared-type compatibility score for the related columns.
fn type_compatibility(
    rel: &Relationship,
    source_schema: &TableSchema,
    target_schema: &TableSchema,
) -> f64 {
    let source_col = source_schema.column(&rel.source_column);
    let target_col = target_schema.column(&rel.target_column);
    match (source_col, target_col) {
        (Some(s), Some(t)) => s.column_type.compatibility_score(t.column_type),
        _ => 0.0,
    }
}

/// Coarse frequency-distribution similarity weighted by common-value
/// coverage. A tunable heuristic, not a contract.
fn distribution_similarity(source: &[String], target: &[String]) -> f64 {
    if source.is_empty() || target.is_empty() {
        return 0.0;
    }

    let mut source_freq: HashMap<&String, usize> = HashMap::new();
    for value in source {
        *source_freq.entry(value).or_insert(0) += 1;
    }
    let mut target_freq: HashMap<&String, usize> = HashMap::new();
    for value in target {
        *target_freq.entry(value).or_insert(0) += 1;
    }

    let common: Vec<&&String> = source_freq
        .keys()
        .filter(|v| target_freq.contains_key(**v))
        .collect();
    if common.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    for value in &common {
        let source_ratio = source_freq[**value] as f64 / source.len() as f64;
        let target_ratio = target_freq[**value] as f64 / target.len() as f64;
        total += 1.0 - (source_ratio - target_ratio).abs();
    }

    let coverage = common.len() as f64 / source_freq.len().max(target_freq.len()) as f64;
    (total / common.len() as f64) * coverage
}

/// Cochran's sample-size formula with finite-population correction,
/// at a 5% margin of error.
fn cochran_sample_size(population: u64, confidence_level: f64) -> usize {
    let z = if confidence_level >= 0.99 {
        2.576
    } else if confidence_level >= 0.95 {
        1.96
    } else {
        1.645
    };
    let margin: f64 = 0.05;
    let n = (z * z * 0.25) / (margin * margin);

    let population = population as f64;
    if population < n {
        return population as usize;
    }
    let adjusted = n / (1.0 + (n - 1.0) / population);
    adjusted.min(population) as usize
}
