//! The detection engine.
//!
//! Orchestrates one run: the incremental tracker filters the table set,
//! the coordinator fans batches out over worker tasks, each pair unit
//! consults the cache before running strategies and the optional data
//! validator, and the aggregator merges everything into the final
//! relationship set.
//!
//! Failure policy: only configuration errors are fatal, and those
//! surface before an engine exists. Cache and tracker I/O errors degrade
//! to recomputation; a batch that exceeds its timeout is abandoned and
//! its tables reported as failed for this run.

mod coordinator;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::cache::{PairVerdict, RelationshipCache};
use crate::config::{ConfigError, CustomRules, PatternConfig};
use crate::model::{PairKey, Relationship, TableSchema};
use crate::state::{self, ChangeTracker};
use crate::strategy::{self, Strategy};
use crate::validate::{DataValidator, SchemaSource};

/// Fatal engine errors. Everything recoverable degrades instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Counters describing one detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Tables that went through strategy execution.
    pub processed_tables: usize,
    /// Tables skipped via the incremental tracker and cache.
    pub skipped_tables: usize,
    /// Table pairs examined by batch workers.
    pub pairs_examined: usize,
    /// Pairs answered from the cache without running strategies.
    pub cache_hits: usize,
    /// Candidates that went through data validation.
    pub validations_run: usize,
}

/// The outcome of one detection run.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    /// Final, deterministic relationship set.
    pub relationships: Vec<Relationship>,
    /// Tables whose batch timed out or crashed this run. Not fatal; they
    /// are retried on the next run.
    pub failed_tables: Vec<String>,
    pub stats: DetectionStats,
}

#[derive(Debug, Default)]
struct BatchOutput {
    candidates: Vec<Relationship>,
    completed_tables: Vec<String>,
    pairs_examined: usize,
    cache_hits: usize,
    validations_run: usize,
}

/// Relationship detection engine. Collaborators (cache, tracker, schema
/// source) are injected; all are optional, and the engine degrades to
/// full recomputation without them.
pub struct DetectionEngine {
    config: Arc<PatternConfig>,
    strategies: Arc<Vec<Box<dyn Strategy>>>,
    cache: Option<Arc<RelationshipCache>>,
    tracker: Option<Arc<ChangeTracker>>,
    validator: Option<Arc<DataValidator>>,
}

impl DetectionEngine {
    /// Create an engine with the given pattern configuration and no
    /// custom rules.
    pub fn new(config: PatternConfig) -> Self {
        Self::with_custom_rules(config, None)
    }

    /// Create an engine with custom rules merged into the strategy set.
    pub fn with_custom_rules(config: PatternConfig, custom: Option<CustomRules>) -> Self {
        Self {
            config: Arc::new(config),
            strategies: Arc::new(strategy::registry(custom)),
            cache: None,
            tracker: None,
            validator: None,
        }
    }

    /// Attach a relationship cache.
    pub fn with_cache(mut self, cache: Arc<RelationshipCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach an incremental tracker.
    pub fn with_tracker(mut self, tracker: Arc<ChangeTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Attach a schema source for data validation. Validation only runs
    /// when `data_testing.enabled` is set in the configuration.
    pub fn with_schema_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.validator = Some(Arc::new(DataValidator::new(
            source,
            self.config.data_testing.clone(),
        )));
        self
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Run detection over a snapshot of table schemas.
    pub async fn detect(&self, tables: &[TableSchema]) -> Result<DetectionReport, EngineError> {
        info!(tables = tables.len(), "starting relationship detection");

        let fingerprints: Arc<HashMap<String, String>> = Arc::new(
            tables
                .iter()
                .map(|t| (t.name.to_lowercase(), state::fingerprint(t)))
                .collect(),
        );

        let (processing, skipped) = self.split_processing_set(tables);
        info!(
            processing = processing.len(),
            skipped = skipped.len(),
            "incremental filter applied"
        );

        let mut stats = DetectionStats {
            processed_tables: 0,
            skipped_tables: skipped.len(),
            ..Default::default()
        };

        // Reload verdicts for pairs entirely within the skipped set; a
        // pair with a processing-side table is re-derived fresh below.
        let mut candidates = self.reload_skipped_pairs(&skipped, &fingerprints, &mut stats);

        let mut failed_tables = Vec::new();

        if !processing.is_empty() {
            let batches = coordinator::partition(processing, &self.config);
            let outputs = self.run_batches(batches, tables, &fingerprints, &mut failed_tables).await;

            for output in outputs {
                stats.pairs_examined += output.pairs_examined;
                stats.cache_hits += output.cache_hits;
                stats.validations_run += output.validations_run;
                stats.processed_tables += output.completed_tables.len();
                candidates.extend(output.candidates);
                self.mark_processed(&output.completed_tables, tables);
            }
        } else {
            debug!("no table changed; skipping strategy execution entirely");
        }

        let relationships = aggregate::resolve(candidates, &self.config.filtering);
        info!(
            relationships = relationships.len(),
            failed = failed_tables.len(),
            "relationship detection completed"
        );

        failed_tables.sort();
        failed_tables.dedup();
        Ok(DetectionReport {
            relationships,
            failed_tables,
            stats,
        })
    }

    /// Split tables into the processing set and the skipped set. A table
    /// is skipped only when the tracker knows its fingerprint is
    /// unchanged and the cache still holds at least one live entry for
    /// it. Tracker or cache errors degrade to processing everything.
    fn split_processing_set(
        &self,
        tables: &[TableSchema],
    ) -> (Vec<TableSchema>, Vec<TableSchema>) {
        let Some(tracker) = self.tracker.as_ref().filter(|_| self.config.performance.incremental)
        else {
            return (tables.to_vec(), Vec::new());
        };

        let changed: HashSet<String> = match tracker.tables_to_process(tables) {
            Ok(changed) => changed.iter().map(|t| t.name.to_lowercase()).collect(),
            Err(err) => {
                warn!(error = %err, "tracker unavailable, reprocessing all tables");
                return (tables.to_vec(), Vec::new());
            }
        };

        let mut processing = Vec::new();
        let mut skipped = Vec::new();
        for table in tables {
            if changed.contains(&table.name.to_lowercase()) {
                processing.push(table.clone());
                continue;
            }
            let has_live_entry = match &self.cache {
                Some(cache) if self.config.performance.cache_enabled => {
                    cache.has_live_entry_for(&table.name).unwrap_or_else(|err| {
                        warn!(error = %err, table = %table.name, "cache unavailable");
                        false
                    })
                }
                _ => false,
            };
            if has_live_entry {
                skipped.push(table.clone());
            } else {
                // Unchanged but nothing cached (e.g. expired entries):
                // back into the processing set.
                processing.push(table.clone());
            }
        }
        (processing, skipped)
    }

    /// Pull cached verdicts for pairs whose both sides were skipped.
    fn reload_skipped_pairs(
        &self,
        skipped: &[TableSchema],
        fingerprints: &HashMap<String, String>,
        stats: &mut DetectionStats,
    ) -> Vec<Relationship> {
        let Some(cache) = &self.cache else {
            return Vec::new();
        };
        if !self.config.performance.cache_enabled {
            return Vec::new();
        }

        let mut reloaded = Vec::new();
        for (i, a) in skipped.iter().enumerate() {
            for b in &skipped[i..] {
                let pair = PairKey::new(&a.name, &b.name);
                let fp = combined_fingerprint_for(&pair, fingerprints);
                match cache.get(&pair, &fp) {
                    Ok(Some(verdict)) => {
                        stats.cache_hits += 1;
                        reloaded.extend(verdict.relationships().to_vec());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(error = %err, "cache read failed during reload");
                    }
                }
            }
        }
        reloaded
    }

    /// Fan batches out over semaphore-gated worker tasks, each bounded
    /// by the batch timeout. Timed-out or crashed batches report their
    /// tables as failed; remaining batches continue.
    async fn run_batches(
        &self,
        batches: Vec<Vec<TableSchema>>,
        all_tables: &[TableSchema],
        fingerprints: &Arc<HashMap<String, String>>,
        failed_tables: &mut Vec<String>,
    ) -> Vec<BatchOutput> {
        let performance = &self.config.performance;
        let permits = if performance.parallel {
            performance.max_workers.max(1)
        } else {
            1
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let timeout = Duration::from_secs(performance.batch_timeout_secs.max(1));
        let claimed: Arc<DashMap<PairKey, ()>> = Arc::new(DashMap::new());
        let all: Arc<Vec<TableSchema>> = Arc::new(all_tables.to_vec());

        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let names: Vec<String> = batch.iter().map(|t| t.name.clone()).collect();
            let ctx = BatchContext {
                config: Arc::clone(&self.config),
                strategies: Arc::clone(&self.strategies),
                cache: self.cache.clone(),
                validator: self.validator.clone(),
                all: Arc::clone(&all),
                fingerprints: Arc::clone(fingerprints),
                claimed: Arc::clone(&claimed),
            };
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                match tokio::time::timeout(timeout, process_batch(batch, ctx)).await {
                    Ok(output) => Some(output),
                    Err(_) => None,
                }
            });
            handles.push((names, handle));
        }

        let (batch_names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut outputs = Vec::new();
        for (names, result) in batch_names.into_iter().zip(results) {
            match result {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => {
                    warn!(tables = ?names, "batch timed out, reporting tables as failed");
                    failed_tables.extend(names);
                }
                Err(err) => {
                    warn!(error = %err, tables = ?names, "batch worker crashed");
                    failed_tables.extend(names);
                }
            }
        }
        outputs
    }

    /// Persist fingerprints for tables whose batch completed.
    fn mark_processed(&self, completed: &[String], tables: &[TableSchema]) {
        let Some(tracker) = &self.tracker else { return };
        if !self.config.performance.incremental {
            return;
        }
        for name in completed {
            let Some(schema) = tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)) else {
                continue;
            };
            if let Err(err) = tracker.mark_processed(schema) {
                warn!(error = %err, table = %name, "failed to persist tracker state");
            }
        }
    }
}

struct BatchContext {
    config: Arc<PatternConfig>,
    strategies: Arc<Vec<Box<dyn Strategy>>>,
    cache: Option<Arc<RelationshipCache>>,
    validator: Option<Arc<DataValidator>>,
    all: Arc<Vec<TableSchema>>,
    fingerprints: Arc<HashMap<String, String>>,
    claimed: Arc<DashMap<PairKey, ()>>,
}

/// Process one batch: every unordered pair with a source table in the
/// batch, claimed exactly once across all batches.
async fn process_batch(batch: Vec<TableSchema>, ctx: BatchContext) -> BatchOutput {
    let mut out = BatchOutput::default();
    let cache_enabled = ctx.config.performance.cache_enabled;
    let validate = ctx.config.data_testing.enabled && ctx.validator.is_some();

    for source in &batch {
        for target in ctx.all.iter() {
            let pair = PairKey::new(&source.name, &target.name);
            if ctx.claimed.insert(pair.clone(), ()).is_some() {
                continue;
            }
            out.pairs_examined += 1;
            let fp = combined_fingerprint_for(&pair, &ctx.fingerprints);

            if cache_enabled {
                if let Some(cache) = &ctx.cache {
                    match cache.get(&pair, &fp) {
                        Ok(Some(verdict)) => {
                            out.cache_hits += 1;
                            out.candidates.extend(verdict.relationships().to_vec());
                            continue;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "cache read failed, recomputing pair");
                        }
                    }
                }
            }

            let mut found = Vec::new();
            for strategy in ctx.strategies.iter() {
                found.extend(strategy.detect(source, target, &ctx.config));
                if !source.name.eq_ignore_ascii_case(&target.name) {
                    found.extend(strategy.detect(target, source, &ctx.config));
                }
            }

            if validate {
                if let Some(validator) = &ctx.validator {
                    let min_confidence = ctx.config.filtering.min_confidence;
                    for rel in &mut found {
                        // Candidates already under the filter threshold
                        // are not worth a sampling round-trip.
                        if rel.confidence < min_confidence {
                            continue;
                        }
                        let (s_schema, t_schema) = orient(rel, source, target);
                        validator.validate(rel, s_schema, t_schema).await;
                        out.validations_run += 1;
                    }
                }
            }

            if cache_enabled {
                if let Some(cache) = &ctx.cache {
                    let verdict = if found.is_empty() {
                        PairVerdict::NoRelationship
                    } else {
                        PairVerdict::Found(found.clone())
                    };
                    if let Err(err) = cache.put(&pair, &fp, &verdict) {
                        warn!(error = %err, "cache write failed");
                    }
                }
            }

            out.candidates.extend(found);
        }
    }

    out.completed_tables = batch.into_iter().map(|t| t.name).collect();
    out
}

/// Match a candidate back to the pair's schemas in its own orientation.
fn orient<'a>(
    rel: &Relationship,
    a: &'a TableSchema,
    b: &'a TableSchema,
) -> (&'a TableSchema, &'a TableSchema) {
    if rel.source_table.eq_ignore_ascii_case(&a.name) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Combined fingerprint for a pair from the per-table fingerprint map.
fn combined_fingerprint_for(pair: &PairKey, fingerprints: &HashMap<String, String>) -> String {
    let (first, second) = pair.tables();
    let fp_first = fingerprints.get(first).map(String::as_str).unwrap_or("");
    let fp_second = fingerprints.get(second).map(String::as_str).unwrap_or("");
    state::combined_fingerprint((first, fp_first), (second, fp_second))
}
