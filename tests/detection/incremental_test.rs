use std::sync::Arc;

use relhound::cache::{PairVerdict, RelationshipCache};
use relhound::config::PatternConfig;
use relhound::engine::DetectionEngine;
use relhound::model::{ColumnInfo, ColumnMode, PairKey, TableSchema};
use relhound::state::ChangeTracker;

fn table(name: &str, columns: &[(&str, &str)]) -> TableSchema {
    TableSchema::new(
        name,
        columns
            .iter()
            .enumerate()
            .map(|(i, (col, ty))| ColumnInfo::new(*col, *ty, ColumnMode::Nullable, i))
            .collect(),
    )
}

fn shop_tables() -> Vec<TableSchema> {
    vec![
        table("orders", &[("id", "INT64"), ("customer_id", "INT64")]),
        table("customers", &[("id", "INT64"), ("name", "STRING")]),
        table("products", &[("id", "INT64"), ("title", "STRING")]),
    ]
}

fn engine_with_state(
    cache: Arc<RelationshipCache>,
    tracker: Arc<ChangeTracker>,
) -> DetectionEngine {
    DetectionEngine::new(PatternConfig::default())
        .with_cache(cache)
        .with_tracker(tracker)
}

#[tokio::test]
async fn test_unchanged_run_executes_no_strategy() {
    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = engine_with_state(Arc::clone(&cache), Arc::clone(&tracker));
    let tables = shop_tables();

    let first = engine.detect(&tables).await.unwrap();
    assert!(first.stats.pairs_examined > 0);
    assert_eq!(first.stats.skipped_tables, 0);
    assert_eq!(first.relationships.len(), 1);

    let second = engine.detect(&tables).await.unwrap();
    // Nothing changed: every table skipped, no pair re-examined, and
    // the relationship set equals the previous run's.
    assert_eq!(second.stats.pairs_examined, 0);
    assert_eq!(second.stats.skipped_tables, tables.len());
    assert!(second.stats.cache_hits > 0);
    assert_eq!(second.relationships, first.relationships);
}

#[tokio::test]
async fn test_changed_table_is_reprocessed() {
    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = engine_with_state(Arc::clone(&cache), Arc::clone(&tracker));

    let tables = shop_tables();
    engine.detect(&tables).await.unwrap();

    // Add a column to orders: only orders should be reprocessed, and
    // the new product_id edge should appear.
    let mut changed = tables.clone();
    changed[0]
        .columns
        .push(ColumnInfo::new("product_id", "INT64", ColumnMode::Nullable, 2));

    let report = engine.detect(&changed).await.unwrap();
    assert_eq!(report.stats.skipped_tables, 2);
    // orders pairs with all three tables (including itself)
    assert_eq!(report.stats.pairs_examined, 3);
    assert_eq!(report.relationships.len(), 2);
    assert!(report
        .relationships
        .iter()
        .any(|r| r.target_table == "products" && r.source_column == "product_id"));
}

#[tokio::test]
async fn test_cached_negative_verdict_honored() {
    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = engine_with_state(Arc::clone(&cache), Arc::clone(&tracker));

    let tables = vec![
        table("orders", &[("id", "INT64")]),
        table("products", &[("id", "INT64")]),
    ];
    let first = engine.detect(&tables).await.unwrap();
    assert!(first.relationships.is_empty());

    // The negative verdict is itself cached
    let fp_orders = relhound::state::fingerprint(&tables[0]);
    let fp_products = relhound::state::fingerprint(&tables[1]);
    let fp = relhound::state::combined_fingerprint(
        ("orders", &fp_orders),
        ("products", &fp_products),
    );
    let verdict = cache.get(&PairKey::new("orders", "products"), &fp).unwrap();
    assert_eq!(verdict, Some(PairVerdict::NoRelationship));

    // Second run is answered entirely from cache
    let second = engine.detect(&tables).await.unwrap();
    assert_eq!(second.stats.pairs_examined, 0);
    assert!(second.relationships.is_empty());
}

#[tokio::test]
async fn test_zero_ttl_forces_recompute() {
    let cache = Arc::new(RelationshipCache::open_in_memory(0).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = engine_with_state(Arc::clone(&cache), Arc::clone(&tracker));
    let tables = shop_tables();

    let first = engine.detect(&tables).await.unwrap();
    let second = engine.detect(&tables).await.unwrap();

    // With every entry expired on arrival, unchanged tables cannot be
    // skipped and detection runs again.
    assert!(second.stats.pairs_examined > 0);
    assert_eq!(second.relationships, first.relationships);
}

#[tokio::test]
async fn test_invalidate_table_forces_recompute() {
    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = engine_with_state(Arc::clone(&cache), Arc::clone(&tracker));
    let tables = shop_tables();

    engine.detect(&tables).await.unwrap();
    cache.invalidate_table("orders").unwrap();

    let report = engine.detect(&tables).await.unwrap();
    // orders lost its cache entries, so it rejoins the processing set
    assert!(report.stats.pairs_examined > 0);
    assert_eq!(report.relationships.len(), 1);
}

#[tokio::test]
async fn test_cache_only_without_tracker() {
    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let engine = DetectionEngine::new(PatternConfig::default()).with_cache(Arc::clone(&cache));
    let tables = shop_tables();

    let first = engine.detect(&tables).await.unwrap();
    assert_eq!(first.stats.cache_hits, 0);

    // Without a tracker every table is processed, but pair verdicts
    // short-circuit strategy execution.
    let second = engine.detect(&tables).await.unwrap();
    assert_eq!(second.stats.cache_hits, second.stats.pairs_examined);
    assert_eq!(second.relationships, first.relationships);
}

#[tokio::test]
async fn test_incremental_disabled_in_config() {
    let mut config = PatternConfig::default();
    config.performance.incremental = false;

    let cache = Arc::new(RelationshipCache::open_in_memory(3600).unwrap());
    let tracker = Arc::new(ChangeTracker::open_in_memory().unwrap());
    let engine = DetectionEngine::new(config)
        .with_cache(cache)
        .with_tracker(tracker);
    let tables = shop_tables();

    engine.detect(&tables).await.unwrap();
    let second = engine.detect(&tables).await.unwrap();
    assert_eq!(second.stats.skipped_tables, 0);
}
