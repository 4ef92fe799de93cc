use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relhound::config::{CustomRules, PatternConfig};
use relhound::engine::DetectionEngine;
use relhound::model::{
    Cardinality, ColumnInfo, ColumnMode, DetectionMethod, TableSchema,
};
use relhound::validate::{SchemaSource, ValidateError};

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
        table("orders", &[("id", "INT64"), ("customer_id", "INT64"), ("amount", "FLOAT64")]),
        table("customers", &[("id", "INT64"), ("name", "STRING")]),
    ]
}

#[tokio::test]
async fn test_exact_name_example() {
    let engine = DetectionEngine::new(PatternConfig::default());
    let report = engine.detect(&shop_tables()).await.unwrap();

    assert_eq!(report.relationships.len(), 1, "expected exactly one relationship");
    let rel = &report.relationships[0];
    assert_eq!(rel.source_table, "orders");
    assert_eq!(rel.source_column, "customer_id");
    assert_eq!(rel.target_table, "customers");
    assert_eq!(rel.target_column, "id");
    assert_eq!(rel.cardinality, Cardinality::ManyToOne);
    assert!(rel.confidence >= 0.9);
    assert_eq!(rel.method, DetectionMethod::ExactName);
}

#[tokio::test]
async fn test_data_vault_example() {
    let engine = DetectionEngine::new(PatternConfig::default());
    let tables = vec![
        table("h_customer", &[("customer_hk", "STRING")]),
        table("s_customer_details", &[("customer_hk", "STRING"), ("name", "STRING")]),
    ];

    let report = engine.detect(&tables).await.unwrap();
    assert_eq!(report.relationships.len(), 1);
    let rel = &report.relationships[0];
    assert_eq!(rel.source_table, "s_customer_details");
    assert_eq!(rel.source_column, "customer_hk");
    assert_eq!(rel.target_table, "h_customer");
    assert_eq!(rel.target_column, "customer_hk");
    assert!((rel.confidence - 0.9).abs() < 0.05);
    assert_eq!(rel.method, DetectionMethod::DataVaultPattern);
}

#[tokio::test]
async fn test_custom_rule_separate_edge_both_emitted() {
    let rules = CustomRules::from_toml_str(
        r#"
[[relationships]]
source_table = "orders"
source_column = "customer_id"
target_table = "clients"
target_column = "id"
cardinality = "many_to_one"
confidence = 0.99
"#,
    )
    .unwrap();
    let engine = DetectionEngine::with_custom_rules(PatternConfig::default(), Some(rules));

    let mut tables = shop_tables();
    tables.push(table("clients", &[("id", "INT64")]));

    let report = engine.detect(&tables).await.unwrap();

    // customers and clients are different edges for the same source
    // column; both are emitted, subject to the per-table cap.
    let to_customers = report
        .relationships
        .iter()
        .find(|r| r.target_table == "customers")
        .expect("automatic edge still present");
    assert_eq!(to_customers.method, DetectionMethod::ExactName);

    let to_clients = report
        .relationships
        .iter()
        .find(|r| r.target_table == "clients")
        .expect("custom edge present");
    assert_eq!(to_clients.method, DetectionMethod::CustomRule);
    assert_eq!(to_clients.confidence, 0.99);
    assert!(to_clients.custom);
}

#[tokio::test]
async fn test_custom_rule_wins_same_edge() {
    let rules = CustomRules::from_toml_str(
        r#"
[[relationships]]
source_table = "orders"
source_column = "customer_id"
target_table = "customers"
target_column = "id"
cardinality = "one_to_one"
confidence = 0.6
"#,
    )
    .unwrap();
    let engine = DetectionEngine::with_custom_rules(PatternConfig::default(), Some(rules));

    let report = engine.detect(&shop_tables()).await.unwrap();
    assert_eq!(report.relationships.len(), 1);
    let rel = &report.relationships[0];
    // The custom rule beats the 0.95 exact-name candidate despite its
    // lower confidence.
    assert_eq!(rel.method, DetectionMethod::CustomRule);
    assert_eq!(rel.confidence, 0.6);
    assert_eq!(rel.cardinality, Cardinality::OneToOne);
}

#[tokio::test]
async fn test_determinism_across_runs_and_input_order() {
    let tables = vec![
        table("fact_sales", &[("customer_key", "INT64"), ("product_key", "INT64")]),
        table("dim_customer", &[("customer_key", "INT64")]),
        table("dim_product", &[("product_key", "INT64")]),
        table("orders", &[("id", "INT64"), ("customer_id", "INT64")]),
        table("customers", &[("id", "INT64")]),
    ];

    let engine = DetectionEngine::new(PatternConfig::default());
    let first = engine.detect(&tables).await.unwrap();
    let second = engine.detect(&tables).await.unwrap();
    assert_eq!(first.relationships, second.relationships);

    let mut reversed = tables.clone();
    reversed.reverse();
    let third = engine.detect(&reversed).await.unwrap();
    assert_eq!(first.relationships, third.relationships);
}

#[tokio::test]
async fn test_per_table_cap_respected() {
    let mut config = PatternConfig::default();
    config.filtering.max_relationships_per_table = 2;

    let tables = vec![
        table(
            "fact_sales",
            &[
                ("customer_key", "INT64"),
                ("product_key", "INT64"),
                ("store_key", "INT64"),
                ("promo_key", "INT64"),
            ],
        ),
        table("dim_customer", &[("customer_key", "INT64")]),
        table("dim_product", &[("product_key", "INT64")]),
        table("dim_store", &[("store_key", "INT64")]),
        table("dim_promo", &[("promo_key", "INT64")]),
    ];

    let engine = DetectionEngine::new(config);
    let report = engine.detect(&tables).await.unwrap();

    let from_fact = report
        .relationships
        .iter()
        .filter(|r| r.source_table == "fact_sales")
        .count();
    assert!(from_fact <= 2, "cap exceeded: {from_fact} edges");
}

#[tokio::test]
async fn test_self_referencing_table() {
    let engine = DetectionEngine::new(PatternConfig::default());
    let tables = vec![table(
        "employees",
        &[("id", "INT64"), ("employee_id", "INT64"), ("name", "STRING")],
    )];

    let report = engine.detect(&tables).await.unwrap();
    assert_eq!(report.relationships.len(), 1);
    let rel = &report.relationships[0];
    assert_eq!(rel.source_table, "employees");
    assert_eq!(rel.target_table, "employees");
    assert_eq!(rel.source_column, "employee_id");
    assert_eq!(rel.target_column, "id");
}

struct MapSource {
    samples: HashMap<(String, String), Vec<String>>,
}

impl MapSource {
    fn new(entries: &[(&str, &str, &[&str])]) -> Self {
        let mut samples = HashMap::new();
        for (t, c, values) in entries {
            samples.insert(
                (t.to_string(), c.to_string()),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        Self { samples }
    }
}

#[async_trait]
impl SchemaSource for MapSource {
    async fn sample_column(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, ValidateError> {
        let values = self
            .samples
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(values.into_iter().take(limit).collect())
    }
}

#[tokio::test]
async fn test_data_validation_confirms_relationship() {
    let mut config = PatternConfig::default();
    config.data_testing.enabled = true;

    let source = MapSource::new(&[
        ("orders", "customer_id", &["1", "2", "3"]),
        ("customers", "id", &["1", "2", "3", "4"]),
    ]);
    let engine =
        DetectionEngine::new(config).with_schema_source(Arc::new(source));

    let report = engine.detect(&shop_tables()).await.unwrap();
    assert_eq!(report.relationships.len(), 1);
    let rel = &report.relationships[0];
    let evidence = rel.evidence.as_ref().expect("validated");
    assert!(evidence.passed);
    assert!(rel.confidence >= 0.95);
    assert!(report.stats.validations_run >= 1);
}

#[tokio::test]
async fn test_data_validation_failure_drops_relationship() {
    let mut config = PatternConfig::default();
    config.data_testing.enabled = true;

    // Source values never resolve in the target: the edge fails
    // validation and falls below the min-confidence filter.
    let source = MapSource::new(&[
        ("orders", "customer_id", &["100", "101", "102"]),
        ("customers", "id", &["1", "2", "3"]),
    ]);
    let engine =
        DetectionEngine::new(config).with_schema_source(Arc::new(source));

    let report = engine.detect(&shop_tables()).await.unwrap();
    assert!(report.relationships.is_empty());
}

#[tokio::test]
async fn test_sampling_failure_keeps_relationship_unvalidated() {
    struct FailingSource;

    #[async_trait]
    impl SchemaSource for FailingSource {
        async fn sample_column(
            &self,
            table: &str,
            column: &str,
            _limit: usize,
        ) -> Result<Vec<String>, ValidateError> {
            Err(ValidateError::Sample {
                table: table.to_string(),
                column: column.to_string(),
                reason: "permission denied".to_string(),
            })
        }
    }

    let mut config = PatternConfig::default();
    config.data_testing.enabled = true;

    let engine = DetectionEngine::new(config).with_schema_source(Arc::new(FailingSource));
    let report = engine.detect(&shop_tables()).await.unwrap();

    assert_eq!(report.relationships.len(), 1);
    let rel = &report.relationships[0];
    assert!(rel.evidence.is_none());
    assert!(rel.confidence >= 0.9);
}

#[tokio::test]
async fn test_batch_timeout_reports_failed_tables() {
    struct SlowSource;

    #[async_trait]
    impl SchemaSource for SlowSource {
        async fn sample_column(
            &self,
            _table: &str,
            _column: &str,
            _limit: usize,
        ) -> Result<Vec<String>, ValidateError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    let mut config = PatternConfig::default();
    config.data_testing.enabled = true;
    config.performance.batch_timeout_secs = 1;

    let engine = DetectionEngine::new(config).with_schema_source(Arc::new(SlowSource));
    let report = engine.detect(&shop_tables()).await.unwrap();

    // The batch is abandoned, its tables reported failed, and the run
    // itself still succeeds.
    assert!(report.relationships.is_empty());
    assert!(!report.failed_tables.is_empty());
    assert!(report.failed_tables.contains(&"orders".to_string()));
}
