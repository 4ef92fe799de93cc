use relhound::config::{CustomRules, PatternConfig};
use relhound::model::{ColumnInfo, ColumnMode, DetectionMethod, TableSchema};
use relhound::strategy::{self, Strategy};

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

/// Run every registered strategy over one ordered pair.
fn detect_all(
    strategies: &[Box<dyn Strategy>],
    source: &TableSchema,
    target: &TableSchema,
    config: &PatternConfig,
) -> Vec<relhound::model::Relationship> {
    strategies
        .iter()
        .flat_map(|s| s.detect(source, target, config))
        .collect()
}

#[test]
fn test_mixed_warehouse_methods() {
    let config = PatternConfig::default();
    let strategies = strategy::registry(None);

    let orders = table("orders", &[("id", "INT64"), ("customer_id", "INT64")]);
    let customers = table("customers", &[("id", "INT64")]);
    let satellite = table("s_customer", &[("customer_hk", "STRING"), ("name", "STRING")]);
    let hub = table("h_customer", &[("customer_hk", "STRING")]);
    let fact = table("fact_sales", &[("customer_key", "INT64"), ("amount", "FLOAT64")]);
    let dim = table("dim_customer", &[("customer_key", "INT64")]);

    let exact = detect_all(&strategies, &orders, &customers, &config);
    assert!(exact.iter().any(|r| r.method == DetectionMethod::ExactName));

    let vault = detect_all(&strategies, &satellite, &hub, &config);
    assert!(vault.iter().any(|r| r.method == DetectionMethod::DataVaultPattern));

    let dimensional = detect_all(&strategies, &fact, &dim, &config);
    assert!(dimensional
        .iter()
        .any(|r| r.method == DetectionMethod::NamingConvention));
}

#[test]
fn test_strategies_are_pure() {
    // Same inputs, same outputs: repeated invocation over the same pair
    // must not differ (strategies carry no mutable state).
    let config = PatternConfig::default();
    let strategies = strategy::registry(None);
    let orders = table("orders", &[("customer_id", "INT64")]);
    let customers = table("customers", &[("id", "INT64")]);

    let first = detect_all(&strategies, &orders, &customers, &config);
    let second = detect_all(&strategies, &orders, &customers, &config);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_column_with_multiple_candidate_targets() {
    let config = PatternConfig::default();
    let strategies = strategy::registry(None);

    // account_id can resolve to both `accounts` and `dim_account`;
    // strategies emit both, resolution is the aggregator's job.
    let ledger = table("ledger", &[("account_id", "INT64")]);
    let accounts = table("accounts", &[("id", "INT64")]);
    let dim_account = table("dim_account", &[("account_id", "INT64")]);

    let to_accounts = detect_all(&strategies, &ledger, &accounts, &config);
    let to_dim = detect_all(&strategies, &ledger, &dim_account, &config);
    assert!(!to_accounts.is_empty());
    assert!(!to_dim.is_empty());
    assert_ne!(
        to_accounts[0].target_table, to_dim[0].target_table,
        "distinct candidate targets for one column"
    );
}

#[test]
fn test_custom_rules_run_alongside_automatic_strategies() {
    let rules = CustomRules::from_toml_str(
        r#"
[[relationships]]
source_table = "orders"
source_column = "customer_id"
target_table = "customers"
target_column = "id"
cardinality = "many_to_one"
confidence = 0.99
"#,
    )
    .unwrap();
    let config = PatternConfig::default();
    let strategies = strategy::registry(Some(rules));

    let orders = table("orders", &[("customer_id", "INT64")]);
    let customers = table("customers", &[("id", "INT64")]);

    let found = detect_all(&strategies, &orders, &customers, &config);
    assert!(found.iter().any(|r| r.method == DetectionMethod::CustomRule && r.custom));
    assert!(found.iter().any(|r| r.method == DetectionMethod::ExactName));
}

#[test]
fn test_no_candidates_for_unrelated_tables() {
    let config = PatternConfig::default();
    let strategies = strategy::registry(None);

    let logs = table("event_logs", &[("payload", "STRING"), ("ts", "TIMESTAMP")]);
    let users = table("users", &[("id", "INT64"), ("email", "STRING")]);

    assert!(detect_all(&strategies, &logs, &users, &config).is_empty());
}
