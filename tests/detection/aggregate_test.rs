use relhound::aggregate::resolve;
use relhound::config::FilteringSettings;
use relhound::model::{Cardinality, DetectionMethod, Relationship};

fn rel(
    source: &str,
    source_col: &str,
    target: &str,
    target_col: &str,
    confidence: f64,
    method: DetectionMethod,
) -> Relationship {
    Relationship::new(
        source,
        source_col,
        target,
        target_col,
        Cardinality::ManyToOne,
        confidence,
        method,
    )
}

#[test]
fn test_exact_dominates_type_compat_regardless_of_order() {
    let exact = rel("orders", "customer_id", "customers", "id", 0.95, DetectionMethod::ExactName);
    let fallback = rel(
        "orders",
        "customer_id",
        "customers",
        "id",
        0.5,
        DetectionMethod::TypeCompatibility,
    );

    for candidates in [
        vec![exact.clone(), fallback.clone()],
        vec![fallback.clone(), exact.clone()],
    ] {
        let resolved = resolve(candidates, &FilteringSettings::default());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].method, DetectionMethod::ExactName);
    }
}

#[test]
fn test_custom_dominates_everything_regardless_of_order() {
    let mut custom = rel("orders", "customer_id", "customers", "id", 0.4, DetectionMethod::CustomRule);
    custom.custom = true;
    let exact = rel("orders", "customer_id", "customers", "id", 0.95, DetectionMethod::ExactName);

    for candidates in [
        vec![custom.clone(), exact.clone()],
        vec![exact.clone(), custom.clone()],
    ] {
        let resolved = resolve(candidates, &FilteringSettings::default());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].method, DetectionMethod::CustomRule);
        assert_eq!(resolved[0].confidence, 0.4);
    }
}

#[test]
fn test_commutative_over_batch_concatenation_order() {
    // Candidates as three "batches" concatenated in every order must
    // resolve identically.
    let batch_a = vec![
        rel("fact_sales", "customer_key", "dim_customer", "customer_key", 0.85, DetectionMethod::NamingConvention),
        rel("orders", "customer_id", "customers", "id", 0.95, DetectionMethod::ExactName),
    ];
    let batch_b = vec![
        rel("orders", "customer_id", "customers", "id", 0.5, DetectionMethod::TypeCompatibility),
        rel("s_customer", "customer_hk", "h_customer", "customer_hk", 0.9, DetectionMethod::DataVaultPattern),
    ];
    let batch_c = vec![rel(
        "fact_sales",
        "product_key",
        "dim_product",
        "product_key",
        0.85,
        DetectionMethod::NamingConvention,
    )];

    let arrangements = [
        vec![&batch_a, &batch_b, &batch_c],
        vec![&batch_c, &batch_a, &batch_b],
        vec![&batch_b, &batch_c, &batch_a],
    ];

    let mut results = Vec::new();
    for arrangement in arrangements {
        let merged: Vec<Relationship> = arrangement.into_iter().flatten().cloned().collect();
        results.push(resolve(merged, &FilteringSettings::default()));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
    assert_eq!(results[0].len(), 4);
}

#[test]
fn test_equal_confidence_priority_chain() {
    // exact-name > naming-convention > data-vault-pattern > type-compat
    let methods = [
        DetectionMethod::TypeCompatibility,
        DetectionMethod::DataVaultPattern,
        DetectionMethod::NamingConvention,
        DetectionMethod::ExactName,
    ];
    let candidates: Vec<Relationship> = methods
        .iter()
        .map(|m| rel("a", "b_id", "b", "id", 0.8, *m))
        .collect();

    let resolved = resolve(candidates, &FilteringSettings::default());
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].method, DetectionMethod::ExactName);
}

#[test]
fn test_cap_keeps_highest_confidence() {
    let filtering = FilteringSettings {
        min_confidence: 0.3,
        max_relationships_per_table: 1,
    };
    let resolved = resolve(
        vec![
            rel("fact", "a_key", "dim_a", "a_key", 0.85, DetectionMethod::NamingConvention),
            rel("fact", "b_id", "bs", "id", 0.95, DetectionMethod::ExactName),
        ],
        &filtering,
    );
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].target_table, "bs");
}

#[test]
fn test_cap_does_not_leak_across_tables() {
    let filtering = FilteringSettings {
        min_confidence: 0.3,
        max_relationships_per_table: 1,
    };
    let resolved = resolve(
        vec![
            rel("orders", "customer_id", "customers", "id", 0.95, DetectionMethod::ExactName),
            rel("invoices", "customer_id", "customers", "id", 0.95, DetectionMethod::ExactName),
        ],
        &filtering,
    );
    // One edge per source table; the cap is per-table, not global
    assert_eq!(resolved.len(), 2);
}

#[test]
fn test_empty_input() {
    assert!(resolve(Vec::new(), &FilteringSettings::default()).is_empty());
}
