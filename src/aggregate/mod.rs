//! Aggregation and conflict resolution.
//!
//! Merges the multiset of candidates from all strategies, sources and
//! batches into the final relationship set. Aggregation is commutative
//! over candidate sets: batch completion order never changes the output.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::FilteringSettings;
use crate::model::{EdgeKey, Relationship};

/// Resolve candidates into the final, deterministic relationship set.
///
/// Steps, in order: group by undirected edge; custom exact-rule
/// candidates win their group outright; otherwise highest confidence
/// wins with method-priority and lexical tie-breaks; edges below the
/// minimum confidence are dropped; each source table keeps at most the
/// configured number of outgoing edges, highest-confidence first.
pub fn resolve(candidates: Vec<Relationship>, filtering: &FilteringSettings) -> Vec<Relationship> {
    // BTreeMap keyed by the canonical edge gives deterministic grouping
    let mut groups: BTreeMap<EdgeKey, Vec<Relationship>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.edge_key()).or_default().push(candidate);
    }

    let mut winners: Vec<Relationship> = Vec::with_capacity(groups.len());
    for (_, mut group) in groups {
        let has_custom = group.iter().any(|r| r.custom);
        if has_custom {
            group.retain(|r| r.custom);
        }
        group.sort_by(candidate_order);
        if let Some(winner) = group.into_iter().next() {
            if winner.confidence >= filtering.min_confidence {
                winners.push(winner);
            }
        }
    }

    // Fan-out cap per source table: favor precision over recall when a
    // table claims implausibly many outgoing edges.
    let mut by_source: BTreeMap<String, Vec<Relationship>> = BTreeMap::new();
    for winner in winners {
        by_source
            .entry(winner.source_table.to_lowercase())
            .or_default()
            .push(winner);
    }

    let mut resolved = Vec::new();
    for (_, mut rels) in by_source {
        rels.sort_by(candidate_order);
        rels.truncate(filtering.max_relationships_per_table);
        resolved.extend(rels);
    }

    resolved.sort_by(|a, b| lexical(a).cmp(&lexical(b)));
    resolved
}

/// Candidate preference: confidence descending, then strategy priority,
/// then lexicographically earliest endpoints for determinism.
fn candidate_order(a: &Relationship, b: &Relationship) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.method.priority().cmp(&b.method.priority()))
        .then_with(|| lexical(a).cmp(&lexical(b)))
}

fn lexical(r: &Relationship) -> (String, String, String, String) {
    (
        r.source_table.to_lowercase(),
        r.source_column.to_lowercase(),
        r.target_table.to_lowercase(),
        r.target_column.to_lowercase(),
    )
}
