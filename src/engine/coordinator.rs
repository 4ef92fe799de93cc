//! Workload partitioning for the parallel coordinator.
//!
//! Tables are optionally grouped by inferred structural kind
//! (hub/link/satellite/dimension/fact/...) so structurally similar
//! tables land in the same batches, then split to the configured batch
//! size.

use std::collections::BTreeMap;

use crate::config::PatternConfig;
use crate::model::TableSchema;

/// Partition the processing set into batches.
pub(crate) fn partition(tables: Vec<TableSchema>, config: &PatternConfig) -> Vec<Vec<TableSchema>> {
    let batch_size = config.performance.batch_size.max(1);

    let groups: Vec<Vec<TableSchema>> = if config.performance.group_tables_by_kind {
        let mut by_kind: BTreeMap<String, Vec<TableSchema>> = BTreeMap::new();
        for table in tables {
            let label = config.table_kind_label(&table.name).to_string();
            by_kind.entry(label).or_default().push(table);
        }
        by_kind.into_values().collect()
    } else {
        // Without kind grouping, order by width so batches hold tables
        // of comparable cost.
        let mut sorted = tables;
        sorted.sort_by(|a, b| {
            a.columns
                .len()
                .cmp(&b.columns.len())
                .then_with(|| a.name.cmp(&b.name))
        });
        vec![sorted]
    };

    let mut batches = Vec::new();
    for group in groups {
        for chunk in group.chunks(batch_size) {
            batches.push(chunk.to_vec());
        }
    }
    batches
}
