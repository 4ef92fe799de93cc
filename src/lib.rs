//! # Relhound
//!
//! A relationship inference engine for warehouse schemas that lack
//! explicit foreign-key constraints. Given a snapshot of table schemas,
//! it produces a ranked, de-duplicated set of inferred relationships
//! with confidence scores: the raw material for an entity-relationship
//! diagram.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Schema Source (external collaborator)         │
//! │        table schemas + bounded column samples            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [state: fingerprint tracker]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Changed-table set (incremental filtering)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine: parallel coordinator]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Batches × table pairs → strategies (+ data validator)  │
//! │            consulting/populating the cache               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [aggregate]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Final relationship set (deterministic, capped)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Diagram rendering, output formats and the command surface are
//! external collaborators; this crate ends at the relationship set.
//!
//! ## Example
//!
//! ```no_run
//! use relhound::prelude::*;
//!
//! # async fn run() -> Result<(), relhound::engine::EngineError> {
//! let config = PatternConfig::default();
//! let engine = DetectionEngine::new(config);
//!
//! let tables: Vec<TableSchema> = vec![/* from the schema source */];
//! let report = engine.detect(&tables).await?;
//! for rel in &report.relationships {
//!     println!(
//!         "{}.{} -> {}.{} ({}, {:.2})",
//!         rel.source_table, rel.source_column,
//!         rel.target_table, rel.target_column,
//!         rel.cardinality, rel.confidence,
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod engine;
pub mod model;
pub mod state;
pub mod strategy;
pub mod validate;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{PairVerdict, RelationshipCache};
    pub use crate::config::{CustomRules, PatternConfig};
    pub use crate::engine::{DetectionEngine, DetectionReport, DetectionStats};
    pub use crate::model::{
        Cardinality, ColumnInfo, ColumnMode, ColumnType, DetectionMethod, Relationship,
        TableKind, TableSchema,
    };
    pub use crate::state::ChangeTracker;
    pub use crate::validate::{SchemaSource, ValidateError};
}

pub use engine::{DetectionEngine, DetectionReport};
pub use model::{Relationship, TableSchema};
