//! Core data model for relationship detection.
//!
//! Schema snapshots (`TableSchema`, `ColumnInfo`) are immutable for the
//! duration of one detection run. `Relationship` values are produced by
//! strategies, may be promoted into the cache across runs, and form the
//! final output of a run.

use serde::{Deserialize, Serialize};

/// Semantic column type, normalized from warehouse-specific type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Numeric,
    String,
    Boolean,
    Timestamp,
    Date,
    Bytes,
    Record,
    Json,
    Unknown,
}

impl ColumnType {
    /// Parse a declared type string (e.g. `INT64`, `STRING`, `TIMESTAMP`).
    pub fn parse(declared: &str) -> Self {
        // Strip parameterized lengths like VARCHAR(255) or NUMERIC(10, 2)
        let base = declared
            .split('(')
            .next()
            .unwrap_or(declared)
            .trim()
            .to_ascii_uppercase();

        match base.as_str() {
            "INT" | "INT64" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT" | "BYTEINT" => {
                Self::Integer
            }
            "FLOAT" | "FLOAT64" | "DOUBLE" | "REAL" => Self::Float,
            "NUMERIC" | "BIGNUMERIC" | "DECIMAL" => Self::Numeric,
            "STRING" | "VARCHAR" | "NVARCHAR" | "TEXT" | "CHAR" => Self::String,
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "TIMESTAMP" | "DATETIME" | "TIME" => Self::Timestamp,
            "DATE" => Self::Date,
            "BYTES" | "BINARY" | "VARBINARY" => Self::Bytes,
            "RECORD" | "STRUCT" => Self::Record,
            "JSON" => Self::Json,
            _ => Self::Unknown,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Numeric)
    }

    /// Whether a join between columns of these types is plausible.
    ///
    /// Exact matches and widening pairs (integer↔float/numeric,
    /// timestamp↔date) are compatible; everything else is not.
    pub fn is_compatible_with(self, other: Self) -> bool {
        if self == other {
            return self != Self::Unknown;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        matches!(
            (self, other),
            (Self::Timestamp, Self::Date) | (Self::Date, Self::Timestamp)
        )
    }

    /// Tiered compatibility score used by the type-compatibility strategy
    /// and the data validator.
    pub fn compatibility_score(self, other: Self) -> f64 {
        if self == other && self != Self::Unknown {
            1.0
        } else if matches!(
            (self, other),
            (Self::Integer, Self::Float)
                | (Self::Float, Self::Integer)
                | (Self::Timestamp, Self::Date)
                | (Self::Date, Self::Timestamp)
        ) {
            0.8
        } else if self.is_numeric() && other.is_numeric() {
            0.6
        } else {
            0.2
        }
    }
}

/// Column mode, following the BigQuery convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl ColumnMode {
    /// Parse a mode string; unrecognized values fall back to `Nullable`.
    pub fn parse(mode: &str) -> Self {
        match mode.to_ascii_uppercase().as_str() {
            "REQUIRED" => Self::Required,
            "REPEATED" => Self::Repeated,
            _ => Self::Nullable,
        }
    }

    pub fn is_nullable(self) -> bool {
        matches!(self, Self::Nullable)
    }
}

/// A column as read from the schema source. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name, unique within its table.
    pub name: String,
    /// Normalized semantic type.
    pub column_type: ColumnType,
    /// Declared type string as reported by the warehouse.
    pub declared_type: String,
    /// Column mode (nullable / required / repeated).
    pub mode: ColumnMode,
    /// Ordinal position within the table.
    pub position: usize,
}

impl ColumnInfo {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        mode: ColumnMode,
        position: usize,
    ) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::parse(&declared_type),
            declared_type,
            mode,
            position,
        }
    }
}

/// Kind of table in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableKind {
    #[default]
    Base,
    View,
    External,
}

impl TableKind {
    pub fn parse(kind: &str) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "VIEW" => Self::View,
            "EXTERNAL" => Self::External,
            _ => Self::Base,
        }
    }
}

/// Immutable snapshot of one table's schema for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, unique within the detection run.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Base table, view, or external table.
    #[serde(default)]
    pub kind: TableKind,
    /// Row-count hint, if the source reported one.
    #[serde(default)]
    pub num_rows: Option<u64>,
    /// Size hint in bytes, if the source reported one.
    #[serde(default)]
    pub num_bytes: Option<u64>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            kind: TableKind::Base,
            num_rows: None,
            num_bytes: None,
        }
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Cardinality of a relationship between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Reverse the cardinality (swap source/target sides).
    pub fn reverse(self) -> Self {
        match self {
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
            other => other,
        }
    }

    /// Determine cardinality from uniqueness of each side.
    pub fn from_uniqueness(source_unique: bool, target_unique: bool) -> Self {
        match (source_unique, target_unique) {
            (true, true) => Self::OneToOne,
            (true, false) => Self::OneToMany,
            (false, true) => Self::ManyToOne,
            (false, false) => Self::ManyToMany,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneToOne => write!(f, "1:1"),
            Self::OneToMany => write!(f, "1:N"),
            Self::ManyToOne => write!(f, "N:1"),
            Self::ManyToMany => write!(f, "N:N"),
        }
    }
}

/// Which strategy produced a candidate relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    CustomRule,
    ExactName,
    NamingConvention,
    DataVaultPattern,
    CustomNamingPattern,
    TypeCompatibility,
}

impl DetectionMethod {
    /// Stable string tag for serialization and display.
    pub fn tag(self) -> &'static str {
        match self {
            Self::CustomRule => "custom-rule",
            Self::ExactName => "exact-name",
            Self::NamingConvention => "naming-convention",
            Self::DataVaultPattern => "data-vault-pattern",
            Self::CustomNamingPattern => "custom-naming-pattern",
            Self::TypeCompatibility => "type-compatibility",
        }
    }

    /// Priority rank for conflict resolution; lower wins ties.
    pub fn priority(self) -> u8 {
        match self {
            Self::CustomRule => 0,
            Self::ExactName => 1,
            Self::NamingConvention => 2,
            Self::DataVaultPattern => 3,
            Self::CustomNamingPattern => 4,
            Self::TypeCompatibility => 5,
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Evidence attached to a relationship when the data validator ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvidence {
    /// Fraction of sampled source values found among target values.
    pub referential_integrity: f64,
    /// Type-compatibility score against real declared types.
    pub type_compatibility: f64,
    /// Coarse distribution similarity between the two samples.
    pub distribution_similarity: f64,
    /// Weighted overall score.
    pub overall: f64,
    /// Number of source values sampled.
    pub sample_size: usize,
    /// Sampled source values not found in the target sample.
    pub orphan_count: usize,
    /// Whether the validation passed its thresholds.
    pub passed: bool,
}

/// A detected (or candidate) relationship between two columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub cardinality: Cardinality,
    /// Detection certainty in [0, 1].
    pub confidence: f64,
    pub method: DetectionMethod,
    /// True for user-declared exact-pair rules, which win conflict
    /// resolution outright.
    #[serde(default)]
    pub custom: bool,
    /// Present when the data validator examined this relationship.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<ValidationEvidence>,
}

impl Relationship {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
        cardinality: Cardinality,
        confidence: f64,
        method: DetectionMethod,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            cardinality,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            custom: false,
            evidence: None,
        }
    }

    /// Undirected edge identity of this relationship.
    pub fn edge_key(&self) -> EdgeKey {
        EdgeKey::new(
            &self.source_table,
            &self.source_column,
            &self.target_table,
            &self.target_column,
        )
    }

    /// Unordered table-pair identity of this relationship.
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.source_table, &self.target_table)
    }
}

/// Canonical undirected edge identity.
///
/// Two relationships are the same edge when their (table, column)
/// endpoint sets match, regardless of which side is labelled source.
/// Names are lowercased for case-insensitive comparison.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct EdgeKey {
    lo: (String, String),
    hi: (String, String),
}

impl EdgeKey {
    pub fn new(
        source_table: &str,
        source_column: &str,
        target_table: &str,
        target_column: &str,
    ) -> Self {
        let a = (source_table.to_lowercase(), source_column.to_lowercase());
        let b = (target_table.to_lowercase(), target_column.to_lowercase());
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }
}

/// Canonical unordered table-pair identity used for cache keys and the
/// coordinator's claim set.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(table_a: &str, table_b: &str) -> Self {
        let a = table_a.to_lowercase();
        let b = table_b.to_lowercase();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Key string for the persisted store.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }

    /// Whether this pair touches the given table.
    pub fn contains(&self, table: &str) -> bool {
        let t = table.to_lowercase();
        self.first == t || self.second == t
    }

    pub fn tables(&self) -> (&str, &str) {
        (self.first.as_str(), self.second.as_str())
    }
}
