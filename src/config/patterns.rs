//! Pattern configuration for relationship detection.
//!
//! Loaded once from a TOML document (or built-in defaults) and read-only
//! afterward. Wildcard indicator patterns (`*_hk`) are compiled to
//! anchored regexes at load time so lookups during detection are cheap.
//!
//! Example configuration:
//! ```toml
//! [columns]
//! primary_key_indicators = ["id", "key", "pk", "*_pk", "*_hk"]
//! foreign_key_suffixes = ["_id", "_key", "_fk", "_hk", "_hash_key"]
//!
//! [table_patterns.data_vault.hub]
//! prefix = "h_"
//! primary_key_patterns = ["*_hk", "*_hash_key"]
//!
//! [strategies]
//! exact_name = 0.95
//! data_vault = 0.9
//!
//! [filtering]
//! min_confidence = 0.3
//! max_relationships_per_table = 5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::TableSchema;

/// Error type for configuration loading. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}

/// A set of column-name indicator patterns, split into exact names and
/// compiled wildcard regexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndicatorSet {
    exact: Vec<String>,
    wildcards: Vec<Regex>,
}

impl IndicatorSet {
    fn compile(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut set = Self::default();
        for pattern in patterns {
            let lower = pattern.to_lowercase();
            if lower.contains('*') {
                let escaped = regex::escape(&lower).replace(r"\*", ".*");
                let re = Regex::new(&format!("^{escaped}$")).map_err(|source| {
                    ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                set.wildcards.push(re);
            } else {
                set.exact.push(lower);
            }
        }
        Ok(set)
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.exact.iter().any(|e| *e == lower) || self.wildcards.iter().any(|re| re.is_match(&lower))
    }
}

/// A table naming pattern within a methodology family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePattern {
    /// Table-name prefix identifying this pattern (e.g. `h_`, `dim_`).
    pub prefix: String,

    /// Human-readable description.
    pub description: String,

    /// Column patterns identifying primary keys in tables of this kind.
    pub primary_key_patterns: Vec<String>,

    /// Column patterns identifying foreign keys in tables of this kind.
    pub foreign_key_patterns: Vec<String>,

    #[serde(skip)]
    pk_set: IndicatorSet,

    #[serde(skip)]
    fk_set: IndicatorSet,
}

impl Default for TablePattern {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            description: String::new(),
            primary_key_patterns: Vec::new(),
            foreign_key_patterns: Vec::new(),
            pk_set: IndicatorSet::default(),
            fk_set: IndicatorSet::default(),
        }
    }
}

impl TablePattern {
    fn new(prefix: &str, description: &str, pk: &[&str], fk: &[&str]) -> Self {
        Self {
            prefix: prefix.to_string(),
            description: description.to_string(),
            primary_key_patterns: pk.iter().map(|s| s.to_string()).collect(),
            foreign_key_patterns: fk.iter().map(|s| s.to_string()).collect(),
            pk_set: IndicatorSet::default(),
            fk_set: IndicatorSet::default(),
        }
    }
}

/// Global column-name indicator lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnPatternSettings {
    /// Column names (or wildcard patterns) that look like primary keys.
    pub primary_key_indicators: Vec<String>,

    /// Suffixes that mark a column as a foreign-key candidate.
    pub foreign_key_suffixes: Vec<String>,
}

impl Default for ColumnPatternSettings {
    fn default() -> Self {
        Self {
            primary_key_indicators: [
                "id", "key", "pk", "uuid", "guid", "*_pk", "*_hk", "*_hash_key",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            foreign_key_suffixes: ["_id", "_key", "_fk", "_hk", "_hash_key", "_sk", "_bk"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Per-strategy base confidence weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeights {
    pub exact_name: f64,
    pub naming_convention: f64,
    pub data_vault: f64,
    pub type_compatibility: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            exact_name: 0.95,
            naming_convention: 0.85,
            data_vault: 0.9,
            type_compatibility: 0.5,
        }
    }
}

/// Parameters for data-based relationship validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTestingSettings {
    /// Whether to validate candidates against sampled data.
    pub enabled: bool,

    /// Base number of values to sample per column.
    pub sample_size: usize,

    /// Maximum tolerated percentage of orphaned source values.
    pub max_orphan_percentage: f64,

    /// Minimum overall score for a validation to pass.
    pub confidence_threshold: f64,

    /// Statistical confidence level for adaptive sampling (e.g. 0.95).
    /// When set, borderline candidates get a larger, Cochran-sized sample.
    pub target_confidence: Option<f64>,

    /// Per-sample-fetch timeout in seconds. A timed-out fetch is a
    /// validator failure, not a batch failure.
    pub sample_timeout_secs: u64,

    /// Confidence bonus granted on a passed validation.
    pub validation_bonus: f64,

    /// Multiplier applied to confidence on a failed validation. The
    /// default lands failed candidates below the min-confidence filter.
    pub failure_factor: f64,
}

impl Default for DataTestingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_size: 1000,
            max_orphan_percentage: 5.0,
            confidence_threshold: 0.7,
            target_confidence: None,
            sample_timeout_secs: 30,
            validation_bonus: 0.2,
            failure_factor: 0.25,
        }
    }
}

/// Parallelism, caching and incremental-processing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Whether to fan batches out over worker tasks.
    pub parallel: bool,

    /// Maximum concurrently running batch workers.
    pub max_workers: usize,

    /// Number of tables per batch.
    pub batch_size: usize,

    /// Per-batch timeout in seconds; a batch exceeding it is abandoned.
    pub batch_timeout_secs: u64,

    /// Group structurally similar tables (hub/dimension/fact/...) into
    /// the same batches before splitting.
    pub group_tables_by_kind: bool,

    /// Whether to consult and populate the relationship cache.
    pub cache_enabled: bool,

    /// Cache entry time-to-live in seconds.
    pub cache_ttl_secs: u64,

    /// Whether to skip unchanged tables via the incremental tracker.
    pub incremental: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: 4,
            batch_size: 10,
            batch_timeout_secs: 300,
            group_tables_by_kind: true,
            cache_enabled: true,
            cache_ttl_secs: 86_400,
            incremental: true,
        }
    }
}

/// Global filtering policy applied by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringSettings {
    /// Relationships below this confidence are dropped.
    pub min_confidence: f64,

    /// Maximum outgoing edges kept per source table.
    pub max_relationships_per_table: usize,
}

impl Default for FilteringSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_relationships_per_table: 5,
        }
    }
}

/// Root pattern configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Methodology -> pattern name -> table pattern. `BTreeMap` keeps
    /// iteration order deterministic.
    pub table_patterns: BTreeMap<String, BTreeMap<String, TablePattern>>,

    pub columns: ColumnPatternSettings,

    pub strategies: StrategyWeights,

    pub data_testing: DataTestingSettings,

    pub performance: PerformanceSettings,

    pub filtering: FilteringSettings,

    #[serde(skip)]
    pk_indicators: IndicatorSet,

    /// FK suffixes sorted longest-first so `_hash_key` wins over `_key`.
    #[serde(skip)]
    fk_suffixes: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        let mut data_vault = BTreeMap::new();
        data_vault.insert(
            "hub".to_string(),
            TablePattern::new("h_", "Data-vault hub", &["*_hk", "*_hash_key"], &[]),
        );
        data_vault.insert(
            "link".to_string(),
            TablePattern::new(
                "l_",
                "Data-vault link",
                &["*_hk", "*_hash_key"],
                &["*_hk", "*_hash_key"],
            ),
        );
        data_vault.insert(
            "satellite".to_string(),
            TablePattern::new(
                "s_",
                "Data-vault satellite",
                &["*_hk", "*_hash_key"],
                &["*_hk", "*_hash_key"],
            ),
        );
        data_vault.insert(
            "reference".to_string(),
            TablePattern::new("ref_", "Data-vault reference", &["id", "key", "*_id", "*_key"], &[]),
        );

        let mut dimensional = BTreeMap::new();
        dimensional.insert(
            "dimension".to_string(),
            TablePattern::new("dim_", "Dimension table", &["id", "*_key", "*_id", "*_sk"], &[]),
        );
        dimensional.insert(
            "fact".to_string(),
            TablePattern::new("fact_", "Fact table", &[], &["*_key", "*_id", "*_sk"]),
        );
        dimensional.insert(
            "bridge".to_string(),
            TablePattern::new("bridge_", "Bridge table", &[], &["*_key", "*_id"]),
        );

        let mut table_patterns = BTreeMap::new();
        table_patterns.insert("data_vault".to_string(), data_vault);
        table_patterns.insert("dimensional".to_string(), dimensional);

        let mut config = Self {
            table_patterns,
            columns: ColumnPatternSettings::default(),
            strategies: StrategyWeights::default(),
            data_testing: DataTestingSettings::default(),
            performance: PerformanceSettings::default(),
            filtering: FilteringSettings::default(),
            pk_indicators: IndicatorSet::default(),
            fk_suffixes: Vec::new(),
        };
        config
            .compile()
            .expect("built-in pattern set is valid");
        config
    }
}

impl PatternConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.compile()?;
        Ok(config)
    }

    /// Load configuration from an explicit path, `./relhound.toml`, or
    /// built-in defaults, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let local = PathBuf::from("relhound.toml");
        if local.exists() {
            return Self::from_file(&local);
        }
        Ok(Self::default())
    }

    /// Compile wildcard indicators; fatal on an invalid pattern.
    fn compile(&mut self) -> Result<(), ConfigError> {
        self.pk_indicators = IndicatorSet::compile(&self.columns.primary_key_indicators)?;

        self.fk_suffixes = self
            .columns
            .foreign_key_suffixes
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        self.fk_suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        for patterns in self.table_patterns.values_mut() {
            for pattern in patterns.values_mut() {
                pattern.pk_set = IndicatorSet::compile(&pattern.primary_key_patterns)?;
                pattern.fk_set = IndicatorSet::compile(&pattern.foreign_key_patterns)?;
            }
        }
        Ok(())
    }

    /// All table patterns whose prefix matches the given table name.
    pub fn patterns_for_table(&self, table_name: &str) -> Vec<(&str, &str, &TablePattern)> {
        let lower = table_name.to_lowercase();
        let mut matches = Vec::new();
        for (methodology, patterns) in &self.table_patterns {
            for (name, pattern) in patterns {
                if !pattern.prefix.is_empty() && lower.starts_with(&pattern.prefix) {
                    matches.push((methodology.as_str(), name.as_str(), pattern));
                }
            }
        }
        matches
    }

    /// Whether a column looks like a primary key, globally or under the
    /// table's matching pattern families.
    pub fn is_primary_key_indicator(&self, column_name: &str, table_name: &str) -> bool {
        if self.pk_indicators.matches(column_name) {
            return true;
        }
        self.patterns_for_table(table_name)
            .iter()
            .any(|(_, _, p)| p.pk_set.matches(column_name))
    }

    /// Whether a column is a foreign-key candidate.
    pub fn is_foreign_key_candidate(&self, column_name: &str, table_name: &str) -> bool {
        let lower = column_name.to_lowercase();
        if self.fk_suffixes.iter().any(|s| lower.ends_with(s.as_str())) {
            return true;
        }
        self.patterns_for_table(table_name)
            .iter()
            .any(|(_, _, p)| p.fk_set.matches(column_name))
    }

    /// Strip the longest matching FK suffix, returning the stem and the
    /// suffix removed (in canonical lowercase form).
    pub fn strip_fk_suffix(&self, column_name: &str) -> Option<(String, &str)> {
        let lower = column_name.to_lowercase();
        for suffix in &self.fk_suffixes {
            if let Some(stem) = lower.strip_suffix(suffix.as_str()) {
                if !stem.is_empty() {
                    return Some((stem.to_string(), suffix.as_str()));
                }
            }
        }
        None
    }

    /// First primary-key-shaped column of a table, in ordinal order.
    /// Repeated columns never qualify.
    pub fn primary_key_column<'a>(&self, table: &'a TableSchema) -> Option<&'a crate::model::ColumnInfo> {
        table
            .columns
            .iter()
            .filter(|c| c.mode != crate::model::ColumnMode::Repeated)
            .find(|c| self.is_primary_key_indicator(&c.name, &table.name))
    }

    /// Structural label for a table (`hub`, `dimension`, `fact`, ...)
    /// used by the coordinator to group similar tables together.
    pub fn table_kind_label(&self, table_name: &str) -> &str {
        self.patterns_for_table(table_name)
            .first()
            .map(|(_, name, _)| *name)
            .unwrap_or("other")
    }

    /// All configured table-pattern prefixes, longest first.
    pub fn table_prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self
            .table_patterns
            .values()
            .flat_map(|p| p.values())
            .map(|p| p.prefix.as_str())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        prefixes.dedup();
        prefixes
    }
}
