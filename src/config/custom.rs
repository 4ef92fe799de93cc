//! User-supplied custom relationship rules.
//!
//! Two rule shapes, mirroring the custom-rules document:
//! explicit (table, column) pairs emitted verbatim, and regex naming
//! patterns that derive a target table from a column name.
//!
//! ```toml
//! [[relationships]]
//! source_table = "orders"
//! source_column = "customer_id"
//! target_table = "clients"
//! target_column = "id"
//! cardinality = "many_to_one"
//! confidence = 0.99
//!
//! [[naming_patterns]]
//! pattern = "^(.+)_ref$"
//! target_suffix = "s"
//! confidence = 0.8
//! ```

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::patterns::ConfigError;
use crate::model::Cardinality;

fn default_rule_confidence() -> f64 {
    0.9
}

fn default_pattern_confidence() -> f64 {
    0.8
}

/// An explicit user-declared relationship. Included verbatim and wins
/// conflict resolution for its edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitRule {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub cardinality: Cardinality,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f64,
}

/// A regex-driven naming rule: `pattern` captures a stem from a column
/// name, and `stem + target_suffix` names the target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingPatternRule {
    /// Regex matched against column names; the first capture group is
    /// the stem.
    pub pattern: String,

    /// Suffix appended to the stem to form the target table name.
    #[serde(default)]
    pub target_suffix: String,

    #[serde(default = "default_pattern_confidence")]
    pub confidence: f64,

    #[serde(skip)]
    compiled: Option<Regex>,
}

impl NamingPatternRule {
    pub fn new(
        pattern: impl Into<String>,
        target_suffix: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, ConfigError> {
        let mut rule = Self {
            pattern: pattern.into(),
            target_suffix: target_suffix.into(),
            confidence,
            compiled: None,
        };
        rule.compile()?;
        Ok(rule)
    }

    fn compile(&mut self) -> Result<(), ConfigError> {
        let re = Regex::new(&self.pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: self.pattern.clone(),
            source,
        })?;
        self.compiled = Some(re);
        Ok(())
    }

    /// The compiled regex; present after a successful load.
    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref()
    }
}

/// The custom-rules document, parsed once and merged into the
/// custom-rule strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomRules {
    pub relationships: Vec<ExplicitRule>,
    pub naming_patterns: Vec<NamingPatternRule>,
}

impl CustomRules {
    /// Load custom rules from a TOML file. Malformed documents and
    /// invalid regexes are fatal.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse custom rules from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut rules: Self = toml::from_str(content)?;
        rules.validate_and_compile()?;
        Ok(rules)
    }

    fn validate_and_compile(&mut self) -> Result<(), ConfigError> {
        for rule in &self.relationships {
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(ConfigError::InvalidRule(format!(
                    "confidence {} out of range for {}.{} -> {}.{}",
                    rule.confidence,
                    rule.source_table,
                    rule.source_column,
                    rule.target_table,
                    rule.target_column
                )));
            }
        }
        for rule in &mut self.naming_patterns {
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(ConfigError::InvalidRule(format!(
                    "confidence {} out of range for pattern '{}'",
                    rule.confidence, rule.pattern
                )));
            }
            rule.compile()?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty() && self.naming_patterns.is_empty()
    }
}
