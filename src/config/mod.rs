//! Configuration documents: naming-pattern families and user-supplied
//! custom relationship rules.
//!
//! Both documents are TOML, parsed once at startup; malformed documents
//! are fatal before any detection starts.

mod custom;
mod patterns;

pub use custom::{CustomRules, ExplicitRule, NamingPatternRule};
pub use patterns::{
    ColumnPatternSettings, ConfigError, DataTestingSettings, FilteringSettings, PatternConfig,
    PerformanceSettings, StrategyWeights, TablePattern,
};
