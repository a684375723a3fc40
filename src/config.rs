//! Configuration system.
//!
//! Hierarchical loading via figment:
//! - `noetic.toml` (defaults)
//! - `noetic.local.toml` (git-ignored local overrides)
//! - Environment variables (`NOETIC_*` prefix, `__` for nesting)
//!
//! ## Example
//!
//! ```toml
//! # noetic.toml
//! [vector]
//! geometry = 2048
//!
//! [query]
//! max_holes = 4
//! similarity_threshold = 0.35
//! hdc_strategy = "exact"
//!
//! [limits]
//! deadline_ms = 5000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! NOETIC_VECTOR__GEOMETRY=4096
//! NOETIC_QUERY__HDC_STRATEGY=approximate
//! ```

use crate::error::EngineError;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Permitted vector dimensions.
pub const VALID_GEOMETRIES: [usize; 4] = [512, 1024, 2048, 4096];

/// Similarity strategy for the vector source and soft negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdcStrategy {
    /// Deterministic: exhaustive vector scans, no soft negation.
    Exact,
    /// ANN-indexed search plus similarity-based negation matching.
    Approximate,
}

impl Default for HdcStrategy {
    fn default() -> Self {
        HdcStrategy::Exact
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vector substrate options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Vector dimension; one of 512, 1024, 2048, 4096.
    #[serde(default = "default_geometry")]
    pub geometry: usize,
}

fn default_geometry() -> usize {
    2048
}

impl Default for VectorConfig {
    fn default() -> Self {
        VectorConfig {
            geometry: default_geometry(),
        }
    }
}

/// Query pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum holes per query.
    #[serde(default = "default_max_holes")]
    pub max_holes: usize,

    /// Similarity floor for vector-search bindings.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default)]
    pub hdc_strategy: HdcStrategy,

    /// Canonicalise symmetric-relation argument order on add and lookup.
    #[serde(default)]
    pub canonicalization_enabled: bool,
}

fn default_max_holes() -> usize {
    4
}

fn default_similarity_threshold() -> f32 {
    0.35
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            max_holes: default_max_holes(),
            similarity_threshold: default_similarity_threshold(),
            hdc_strategy: HdcStrategy::default(),
            canonicalization_enabled: false,
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-query deadline in milliseconds (0 = unlimited).
    #[serde(default)]
    pub deadline_ms: u64,

    /// Per-query traversal step budget (0 = unlimited).
    #[serde(default)]
    pub max_steps: u64,

    /// Maximum proof / rule recursion depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    8
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            deadline_ms: 0,
            max_steps: 0,
            max_depth: default_max_depth(),
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `noetic.toml`, `noetic.local.toml`, then environment.
    /// All providers are optional; absent files fall back to defaults.
    pub fn load() -> Result<Self, EngineError> {
        let config: Config = Figment::new()
            .merge(Toml::file("noetic.toml"))
            .merge(Toml::file("noetic.local.toml"))
            .merge(Env::prefixed("NOETIC_").split("__"))
            .extract()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit TOML string plus environment.
    pub fn from_toml(source: &str) -> Result<Self, EngineError> {
        let config: Config = Figment::new()
            .merge(Toml::string(source))
            .extract()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !VALID_GEOMETRIES.contains(&self.vector.geometry) {
            return Err(EngineError::Config(format!(
                "geometry must be one of {VALID_GEOMETRIES:?}, got {}",
                self.vector.geometry
            )));
        }
        if !(0.0..=1.0).contains(&self.query.similarity_threshold) {
            return Err(EngineError::Config(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.query.similarity_threshold
            )));
        }
        if self.query.max_holes == 0 {
            return Err(EngineError::Config(
                "max_holes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_values() {
        let config = Config::default();
        assert_eq!(config.vector.geometry, 2048);
        assert_eq!(config.query.max_holes, 4);
        assert!((config.query.similarity_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.query.hdc_strategy, HdcStrategy::Exact);
        assert!(!config.query.canonicalization_enabled);
        assert_eq!(config.limits.max_depth, 8);
    }

    #[test]
    fn toml_overrides_and_validation() {
        let config = Config::from_toml(
            r#"
[vector]
geometry = 512

[query]
hdc_strategy = "approximate"
max_holes = 2
"#,
        )
        .unwrap();
        assert_eq!(config.vector.geometry, 512);
        assert_eq!(config.query.hdc_strategy, HdcStrategy::Approximate);
        assert_eq!(config.query.max_holes, 2);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let result = Config::from_toml("[vector]\ngeometry = 1000\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let result = Config::from_toml("[query]\nsimilarity_threshold = 1.5\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
