//! Freeze window configuration
//!
//! Windows are loaded from YAML supplied by the host and validated up front:
//! a window whose bounds are inverted or whose pattern does not compile is
//! rejected at load time, never at evaluation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity dimensions a freeze rule can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeEntityType {
    Org,
    Project,
    Environment,
    EnvironmentType,
    Service,
}

/// How a rule selects values of its entity dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityFilter {
    /// Matches every value, including scopes that do not carry the dimension
    All,
    /// Matches when the scope's value is one of the listed names
    Named { names: Vec<String> },
    /// Matches when the scope carries the dimension and the value matches
    /// the regular expression
    Pattern { pattern: String },
}

/// One dimension constraint within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeRule {
    pub entity_type: FreezeEntityType,
    pub filter: EntityFilter,
}

/// A single freeze window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeWindowConfig {
    pub identifier: String,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Dimension constraints; an empty list freezes everything in scope
    #[serde(default)]
    pub rules: Vec<FreezeRule>,
}

/// Whether a window applies when all of its rules match, or when any does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCombination {
    #[default]
    All,
    Any,
}

/// The full freeze configuration supplied by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeConfig {
    #[serde(default)]
    pub windows: Vec<FreezeWindowConfig>,

    #[serde(default)]
    pub rule_combination: RuleCombination,
}

/// Errors loading or validating freeze configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse freeze configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("freeze window '{identifier}': {reason}")]
    InvalidWindow { identifier: String, reason: String },

    #[error("freeze window '{identifier}': pattern '{pattern}' does not compile: {source}")]
    BadPattern {
        identifier: String,
        pattern: String,
        source: regex::Error,
    },
}

impl FreezeConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: FreezeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for window in &self.windows {
            if window.identifier.is_empty() {
                return Err(ConfigError::InvalidWindow {
                    identifier: "<unnamed>".into(),
                    reason: "identifier must not be empty".into(),
                });
            }
            if window.end <= window.start {
                return Err(ConfigError::InvalidWindow {
                    identifier: window.identifier.clone(),
                    reason: format!("end {} is not after start {}", window.end, window.start),
                });
            }
            for rule in &window.rules {
                if let EntityFilter::Pattern { pattern } = &rule.filter {
                    regex::Regex::new(pattern).map_err(|source| ConfigError::BadPattern {
                        identifier: window.identifier.clone(),
                        pattern: pattern.clone(),
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }
}
