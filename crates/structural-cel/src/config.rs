//! Engine limits and behavior toggles.
//!
//! Loading from files or the environment is left to the host; this module only
//! parses and validates an already-read JSON document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a [`CelConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },
}

/// Cost limits and validation behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CelConfig {
    /// Upper bound on the cost of a single expression evaluation.
    #[serde(default = "CelConfig::default_per_call_limit")]
    pub per_call_limit: i64,

    /// Budget shared by every expression evaluated against one object.
    #[serde(default = "CelConfig::default_runtime_cost_budget")]
    pub runtime_cost_budget: i64,

    /// Compile-time rejection threshold for the estimated cost of an expression.
    #[serde(default)]
    pub max_expression_cost: Option<u64>,

    /// Assumed size of lists, maps and strings whose schema has no size bound.
    #[serde(default = "CelConfig::default_max_list_size")]
    pub default_max_list_size: u64,

    #[serde(default = "CelConfig::default_max_message_expression_bytes")]
    pub max_message_expression_bytes: usize,

    /// Skip re-validating unchanged values on update.
    #[serde(default = "CelConfig::default_ratcheting")]
    pub ratcheting: bool,
}

impl Default for CelConfig {
    fn default() -> Self {
        Self {
            per_call_limit: Self::default_per_call_limit(),
            runtime_cost_budget: Self::default_runtime_cost_budget(),
            max_expression_cost: None,
            default_max_list_size: Self::default_max_list_size(),
            max_message_expression_bytes: Self::default_max_message_expression_bytes(),
            ratcheting: Self::default_ratcheting(),
        }
    }
}

impl CelConfig {
    fn default_per_call_limit() -> i64 {
        1_000_000
    }
    fn default_runtime_cost_budget() -> i64 {
        10_000_000
    }
    fn default_max_list_size() -> u64 {
        1000
    }
    fn default_max_message_expression_bytes() -> usize {
        5 * 1024
    }
    fn default_ratcheting() -> bool {
        true
    }

    /// Parses a JSON document and checks that every limit is positive.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: CelConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("perCallLimit", self.per_call_limit),
            ("runtimeCostBudget", self.runtime_cost_budget),
            (
                "defaultMaxListSize",
                i64::try_from(self.default_max_list_size).unwrap_or(i64::MAX),
            ),
            (
                "maxMessageExpressionBytes",
                i64::try_from(self.max_message_expression_bytes).unwrap_or(i64::MAX),
            ),
        ];
        for (field, value) in checks {
            if value <= 0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if let Some(max) = self.max_expression_cost {
            if max == 0 {
                return Err(ConfigError::NonPositive {
                    field: "maxExpressionCost",
                    value: 0,
                });
            }
        }
        Ok(())
    }
}
