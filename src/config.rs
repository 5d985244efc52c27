//! Stage configuration.
//!
//! A [`StageConfig`] names the reserved data column and picks how strictly the
//! engine accounts for per-row outputs. Every field has a serde default, so an
//! empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

/// Column under which a stage's working payload is nested unless configured otherwise.
pub const DEFAULT_DATA_COLUMN: &str = "__data";

/// Field stamped into each working payload with the row's position in the batch.
pub const IDX_IN_BATCH_COLUMN: &str = "__idx_in_batch";

/// How the engine accounts for outputs against input rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCardinality {
    /// Only tag validity per emission is checked. Fan-out and filtering are allowed.
    #[default]
    Unchecked,
    /// Every input row must produce exactly one output.
    ExactlyOnce,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub data_column: String,
    pub output_cardinality: OutputCardinality,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            data_column: DEFAULT_DATA_COLUMN.to_string(),
            output_cardinality: OutputCardinality::default(),
        }
    }
}

impl StageConfig {
    /// Parse a configuration from JSON. Missing fields fall back to defaults.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    #[must_use]
    pub fn with_data_column(mut self, column: impl Into<String>) -> Self {
        self.data_column = column.into();
        self
    }

    #[must_use]
    pub const fn with_output_cardinality(mut self, cardinality: OutputCardinality) -> Self {
        self.output_cardinality = cardinality;
        self
    }
}
