// Error taxonomy for the classification core
//
// Application edges (CSV, SQLite, CLI, server) stay on anyhow; these are the
// typed conditions callers are expected to branch on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Too few rows or labels to fit a meaningful model. Callers skip the
    /// supervised step and keep rule-only output.
    #[error("insufficient training data: {records} records, {distinct_labels} distinct labels")]
    InsufficientData {
        records: usize,
        distinct_labels: usize,
    },

    /// A required field is absent. The only condition that rejects a record.
    #[error("missing required field `{field}` at line {line}")]
    MissingField { field: &'static str, line: usize },

    /// Vectorization or prediction failed for one input.
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// A rule definition cannot be evaluated (empty pattern, bad priority).
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Generated rule text could not be parsed or evaluated.
    #[error("rule text error: {0}")]
    RuleText(String),
}

impl ClassifierError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ClassifierError::InsufficientData { .. })
    }
}
