//! Pipeline error taxonomy. Configuration, schema and join problems abort the
//! run; VIF numeric instability is not an error (see [`crate::reduce::vif`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema error: column '{column}' missing from {source_name}")]
    Schema { column: String, source_name: String },

    #[error("invalid label value '{value}' for unit '{key}' (expected Normal/Anomaly or 0/1)")]
    LabelValue { key: String, value: String },

    #[error("join integrity error: {missing} {side} without a match (e.g. {examples:?})")]
    JoinIntegrity {
        missing: usize,
        side: &'static str,
        examples: Vec<String>,
    },

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("{count} units have no resolvable representative timestamp (e.g. {examples:?})")]
    UnresolvedTimestamp { count: usize, examples: Vec<String> },

    #[error("matrix is not in chronological order at row {row}")]
    Unordered { row: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl PipelineError {
    pub fn missing_column(column: impl Into<String>, source_name: impl Into<String>) -> Self {
        PipelineError::Schema {
            column: column.into(),
            source_name: source_name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
