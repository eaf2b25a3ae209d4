use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown performance measure: {0}")]
    UnknownPerformanceMeasure(String),

    #[error("Performance measure '{name}' has no registered formula")]
    UnmappedPerformanceMeasure { name: String },

    #[error("No row-type transform chain from {from} to {to}")]
    NoReshapePath { from: String, to: String },

    #[error("Dimension mismatch in {context}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    DimensionMismatch {
        context: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Measure '{measure}' is not available: its counters were not requested")]
    NotAvailable { measure: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StatError {
    /// True for the missing-data condition, as opposed to a configuration error.
    pub fn is_not_available(&self) -> bool {
        matches!(self, StatError::NotAvailable { .. })
    }
}

pub type StatResult<T> = Result<T, StatError>;
