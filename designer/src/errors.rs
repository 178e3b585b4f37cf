use thiserror::Error;

/// Failure taxonomy for the design pipeline.
///
/// `Configuration` and `DataIntegrity` abort the phase that raised them.
/// Per-window anomalies ("no candidate found") are logged and skipped by the
/// selection engine instead of surfacing here; `State` is reserved for
/// violations the engine cannot continue from.
#[derive(Debug, Error)]
pub enum DesignError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("selection state error: {0}")]
    State(String),

    #[error("external tool failure: {0}")]
    Tool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

impl DesignError {
    pub fn config(msg: impl Into<String>) -> Self {
        DesignError::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        DesignError::DataIntegrity(msg.into())
    }
}
