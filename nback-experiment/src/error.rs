use thiserror::Error;

/// A test configuration that cannot produce a valid sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("sequence length must be at least 1")]
    EmptySequence,

    #[error(
        "{requested} forced matches requested but only {available} positions can match at lag {lag}"
    )]
    TooManyForcedMatches {
        requested: usize,
        available: usize,
        lag: usize,
    },
}

/// Failure delivered to an annotation's completion callback.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("telemetry session already closed")]
    Closed,
}

/// Why a controller run stopped without an outcome.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Renderer or input failure. Fatal to the run.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
