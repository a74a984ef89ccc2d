use thiserror::Error;

/// Errors of the probabilistic model layer.
///
/// Dimension mismatches are programmer/config errors and always rejected
/// without mutating state. Invalid PMF updates are *not* errors; they are
/// logged and dropped (see `Environment::adapt_probabilities`).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("dimension mismatch: expected {expected} entries, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("state space must not be empty")]
    Empty,
    #[error("probabilities do not form a PMF (sum = {sum})")]
    NotAPmf { sum: f64 },
    #[error("junction phase queried before the first update")]
    PhaseUnset,
    #[error("cannot reconcile configurations: {0}")]
    Reconcile(String),
}

/// Errors while loading or storing a persisted shield configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed shield configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration does not match the built model: {0}")]
    Model(#[from] ModelError),
}
