use thiserror::Error;

use ampel_model::{ConfigError, ModelError};
use ampel_topology::TopologyError;

/// Errors of the enforcement layer.
///
/// Everything here is fatal for one intersection at most. The driver
/// catches construction errors and runs the intersection unshielded;
/// solver failures never surface as errors at all (the shield locks its
/// state space and keeps serving the previous strategy).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("intersection {tls} cannot be shielded: {reason}")]
    Unshieldable { tls: String, reason: String },
}
