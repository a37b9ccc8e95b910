use thiserror::Error;

use super::config::ConfigError;
use crate::core::forcefield::scoring::ScoringError;
use crate::core::models::ids::{BodyId, ChainId};
use crate::core::models::system::ModelError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Energy scoring failed: {source}")]
    Scoring {
        #[from]
        source: ScoringError,
    },

    #[error("Body system error: {source}")]
    Model {
        #[from]
        source: ModelError,
    },

    #[error("Invalid weights for weighted average: {old_weight}, {delta_weight}")]
    InvalidWeights { old_weight: f64, delta_weight: f64 },

    #[error("Body {0:?} is already tracked by this tracker")]
    AlreadyTracked(BodyId),

    #[error("Body with ID {0:?} not found in the system")]
    BodyNotFound(BodyId),

    #[error("Chain with ID {0:?} not found in the system")]
    ChainNotFound(ChainId),
}
