use thiserror::Error;

use crate::config::Backend;

pub type Result<T> = std::result::Result<T, ModelBuilderError>;

/// Errors raised while resolving, building or restoring a model wrapper.
#[derive(Error, Debug)]
pub enum ModelBuilderError {
    #[error("We don't have built-in {name} for {backend} yet. Please choose from {available:?}")]
    UnknownModel {
        name: String,
        backend: Backend,
        available: Vec<String>,
    },

    #[error("Unknown backend: {0}. Expected one of \"pytorch\" or \"tf.keras\"")]
    UnknownBackend(String),

    #[error("Config is missing required key `{0}`")]
    MissingConfigKey(&'static str),

    #[error("Invalid value for config key `{key}`: {reason}")]
    InvalidConfigValue { key: String, reason: String },

    #[error("Model `{0}` has not been built yet")]
    NotBuilt(String),

    #[error("Checkpoint was written by the {found} backend, expected {expected}")]
    BackendMismatch { expected: Backend, found: Backend },

    #[error("Refusing to write non-finite value in state entry `{0}`")]
    NonFiniteState(String),

    #[error("Restoring from a checkpoint requires a pytorch or tf.keras builder")]
    CheckpointUnsupported,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
