use pharmabot_core::{AnswerError, CatalogError, ConfigError, RetrievalError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Command(_) => 2,
            Self::Answer(AnswerError::EmptyQuestion) => 2,
            Self::Catalog(_) | Self::Retrieval(_) | Self::Answer(AnswerError::Retrieval(_)) => 3,
            Self::Answer(AnswerError::Generation(_)) => 4,
            Self::Serialization(_) => 5,
            Self::Io(_) => 10,
        }
    }
}
