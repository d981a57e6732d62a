use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvolveError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Trail error: {0}")]
    Trail(String),

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Evaluation of individual {index} failed in generation {generation}: {message}")]
    Evaluation {
        generation: usize,
        index: usize,
        message: String,
    },

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Selection error: {0}")]
    Selection(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Incompatible checkpoint: {0}")]
    IncompatibleCheckpoint(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, EvolveError>;
