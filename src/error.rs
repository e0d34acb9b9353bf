use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipevoError {
    #[error("Invalid parameter '{parameter}': {message}")]
    ParameterValidation {
        parameter: &'static str,
        message: String,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Time budget exhausted")]
    Timeout,

    #[error("Search cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, PipevoError>;
