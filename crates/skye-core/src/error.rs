use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session error: {0}")]
    Session(String),

    #[error("model backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] skye_pm::PmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
