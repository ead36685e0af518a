use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Setup failures. Cancellation and quota exhaustion are not errors: a run
/// that hits them still returns a report.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("Strategy file error: {0}")]
    StrategyFile(String),

    #[error(transparent)]
    Ai(#[from] ai_client::AiError),
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(e: serde_json::Error) -> Self {
        DiscoveryError::StrategyFile(e.to_string())
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::StrategyFile(e.to_string())
    }
}
