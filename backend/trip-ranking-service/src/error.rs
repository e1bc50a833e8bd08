use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for RecommendError {
    fn from(err: serde_json::Error) -> Self {
        RecommendError::Store(format!("malformed document: {}", err))
    }
}

impl From<std::io::Error> for RecommendError {
    fn from(err: std::io::Error) -> Self {
        RecommendError::Store(err.to_string())
    }
}

impl From<envy::Error> for RecommendError {
    fn from(err: envy::Error) -> Self {
        RecommendError::Configuration(err.to_string())
    }
}
