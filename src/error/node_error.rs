use thiserror::Error;

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("evaluation error: {0}")]
    Evaluation(String),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        NodeError::Gateway(e.to_string())
    }
}
