use std::time::Duration;
use thiserror::Error;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors raised while talking to the code generation service
#[derive(Error, Debug)]
pub enum GenerationError {
    /// No model could be obtained (missing endpoint, unsupported mode, ...)
    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service answered but produced nothing usable
    #[error("Generation service returned no usable code")]
    EmptyResponse,

    /// The service did not finish within the configured timeout
    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the service
    #[error("Generation service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GenerationError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
