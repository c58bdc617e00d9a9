use std::time::Duration;
use thiserror::Error;

/// Result type for debugger operations
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Errors raised by the interpreter and debugger subprocess drivers
#[derive(Error, Debug)]
pub enum DebuggerError {
    /// The interpreter could not be started
    #[error("Failed to spawn interpreter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The debugger process went away while a request was outstanding
    #[error("Debugger process exited")]
    Exited,

    /// No probe response arrived in time
    #[error("Variable probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// Probe output was not a structured literal
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The interpreter wrote to stderr
    #[error("Execution failed: {stderr}")]
    Execution { stderr: String, stdout: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DebuggerError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }
}
