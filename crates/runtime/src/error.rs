use condor_debugger::DebuggerError;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the session state machine
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Line index past the end of the document
    #[error("Line {index} out of range (document has {len} lines)")]
    OutOfRange { index: usize, len: usize },

    /// Reading or persisting a file failed
    #[error("Storage error for {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation needs a loaded program
    #[error("No program loaded")]
    NotLoaded,

    /// No live debug target to talk to
    #[error("No running debug target")]
    NoTarget,

    #[error(transparent)]
    Debugger(#[from] DebuggerError),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl RuntimeError {
    pub fn storage(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            source,
        }
    }
}
