use condor_protocol::Message;
use condor_runtime::RuntimeError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

pub const UNKNOWN_COMMAND: i64 = 1001;
pub const VARIABLE_NOT_FOUND: i64 = 1002;
pub const NOT_ASSIGNABLE: i64 = 1003;
pub const INVALID_ARGUMENTS: i64 = 1004;
pub const NO_ACTIVE_SESSION: i64 = 1005;
pub const MEMORY_NOT_FOUND: i64 = 1006;

/// Errors raised while serving a debug session
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Request answered with an error response; the session carries on
    #[error("{message}")]
    Protocol {
        id: i64,
        message: String,
        variables: BTreeMap<String, String>,
    },

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl AdapterError {
    pub fn protocol(id: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            id,
            message: message.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Protocol error whose format string references `{lexpr}`.
    pub fn with_expression(id: i64, format: &str, expression: &str) -> Self {
        Self::Protocol {
            id,
            message: format.to_string(),
            variables: BTreeMap::from([("lexpr".to_string(), expression.to_string())]),
        }
    }

    pub fn invalid_arguments(command: &str, err: impl std::fmt::Display) -> Self {
        Self::protocol(INVALID_ARGUMENTS, format!("invalid arguments for '{command}': {err}"))
    }

    /// Error body sent to the front end.
    pub fn to_message(&self) -> Message {
        match self {
            AdapterError::Protocol {
                id,
                message,
                variables,
            } => {
                let mut msg = Message::new(*id, message.clone());
                if !variables.is_empty() {
                    msg.variables = Some(variables.clone());
                }
                msg
            }
            AdapterError::Runtime(RuntimeError::NotLoaded | RuntimeError::NoTarget) => {
                Message::new(NO_ACTIVE_SESSION, self.to_string())
            }
            AdapterError::Json(_) => Message::new(INVALID_ARGUMENTS, self.to_string()),
            other => {
                let mut msg = Message::new(0, other.to_string());
                msg.show_user = Some(false);
                msg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expression_errors_carry_their_variables() {
        let err = AdapterError::with_expression(
            NOT_ASSIGNABLE,
            "'{lexpr}' not an assignable expression",
            "x + 1",
        );
        let msg = err.to_message();
        assert_eq!(msg.id, NOT_ASSIGNABLE);
        assert_eq!(
            msg.variables.and_then(|v| v.get("lexpr").cloned()),
            Some("x + 1".to_string())
        );
        assert_eq!(msg.show_user, Some(true));
    }

    #[test]
    fn missing_program_maps_to_no_active_session() {
        let msg = AdapterError::from(RuntimeError::NotLoaded).to_message();
        assert_eq!(msg.id, NO_ACTIVE_SESSION);
    }
}
