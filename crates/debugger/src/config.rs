use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the external interpreter is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter binary, resolved through `PATH`
    pub program: String,

    /// Upper bound for a single variable probe, in milliseconds
    pub probe_timeout_ms: u64,

    /// How long a launch waits for the program to reach the break, in milliseconds
    pub startup_timeout_ms: u64,

    /// Time given to the debugger to quit before it is killed, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            probe_timeout_ms: 10_000,
            startup_timeout_ms: 30_000,
            shutdown_grace_ms: 500,
        }
    }
}

impl InterpreterConfig {
    /// Apply `CONDOR_PYTHON` on top of `self`.
    pub fn merge_env(mut self) -> Self {
        if let Ok(program) = std::env::var("CONDOR_PYTHON") {
            if !program.trim().is_empty() {
                self.program = program;
            }
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("interpreter program must not be empty".to_string());
        }
        if self.probe_timeout_ms == 0 {
            return Err("probe_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}
