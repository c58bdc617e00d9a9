//! One-shot interpreter runs: a script file or an inline `-c` expression.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::InterpreterConfig;
use crate::error::{DebuggerError, Result};

/// Captured result of one interpreter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionOutput {
    /// Any stderr output counts as a failed run, whatever the exit code.
    pub fn is_error(&self) -> bool {
        !self.stderr.trim().is_empty()
    }

    pub fn into_result(self) -> Result<String> {
        if self.is_error() {
            return Err(DebuggerError::Execution {
                stderr: self.stderr,
                stdout: self.stdout,
            });
        }
        Ok(self.stdout)
    }
}

/// Runs code to completion without a debugger attached.
#[derive(Debug, Clone)]
pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    pub async fn run_file(&self, script: &Path) -> Result<ExecutionOutput> {
        log::debug!("Running {} with {}", script.display(), self.config.program);
        self.run(&[script.as_os_str()]).await
    }

    pub async fn run_inline(&self, expression: &str) -> Result<ExecutionOutput> {
        self.run(&[OsStr::new("-c"), OsStr::new(expression)]).await
    }

    async fn run(&self, args: &[&OsStr]) -> Result<ExecutionOutput> {
        let output = Command::new(&self.config.program)
            .args(args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DebuggerError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;
        Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
