use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::literal::PROBE_TAG;

/// Scope a variable probe dumps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProbeScope {
    Locals,
    Globals,
}

impl ProbeScope {
    fn builtin(self) -> &'static str {
        match self {
            ProbeScope::Locals => "locals()",
            ProbeScope::Globals => "globals()",
        }
    }

    /// Single pdb command that prints the scope as `str()` of a JSON-safe dict.
    ///
    /// The dict opens with a [`PROBE_TAG`] entry carrying `id`, so the answer can be told apart
    /// from program output and from answers to earlier probes. Names starting with `__` and the
    /// debugger's own `pdb` binding are excluded; values that are not JSON-serializable are
    /// replaced by their `str()`.
    pub fn command(self, id: u64) -> String {
        format!(
            "!import json as __condor_json__; str({{'{tag}': {id}, **__condor_json__.loads(\
             __condor_json__.dumps({{__k: __v for __k, __v in dict({scope}).items() \
             if not __k.startswith('__') and __k not in ('pdb',)}}, default=str))}})",
            tag = PROBE_TAG,
            scope = self.builtin()
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Something observed on a running target, delivered in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetEvent {
    /// Genuine program output, debugger chrome already removed.
    Output { stream: OutputStream, text: String },
    /// The program raised; `summary` is the `Type: message` line.
    Exception { summary: String },
    /// The debugger process is gone.
    Exited { code: Option<i32> },
}

pub type TargetEvents = mpsc::UnboundedSender<TargetEvent>;

/// A live, paused program that can be inspected.
#[async_trait]
pub trait DebugTarget: Send + Sync {
    /// Snapshot a scope. Probes are answered strictly in the order they were issued.
    async fn probe(&self, scope: ProbeScope) -> Result<Map<String, Value>>;

    /// Execute `name = value` inside the paused program.
    async fn assign(&self, name: &str, value: &str) -> Result<()>;

    /// Stop the program and release its resources.
    async fn shutdown(&self) -> Result<()>;
}

/// Starts programs under a debugger.
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn launch(&self, code: &str, events: TargetEvents) -> Result<Arc<dyn DebugTarget>>;
}
