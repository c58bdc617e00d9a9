//! Interactive debugger subprocess driver.
//!
//! ```text
//!   generated code ──► temp script + trailer ──► python -m pdb -c continue
//!                                                      │ stdout/stderr lines
//!                              ┌───────────────────────┴──────────────┐
//!                              ▼                                      ▼
//!             quoted-brace answer tagged with          program output
//!             the pending probe's id (others dropped)  (chrome filtered, TargetEvent)
//!                              │
//!                              ▼
//!                literal repair ──► JSON map ──► VariableView filter
//! ```
//!
//! The runtime only sees the [`DebugLauncher`] / [`DebugTarget`] traits, so the scraping layer
//! can be replaced without touching the session logic.

pub mod chrome;
mod config;
mod error;
mod exec;
pub mod literal;
mod pdb;
mod target;
mod view;

pub use config::InterpreterConfig;
pub use error::{DebuggerError, Result};
pub use exec::{ExecutionOutput, Interpreter};
pub use pdb::{BoxedReader, BoxedWriter, PdbLauncher, PdbSession, BREAK_TRAILER};
pub use target::{
    DebugLauncher, DebugTarget, OutputStream, ProbeScope, TargetEvent, TargetEvents,
};
pub use view::{looks_callable, VariableView};
