//! Session state machine for line-oriented text programs
//!
//! A program is a text file read one line at a time. Stepping appends lines to a code
//! history; after each cursor movement the whole history is sent for code generation and
//! the result is run under a fresh debug target:
//!
//! ```text
//! ┌──────────────┐   lines   ┌──────────────┐  prompt  ┌────────────────┐
//! │SourceDocument│ ────────► │   Runtime    │ ───────► │GenerationClient│
//! └──────────────┘           │ cursor, bps, │ ◄─────── └────────────────┘
//!                            │   history    │   code
//!                            └──────┬───────┘
//!                                   │ launch / probe / assign
//!                                   ▼
//!                            ┌──────────────┐
//!                            │ DebugTarget  │
//!                            └──────────────┘
//! ```
//!
//! Everything the host needs to show is delivered as [`RuntimeEvent`]s.

pub mod breakpoints;
mod context;
mod error;
mod events;
mod runtime;
mod source;
mod storage;
mod variable;

pub use breakpoints::{AccessType, Breakpoint, BreakpointTable, DataBreakpoints};
pub use context::{ExecutionContextBuilder, CONTEXT_PATTERN};
pub use error::{Result, RuntimeError};
pub use events::{OutputCategory, RuntimeEvent, StopReason};
pub use runtime::{
    ExceptionFilters, Runtime, RuntimeFrame, RuntimeInstruction, RuntimeServices, RuntimeSettings,
    RuntimeStack, RuntimeState, StepInTarget, GENERATED_FILE_NAME,
};
pub use source::SourceDocument;
pub use storage::{normalize_path, FileAccessor, LocalFileAccessor};
pub use variable::{RuntimeValue, RuntimeVariable};
