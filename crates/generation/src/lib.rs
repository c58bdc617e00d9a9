//! Code generation client for Condor.
//!
//! ```text
//! accumulated lines ──► CompletionRequest (template + text)
//!                              │
//!                              ▼
//!                        ChatModel::complete  (remote SSE stream | echo)
//!                              │
//!                              ▼
//!                   fence stripping / strict bool parse
//! ```
//!
//! Failures never propagate to callers of [`GenerationClient::generate_code`] or
//! [`GenerationClient::classify_is_prompt_like`]; they are logged and mapped to
//! "nothing to execute" and "not a prompt" respectively.

mod client;
mod config;
mod error;
mod model;
mod prompt;
mod stream;

pub use client::GenerationClient;
pub use config::{GenerationConfig, GenerationMode};
pub use error::{GenerationError, Result};
pub use model::{model_from_config, ChatModel, EchoModel, OpenAiCompatModel};
pub use prompt::{parse_strict_bool, strip_code_fence, CompletionRequest, RequestKind};
pub use stream::SseAccumulator;
