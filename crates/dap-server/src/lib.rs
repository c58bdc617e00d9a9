//! Debug adapter for Condor text programs
//!
//! ```text
//!  front end ──Content-Length frames──► FrameReader ──► serve loop ──► Adapter ──► Runtime
//!      ▲                                                   │ gate        │
//!      │                                                   ▼             ▼ RuntimeEvent
//!      └───────────── FrameWriter (single write loop) ◄── responses ◄── event pump
//! ```
//!
//! Requests are handled one at a time. `launch`/`attach` wait (bounded) for
//! `configurationDone` in their own task, so breakpoints set during configuration are in
//! place before the program starts. Events raised while a request is handled are written
//! after its response.

pub mod adapter;
pub mod config;
pub mod coords;
pub mod error;
pub mod handles;
mod server;
pub mod transport;
pub mod values;

pub use adapter::{Adapter, Outcome, THREAD_ID};
pub use config::AdapterConfig;
pub use error::{AdapterError, Result};
pub use server::{local_services, serve};
