//! Condor debug adapter
//!
//! Speaks the debug adapter protocol on stdin/stdout. Point the editor's debug
//! configuration at this binary:
//! ```json
//! {
//!   "type": "condor",
//!   "request": "launch",
//!   "program": "${file}",
//!   "stopOnEntry": true
//! }
//! ```
//!
//! Settings come from `CONDOR_*` environment variables (model, endpoint, interpreter, storage).

use anyhow::Result;
use condor_dap::{local_services, serve, AdapterConfig};
use condor_debugger::InterpreterConfig;
use condor_generation::GenerationConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting Condor debug adapter");

    let generation = GenerationConfig::from_env()?;
    let interpreter = InterpreterConfig::default().merge_env();
    let config = AdapterConfig::default().merge_env();

    let services = local_services(generation, interpreter);
    serve(tokio::io::stdin(), tokio::io::stdout(), services, config).await
}
