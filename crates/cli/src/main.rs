//! Condor command line
//!
//! ```text
//! condor run program.txt        # generate, execute, print stdout
//! condor generate program.txt   # print the generated code only
//! condor dap                    # debug adapter on stdin/stdout
//! condor --check                # probe the configured interpreter
//! ```
//!
//! Settings are read from `condor.toml` (or `--config`), then `CONDOR_*` environment variables,
//! then flags.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use condor_dap::{local_services, serve};
use condor_debugger::Interpreter;
use condor_generation::{GenerationClient, GenerationMode};
use condor_runtime::LocalFileAccessor;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod oneshot;

use config::{CondorConfig, Overrides};
use oneshot::{OneShot, RunOutcome};

#[derive(Parser)]
#[command(name = "condor")]
#[command(about = "Debug plain text programs: lines become generated code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ./condor.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Probe the configured interpreter and exit
    #[arg(long)]
    check: bool,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Args)]
struct OverrideArgs {
    /// Code generation backend
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeFlag>,

    /// OpenAI-compatible chat-completions URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Model name sent with every request
    #[arg(long, global = true)]
    model: Option<String>,

    /// Interpreter binary
    #[arg(long, global = true)]
    python: Option<String>,

    /// Directory receiving the generated program
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeFlag {
    Remote,
    Echo,
}

impl ModeFlag {
    const fn as_domain(self) -> GenerationMode {
        match self {
            ModeFlag::Remote => GenerationMode::Remote,
            ModeFlag::Echo => GenerationMode::Echo,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code for a text file, run it and print its output
    Run(FileArgs),

    /// Print the code generated for a text file
    Generate(FileArgs),

    /// Serve the debug adapter protocol on stdin/stdout
    Dap,
}

#[derive(Args)]
struct FileArgs {
    /// Text program
    file: PathBuf,
}

impl OverrideArgs {
    fn into_overrides(self) -> Overrides {
        Overrides {
            mode: self.mode.map(ModeFlag::as_domain),
            endpoint: self.endpoint,
            model: self.model,
            python: self.python,
            storage_dir: self.storage_dir,
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if matches!(cli.command, Some(Commands::Dap)) {
        "warn"
    } else {
        "info"
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn one_shot(config: &CondorConfig) -> OneShot {
    OneShot::new(
        Arc::new(LocalFileAccessor),
        Arc::new(GenerationClient::new(config.generation.clone())),
        Interpreter::new(config.interpreter.clone()),
        config.adapter.resolved_storage_dir(),
    )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    let Cli {
        command,
        config,
        check,
        overrides,
        ..
    } = cli;
    let config = CondorConfig::load(config.as_deref())?
        .merge_env()?
        .apply(overrides.into_overrides());
    log::debug!("Effective configuration: {config:?}");

    if check {
        let version = one_shot(&config).check_interpreter().await?;
        println!("{}: {version}", config.interpreter.program);
        return Ok(ExitCode::SUCCESS);
    }

    match command {
        Some(Commands::Run(args)) => {
            let RunOutcome { output, cleanup } = one_shot(&config).run(&args.file).await?;
            print!("{}", output.stdout);
            let failed = output.is_error();
            if failed {
                eprint!("{}", output.stderr);
                log::error!("{} raised an error", args.file.display());
            }
            if let Err(e) = cleanup.await {
                log::debug!("Cleanup task failed: {e}");
            }
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Some(Commands::Generate(args)) => {
            let code = one_shot(&config).generate(&args.file).await?;
            println!("{code}");
        }
        Some(Commands::Dap) => {
            let services = local_services(config.generation, config.interpreter);
            serve(tokio::io::stdin(), tokio::io::stdout(), services, config.adapter)
                .await
                .context("debug adapter session failed")?;
        }
        None => anyhow::bail!("no command given (try `condor --help`)"),
    }
    Ok(ExitCode::SUCCESS)
}
