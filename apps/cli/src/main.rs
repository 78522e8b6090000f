//! Loupe CLI - generate an image, have it reviewed, repeat until approved.
//!
//! Exit codes: 0 when the conversation completes, 2 when it is aborted,
//! 1 for configuration and I/O errors.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use commands::{classify, config, run};

/// Loupe - multi-agent produce/review loop
#[derive(Parser, Debug)]
#[command(
    name = "loupe",
    author,
    version,
    about = "Loupe - a coder agent draws, a vision agent reviews, until the image is approved"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a produce/review conversation
    Run(run::RunArgs),

    /// Classify review text and print the verdict
    ///
    /// Reads the review from FILE, or from stdin when no file is given.
    Classify {
        /// File containing the review text
        file: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved settings and configuration
    Config {
        /// Path to a loupe.toml file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json { builder.json().try_init() } else { builder.without_time().try_init() };
    result.map_err(|e| anyhow::anyhow!(e))
}

async fn dispatch(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Run(args) => run::execute(args).await,
        Command::Classify { file, json } => {
            classify::execute(file.as_deref(), json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { config } => {
            config::execute(config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_level, args.json_logs) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        return ExitCode::FAILURE;
    }

    match dispatch(args.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
