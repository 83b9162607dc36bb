//! codediff: compare generated kernels between compiler test runs
//!
//! ## Usage
//!
//! ```bash
//! codediff parse runs/main main.json         # Parse a run directory
//! codediff join -o full.json s0.json s1.json # Concatenate shards
//! codediff diff main.json pr.json diff.json  # Exit 1 on differences
//! codediff diff_report diff.json diff.html   # Render HTML
//! ```

use clap::Parser;
use codediff_cli::{handlers, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(&config)?;

    match cli.command {
        Commands::Parse(args) => handlers::execute_parse(&config, &args).map(|_| ExitCode::SUCCESS),
        Commands::Join(args) => handlers::execute_join(&config, &args).map(|_| ExitCode::SUCCESS),
        Commands::Diff(args) => {
            let found = handlers::execute_diff(&config, &args)?;
            Ok(if found { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Commands::DiffReport(args) => handlers::execute_report(&config, &args).map(|()| ExitCode::SUCCESS),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    let color: ColorChoice = cli.color.into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

fn init_tracing(config: &CliConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color_stderr())
        .with_target(false)
        .try_init()
        .map_err(|e| CliError::config(e.to_string()))
}
