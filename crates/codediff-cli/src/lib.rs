//! codediff CLI library
//!
//! Command-line interface over the `codediff` comparison engine: parse run
//! directories, join shards, diff runs and render HTML reports.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, CriterionArg, DiffArgs, DiffReportArgs, JoinArgs, ParseArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
